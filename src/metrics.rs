//! Prometheus metrics for memlite

use crate::protocol::StorageKind;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

/// Server-wide metrics
pub struct Metrics {
    pub registry: Registry,

    // Command counters
    pub cmd_get: IntCounter,
    pub cmd_set: IntCounter,
    pub cmd_add: IntCounter,
    pub cmd_replace: IntCounter,
    pub cmd_append: IntCounter,
    pub cmd_prepend: IntCounter,

    // Outcome counters
    pub get_hits: IntCounter,
    pub get_misses: IntCounter,
    pub expired_removed: IntCounter,
    pub not_stored: IntCounter,

    // Connection metrics
    pub active_connections: IntGauge,
    pub total_connections: IntCounter,
    pub rejected_connections: IntCounter,

    // Bytes counters
    pub bytes_read: IntCounter,
    pub bytes_written: IntCounter,

    pub cmd_latency: Histogram,

    // Error counters
    pub unknown_commands: IntCounter,
    pub protocol_errors: IntCounter,
    pub storage_errors: IntCounter,
}

/// Create and register a counter. Names are static, so failure is a bug.
fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter definition");
    registry
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();
        let c = |name: &str, help: &str| counter(&registry, name, help);

        let cmd_get = c("memlite_cmd_get_total", "Total GET commands");
        let cmd_set = c("memlite_cmd_set_total", "Total SET commands");
        let cmd_add = c("memlite_cmd_add_total", "Total ADD commands");
        let cmd_replace = c("memlite_cmd_replace_total", "Total REPLACE commands");
        let cmd_append = c("memlite_cmd_append_total", "Total APPEND commands");
        let cmd_prepend = c("memlite_cmd_prepend_total", "Total PREPEND commands");

        let get_hits = c("memlite_get_hits_total", "Total GET hits");
        let get_misses = c("memlite_get_misses_total", "Total GET misses");
        let expired_removed = c(
            "memlite_expired_keys_removed_total",
            "Keys removed by lazy expiration",
        );
        let not_stored = c(
            "memlite_not_stored_total",
            "Storage commands answered with NOT_STORED",
        );

        let total_connections = c("memlite_connections_total", "Total connections accepted");
        let rejected_connections = c(
            "memlite_rejected_connections_total",
            "Total connections rejected",
        );

        let bytes_read = c("memlite_bytes_read_total", "Total bytes read");
        let bytes_written = c("memlite_bytes_written_total", "Total bytes written");

        let unknown_commands = c(
            "memlite_unknown_commands_total",
            "Lines whose command was not recognised",
        );
        let protocol_errors = c("memlite_protocol_errors_total", "Total protocol errors");
        let storage_errors = c("memlite_storage_errors_total", "Total storage errors");

        let active_connections =
            IntGauge::new("memlite_active_connections", "Current active connections")
                .expect("valid gauge definition");
        registry
            .register(Box::new(active_connections.clone()))
            .expect("gauge registered once");

        let cmd_latency = Histogram::with_opts(
            HistogramOpts::new("memlite_cmd_latency_seconds", "Command latency in seconds")
                .buckets(vec![
                    0.000_01, 0.000_05, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
                ]),
        )
        .expect("valid histogram definition");
        registry
            .register(Box::new(cmd_latency.clone()))
            .expect("histogram registered once");

        Self {
            registry,
            cmd_get,
            cmd_set,
            cmd_add,
            cmd_replace,
            cmd_append,
            cmd_prepend,
            get_hits,
            get_misses,
            expired_removed,
            not_stored,
            active_connections,
            total_connections,
            rejected_connections,
            bytes_read,
            bytes_written,
            cmd_latency,
            unknown_commands,
            protocol_errors,
            storage_errors,
        }
    }

    /// Counter for a storage command kind
    pub fn storage_cmd(&self, kind: StorageKind) -> &IntCounter {
        match kind {
            StorageKind::Set => &self.cmd_set,
            StorageKind::Add => &self.cmd_add,
            StorageKind::Replace => &self.cmd_replace,
            StorageKind::Append => &self.cmd_append,
            StorageKind::Prepend => &self.cmd_prepend,
        }
    }

    /// Get Prometheus formatted metrics
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
