//! Configuration for memlite

use crate::storage::ExptimePolicy;
use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen_addr: String,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Read buffer size per connection (bytes)
    pub read_buffer_size: usize,

    /// Write buffer size per connection (bytes)
    pub write_buffer_size: usize,

    /// Number of Tokio worker threads (0 = number of CPUs)
    pub worker_threads: usize,

    /// Idle timeout in seconds (0 = no timeout)
    pub connection_timeout_secs: u64,

    /// Longest accepted line in bytes, delimiter included (0 = unbounded)
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:11211".to_string(),
            max_connections: 10000,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            worker_threads: 0,
            connection_timeout_secs: 0,
            max_line_length: 0,
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// How an exptime of exactly zero is interpreted
    pub zero_exptime: ExptimePolicy,
}

/// Metrics and health check configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the metrics/health HTTP endpoint
    pub enabled: bool,

    /// Address for metrics/health HTTP server
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::MemliteError::Config(format!("Failed to read config file: {e}"))
        })?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        toml::from_str(contents)
            .map_err(|e| crate::MemliteError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> crate::Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Apply `MEMLITE_*` overrides looked up through `var` on top of the defaults
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = var("MEMLITE_LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Some(n) = var("MEMLITE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            config.server.max_connections = n;
        }

        if let Some(secs) = var("MEMLITE_CONNECTION_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.server.connection_timeout_secs = secs;
        }

        if let Some(len) = var("MEMLITE_MAX_LINE_LENGTH").and_then(|v| v.parse().ok()) {
            config.server.max_line_length = len;
        }

        if let Some(policy) = var("MEMLITE_ZERO_EXPTIME") {
            config.storage.zero_exptime = policy.parse().map_err(crate::MemliteError::Config)?;
        }

        if let Some(addr) = var("MEMLITE_METRICS_ADDR") {
            config.metrics.listen_addr = addr;
        }

        if let Some(enabled) = var("MEMLITE_METRICS_ENABLED") {
            config.metrics.enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }

        Ok(config)
    }
}
