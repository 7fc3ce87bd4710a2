//! Per-connection protocol state machine
//!
//! A [`Session`] consumes one line at a time and appends the exact response
//! bytes to a [`ResponseWriter`]. It does no I/O, so the whole protocol can be
//! driven from tests without a socket.

use crate::metrics::Metrics;
use crate::protocol::{Command, PendingStorageCommand, ResponseWriter, StorageKind, parse};
use crate::storage::{Entry, ExptimePolicy, Store};
use crate::{ProtocolError, StorageError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// What the next line means
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// Next line is a command
    AwaitingHeader,
    /// Next line is the payload for this storage command
    AwaitingPayload(PendingStorageCommand),
}

/// Protocol state for one connection
pub struct Session {
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    zero_exptime: ExptimePolicy,
    state: State,
}

impl Session {
    /// Create a session in the header state
    pub fn new(store: Arc<Store>, metrics: Arc<Metrics>, zero_exptime: ExptimePolicy) -> Self {
        Self {
            store,
            metrics,
            zero_exptime,
            state: State::AwaitingHeader,
        }
    }

    /// Returns true if a storage header was read and its payload has not arrived yet
    pub fn is_awaiting_payload(&self) -> bool {
        matches!(self.state, State::AwaitingPayload(_))
    }

    /// Process one line with its delimiter already stripped
    pub fn handle_line(&mut self, line: &[u8], response: &mut ResponseWriter) {
        match std::mem::replace(&mut self.state, State::AwaitingHeader) {
            State::AwaitingHeader => self.handle_header(line, response),
            State::AwaitingPayload(pending) => {
                let start = Instant::now();
                self.handle_payload(&pending, line, response);
                self.metrics
                    .cmd_latency
                    .observe(start.elapsed().as_secs_f64());
            }
        }
    }

    fn handle_header(&mut self, line: &[u8], response: &mut ResponseWriter) {
        match parse(line) {
            Ok(Command::Get { key }) => {
                let start = Instant::now();
                self.metrics.cmd_get.inc();
                self.handle_get(key, response);
                self.metrics
                    .cmd_latency
                    .observe(start.elapsed().as_secs_f64());
            }
            Ok(Command::Storage(pending)) => {
                trace!(
                    command = %pending.kind,
                    key = %String::from_utf8_lossy(&pending.key),
                    bytes = pending.bytes,
                    "Awaiting payload"
                );
                self.state = State::AwaitingPayload(pending);
            }
            Err(ProtocolError::UnknownCommand(token)) => {
                self.metrics.unknown_commands.inc();
                debug!("{} command not recognised", token);
                response.not_recognised(&token);
            }
            Err(e) => {
                self.metrics.protocol_errors.inc();
                warn!(line = %String::from_utf8_lossy(line), "Malformed command: {}", e);
                response.client_error(&e.to_string());
            }
        }
    }

    /// Handle GET command
    fn handle_get(&self, key: &[u8], response: &mut ResponseWriter) {
        if let Some(entry) = self.lookup(key, Instant::now()) {
            self.metrics.get_hits.inc();
            response.value(key, entry.flags, &entry.data);
        } else {
            self.metrics.get_misses.inc();
        }
        response.end();
    }

    /// Apply a pending storage command to its payload line
    fn handle_payload(
        &self,
        pending: &PendingStorageCommand,
        payload: &[u8],
        response: &mut ResponseWriter,
    ) {
        self.metrics.storage_cmd(pending.kind).inc();
        trace!(
            command = %pending.kind,
            key = %String::from_utf8_lossy(&pending.key),
            "Storing payload"
        );

        let outcome = self.store_payload(pending, payload);
        match &outcome {
            Ok(true) => {}
            Ok(false) => self.metrics.not_stored.inc(),
            Err(e) => {
                self.metrics.storage_errors.inc();
                warn!(command = %pending.kind, "Store failure: {}", e);
            }
        }

        if pending.noreply {
            return;
        }

        match outcome {
            Ok(true) => response.stored(),
            Ok(false) => response.not_stored(),
            Err(e) => response.server_error(&e.to_string()),
        }
    }

    /// Returns whether the payload was stored
    fn store_payload(
        &self,
        pending: &PendingStorageCommand,
        data: &[u8],
    ) -> Result<bool, StorageError> {
        let key = pending.key.as_slice();
        let now = Instant::now();
        let ttl = self.zero_exptime.ttl(pending.exptime);

        let result = match pending.kind {
            StorageKind::Set => self
                .store
                .add(key, data.to_vec(), pending.flags, ttl)
                .map(|_| true),
            StorageKind::Add => self
                .store
                .add_if_absent(key, data.to_vec(), pending.flags, ttl, now),
            StorageKind::Replace => self
                .store
                .replace_if_live(key, data.to_vec(), pending.flags, ttl, now),
            StorageKind::Append | StorageKind::Prepend => {
                if self.lookup(key, now).is_none() {
                    return Ok(false);
                }
                if pending.kind == StorageKind::Append {
                    self.store.append(key, data).map(|()| true)
                } else {
                    self.store.prepend(key, data).map(|()| true)
                }
            }
        };

        match result {
            // Removed by another connection since the lookup
            Err(StorageError::NotFound) => Ok(false),
            other => other,
        }
    }

    /// Live entry under `key`, if any.
    ///
    /// An expired entry is removed from the store and reported as absent.
    fn lookup(&self, key: &[u8], now: Instant) -> Option<Entry> {
        match self.store.get(key) {
            Ok(entry) if !entry.is_expired(now) => Some(entry),
            Ok(_) => {
                if self.store.remove_expired(key, now) {
                    self.metrics.expired_removed.inc();
                }
                None
            }
            Err(_) => None,
        }
    }
}
