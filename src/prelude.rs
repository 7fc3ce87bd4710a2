//! Prelude module for common imports.
//!
//! ```ignore
//! use memlite::prelude::*;
//! ```

// Error types
pub use crate::error::{MemliteError, ProtocolError, Result, StorageError};

// Configuration
pub use crate::config::{Config, MetricsConfig, ServerConfig, StorageConfig};

// Storage
pub use crate::storage::{Entry, ExptimePolicy, Store, Ttl};

// Protocol
pub use crate::protocol::{Command, ResponseWriter};

// Metrics
pub use crate::metrics::Metrics;

// Server
pub use crate::server::{Server, Session};

// Common external crates
pub use std::sync::Arc;
pub use tracing::{debug, error, info, trace, warn};
