//! # memlite
//!
//! Minimal in-memory cache server speaking a line-oriented subset of the
//! memcached text protocol.
//!
//! ## Features
//!
//! - Commands: `get`, `set`, `add`, `replace`, `append`, `prepend`, with `noreply`
//! - Shared in-memory store guarded by a single lock
//! - TTL support with lazy expiration on read
//! - Prometheus metrics and health endpoints
//!
//! ## Example
//!
//! ```ignore
//! use memlite::config::Config;
//! use memlite::server::Server;
//! use memlite::storage::Store;
//!
//! let config = Config::default();
//! let store = Arc::new(Store::new());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌──────────────────────────────┐     ┌─────────────┐
//! │ client   │────▶│ connection task (one each)   │────▶│ Store       │
//! │ (text    │     │  ├─ line framing             │     │ (Mutex +    │
//! │  proto)  │◀────│  └─ Session: header/payload  │     │  HashMap)   │
//! └──────────┘     └──────────────────────────────┘     └─────────────┘
//! ```

// Modules
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod prelude;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use error::{MemliteError, ProtocolError, Result, StorageError};
