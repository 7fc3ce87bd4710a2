//! Memcached text protocol implementation

pub mod command;
pub mod parser;
pub mod response;

pub use command::{Command, PendingStorageCommand, StorageKind};
pub use parser::parse;
pub use response::ResponseWriter;
