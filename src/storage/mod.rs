//! Storage layer for memlite

mod entry;
mod memory;

pub use entry::{Entry, ExptimePolicy, Ttl, is_expired};
pub use memory::Store;
