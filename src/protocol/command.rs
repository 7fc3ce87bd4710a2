//! Memcached text protocol command types

use std::fmt;

/// Kind of a two-line storage command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

impl StorageKind {
    /// Command name as it appears on the wire
    pub fn name(self) -> &'static str {
        match self {
            StorageKind::Set => "set",
            StorageKind::Add => "add",
            StorageKind::Replace => "replace",
            StorageKind::Append => "append",
            StorageKind::Prepend => "prepend",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage command header waiting for its payload line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStorageCommand {
    pub kind: StorageKind,
    pub key: Vec<u8>,
    pub flags: u16,
    /// Relative seconds from now, sign preserved
    pub exptime: i64,
    /// Declared payload size. Recorded, not enforced.
    pub bytes: usize,
    pub noreply: bool,
}

/// Parsed header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// get <key>
    Get { key: &'a [u8] },

    /// <set|add|replace|append|prepend> <key> <flags> <exptime> <bytes> [noreply]
    Storage(PendingStorageCommand),
}
