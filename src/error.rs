//! Error types for memlite

use thiserror::Error;

/// Main error type for memlite
#[derive(Error, Debug)]
pub enum MemliteError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while interpreting a single command line.
///
/// All of these are recoverable: the offending line is answered and the
/// session keeps going. `LineTooLong` is the one exception and closes the
/// connection, since the framing itself can no longer be trusted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{0} command not recognised")]
    UnknownCommand(String),

    #[error("not enough arguments for {0}")]
    MissingArguments(&'static str),

    #[error("invalid flags")]
    InvalidFlags,

    #[error("invalid exptime")]
    InvalidExptime,

    #[error("invalid bytes length")]
    InvalidBytesLength,

    #[error("line too long")]
    LineTooLong,
}

/// Storage layer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("key not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MemliteError>;
