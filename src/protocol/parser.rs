//! Header line parser
//!
//! Works on one line at a time with the line delimiter already stripped.
//! Storage payloads are never passed through here: the session hands the
//! line following a storage header straight to the pending command.

use crate::ProtocolError;
use crate::protocol::command::{Command, PendingStorageCommand, StorageKind};

/// Compare a command token with a lowercase name, ignoring ASCII case
#[inline]
fn cmd_eq(cmd: &[u8], expected: &[u8]) -> bool {
    cmd.len() == expected.len()
        && cmd
            .iter()
            .zip(expected.iter())
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

/// Map a command token to its storage kind
fn storage_kind(cmd: &[u8]) -> Option<StorageKind> {
    [
        StorageKind::Set,
        StorageKind::Add,
        StorageKind::Replace,
        StorageKind::Append,
        StorageKind::Prepend,
    ]
    .into_iter()
    .find(|kind| cmd_eq(cmd, kind.name().as_bytes()))
}

/// Parse a header line into a command
pub fn parse(line: &[u8]) -> Result<Command<'_>, ProtocolError> {
    let mut parts = line.split(|&b| b == b' ').filter(|p| !p.is_empty());
    let cmd_name = parts.next().unwrap_or_default();

    if cmd_eq(cmd_name, b"get") {
        parse_get(parts)
    } else if let Some(kind) = storage_kind(cmd_name) {
        parse_storage(kind, parts).map(Command::Storage)
    } else {
        Err(ProtocolError::UnknownCommand(
            String::from_utf8_lossy(cmd_name).into_owned(),
        ))
    }
}

/// Parse get command. Only the first key is looked up.
fn parse_get<'a>(mut parts: impl Iterator<Item = &'a [u8]>) -> Result<Command<'a>, ProtocolError> {
    let key = parts.next().ok_or(ProtocolError::MissingArguments("get"))?;
    Ok(Command::Get { key })
}

/// Parse the arguments of a storage command header
/// Format: <key> <flags> <exptime> <bytes> [noreply]
fn parse_storage<'a>(
    kind: StorageKind,
    mut parts: impl Iterator<Item = &'a [u8]>,
) -> Result<PendingStorageCommand, ProtocolError> {
    let missing = || ProtocolError::MissingArguments(kind.name());

    let key = parts.next().ok_or_else(missing)?;

    let flags = parts.next().ok_or_else(missing)?;
    let exptime = parts.next().ok_or_else(missing)?;
    let bytes = parts.next().ok_or_else(missing)?;

    let flags = parse_num(flags).ok_or(ProtocolError::InvalidFlags)?;
    let exptime = parse_num(exptime).ok_or(ProtocolError::InvalidExptime)?;
    let bytes = parse_num(bytes).ok_or(ProtocolError::InvalidBytesLength)?;

    let noreply = parts.next().is_some_and(|s| s == b"noreply");

    Ok(PendingStorageCommand {
        kind,
        key: key.to_vec(),
        flags,
        exptime,
        bytes,
        noreply,
    })
}

/// Parse an ASCII decimal token
fn parse_num<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
