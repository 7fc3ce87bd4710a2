//! Cached entries and expiration arithmetic
//!
//! Expiration is lazy: nothing sweeps the store. An entry is expired when
//! `now - inserted_at > ttl`, and readers decide what to do about it.

use serde::Deserialize;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// How long an entry stays visible after it was stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Never expires
    Never,
    /// Relative lifetime in seconds. Zero or negative values are already
    /// expired as soon as any time has passed.
    Seconds(i64),
}

/// Interpretation of a client exptime of exactly zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExptimePolicy {
    /// Zero means the entry never expires
    #[default]
    Never,
    /// Zero is taken literally: a zero-second TTL
    Immediate,
}

impl ExptimePolicy {
    /// Convert a client exptime into a TTL.
    ///
    /// Only zero is subject to the policy; every other value is passed
    /// through as a literal number of seconds, sign included.
    pub fn ttl(self, exptime: i64) -> Ttl {
        match (exptime, self) {
            (0, ExptimePolicy::Never) => Ttl::Never,
            (secs, _) => Ttl::Seconds(secs),
        }
    }
}

impl FromStr for ExptimePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(ExptimePolicy::Never),
            "immediate" => Ok(ExptimePolicy::Immediate),
            other => Err(format!(
                "unknown zero exptime policy {other:?} (expected \"never\" or \"immediate\")"
            )),
        }
    }
}

/// One cached value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Opaque client flags, returned verbatim
    pub flags: u16,
    /// Stored bytes
    pub data: Vec<u8>,
    /// When the entry was last stored by set/add/replace
    pub inserted_at: Instant,
    /// Lifetime measured from `inserted_at`
    pub ttl: Ttl,
}

impl Entry {
    /// Create an entry stored at `inserted_at`
    pub fn new(flags: u16, data: Vec<u8>, ttl: Ttl, inserted_at: Instant) -> Self {
        Self {
            flags,
            data,
            inserted_at,
            ttl,
        }
    }

    /// Check whether the entry is expired at `now`
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        is_expired(self, now)
    }
}

/// `now - inserted_at > ttl`, with `Ttl::Never` never expiring.
pub fn is_expired(entry: &Entry, now: Instant) -> bool {
    match entry.ttl {
        Ttl::Never => false,
        Ttl::Seconds(secs) => {
            let age = now.saturating_duration_since(entry.inserted_at);
            match u64::try_from(secs) {
                Ok(secs) => age > Duration::from_secs(secs),
                // Negative TTL: any age, even zero, is past it
                Err(_) => true,
            }
        }
    }
}
