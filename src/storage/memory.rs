//! In-memory store shared by every connection
//!
//! A single mutex guards the whole map. Each operation takes the lock for its
//! own duration only, so read-modify-write operations such as append are
//! atomic with respect to every other operation on the store.

use crate::StorageError;
use crate::storage::entry::{Entry, Ttl};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;
use tracing::trace;

/// Key/value store with lazy expiration
#[derive(Debug, Default)]
pub struct Store {
    entries: Mutex<HashMap<Vec<u8>, Entry>>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `key`, overwriting any existing entry.
    ///
    /// The insertion time is reset to now. Returns a snapshot of the new entry.
    pub fn add(
        &self,
        key: &[u8],
        data: Vec<u8>,
        flags: u16,
        ttl: Ttl,
    ) -> Result<Entry, StorageError> {
        let entry = Entry::new(flags, data, ttl, Instant::now());
        self.entries.lock().insert(key.to_vec(), entry.clone());
        Ok(entry)
    }

    /// Store `data` under `key` unless a live entry already holds it.
    ///
    /// An entry that is expired at `now` counts as absent and is overwritten.
    /// Returns `true` if the value was stored. The check and the insert
    /// happen under one lock, so two concurrent callers cannot both succeed.
    pub fn add_if_absent(
        &self,
        key: &[u8],
        data: Vec<u8>,
        flags: u16,
        ttl: Ttl,
        now: Instant,
    ) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| !entry.is_expired(now)) {
            return Ok(false);
        }
        entries.insert(key.to_vec(), Entry::new(flags, data, ttl, now));
        Ok(true)
    }

    /// Overwrite `key` only if it holds an entry that is live at `now`.
    ///
    /// An expired entry is removed and reported as not stored. Returns `true`
    /// if the value was stored.
    pub fn replace_if_live(
        &self,
        key: &[u8],
        data: Vec<u8>,
        flags: u16,
        ttl: Ttl,
        now: Instant,
    ) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock();
        let live = match entries.get(key) {
            Some(entry) => !entry.is_expired(now),
            None => return Ok(false),
        };

        if live {
            entries.insert(key.to_vec(), Entry::new(flags, data, ttl, now));
        } else {
            entries.remove(key);
            trace!(key = %String::from_utf8_lossy(key), "Lazy expiration: removed expired key");
        }
        Ok(live)
    }

    /// Snapshot of the entry under `key`.
    ///
    /// Expired entries are returned as-is; callers decide whether to treat
    /// them as absent and remove them.
    pub fn get(&self, key: &[u8]) -> Result<Entry, StorageError> {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    /// Delete `key`
    pub fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        self.entries
            .lock()
            .remove(key)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    /// Delete `key` only if the entry currently stored is expired at `now`.
    ///
    /// Returns `true` if an entry was removed. The check and the removal
    /// happen under one lock, so an entry stored after the caller's read is
    /// left alone.
    pub fn remove_expired(&self, key: &[u8], now: Instant) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                trace!(key = %String::from_utf8_lossy(key), "Lazy expiration: removed expired key");
                true
            }
            _ => false,
        }
    }

    /// Concatenate `data` after the existing value.
    ///
    /// Flags, insertion time and TTL are left untouched.
    pub fn append(&self, key: &[u8], data: &[u8]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key).ok_or(StorageError::NotFound)?;
        entry.data.extend_from_slice(data);
        Ok(())
    }

    /// Concatenate `data` before the existing value.
    ///
    /// Flags, insertion time and TTL are left untouched.
    pub fn prepend(&self, key: &[u8], data: &[u8]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key).ok_or(StorageError::NotFound)?;
        entry.data.splice(0..0, data.iter().copied());
        Ok(())
    }

    /// Number of keys held, expired ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no keys are held
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn test_add_get() {
        let store = Store::new();
        let added = store.add(b"test", b"some piece of data".to_vec(), 1, Ttl::Never).unwrap();

        let entry = store.get(b"test").unwrap();
        assert_eq!(entry, added);
        assert_eq!(entry.flags, 1);
        assert_eq!(entry.data, b"some piece of data");
    }

    #[test]
    fn test_get_nonexistent() {
        let store = Store::new();
        assert_eq!(store.get(b"missing"), Err(StorageError::NotFound));
    }

    #[test]
    fn test_add_overwrites() {
        let store = Store::new();
        store.add(b"k", b"one".to_vec(), 1, Ttl::Never).unwrap();
        store.add(b"k", b"two".to_vec(), 2, Ttl::Seconds(5)).unwrap();

        let entry = store.get(b"k").unwrap();
        assert_eq!(entry.data, b"two");
        assert_eq!(entry.flags, 2);
        assert_eq!(entry.ttl, Ttl::Seconds(5));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove() {
        let store = Store::new();
        assert_eq!(store.remove(b"k"), Err(StorageError::NotFound));

        store.add(b"k", b"v".to_vec(), 0, Ttl::Never).unwrap();
        assert_eq!(store.remove(b"k"), Ok(()));
        assert!(store.get(b"k").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_returns_expired_entry() {
        let store = Store::new();
        store.add(b"k", b"v".to_vec(), 0, Ttl::Seconds(-1)).unwrap();

        let entry = store.get(b"k").unwrap();
        assert!(entry.is_expired(Instant::now()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_expired() {
        let store = Store::new();
        store.add(b"old", b"v".to_vec(), 0, Ttl::Seconds(-1)).unwrap();
        store.add(b"live", b"v".to_vec(), 0, Ttl::Never).unwrap();

        let now = Instant::now();
        assert!(store.remove_expired(b"old", now));
        assert!(!store.remove_expired(b"live", now));
        assert!(!store.remove_expired(b"missing", now));
        assert!(store.get(b"old").is_err());
        assert!(store.get(b"live").is_ok());
    }

    #[test]
    fn test_remove_expired_spares_fresh_entry() {
        let store = Store::new();
        store.add(b"k", b"old".to_vec(), 0, Ttl::Seconds(10)).unwrap();
        let seen = store.get(b"k").unwrap();
        let later = seen.inserted_at + Duration::from_secs(11);
        assert!(seen.is_expired(later));

        // Someone stores a fresh value before the reader removes the key
        store.add(b"k", b"new".to_vec(), 0, Ttl::Never).unwrap();
        assert!(!store.remove_expired(b"k", later));
        assert_eq!(store.get(b"k").unwrap().data, b"new");
    }

    #[test]
    fn test_append_prepend() {
        let store = Store::new();
        let added = store.add(b"k", b"test".to_vec(), 7, Ttl::Seconds(100)).unwrap();

        store.append(b"k", b"!!").unwrap();
        store.append(b"k", b"?").unwrap();
        store.prepend(b"k", b">>").unwrap();

        let entry = store.get(b"k").unwrap();
        assert_eq!(entry.data, b">>test!!?");
        assert_eq!(entry.flags, 7);
        assert_eq!(entry.ttl, Ttl::Seconds(100));
        assert_eq!(entry.inserted_at, added.inserted_at);
    }

    #[test]
    fn test_append_prepend_missing() {
        let store = Store::new();
        assert_eq!(store.append(b"k", b"x"), Err(StorageError::NotFound));
        assert_eq!(store.prepend(b"k", b"x"), Err(StorageError::NotFound));
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_appends() {
        let store = Arc::new(Store::new());
        store.add(b"k", Vec::new(), 0, Ttl::Never).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.append(b"k", b"ab").unwrap();
                        let data = store.get(b"k").unwrap().data;
                        assert_eq!(data.len() % 2, 0);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let data = store.get(b"k").unwrap().data;
        assert_eq!(data.len(), 8 * 100 * 2);
        assert!(data.chunks(2).all(|c| c == b"ab"));
    }

    #[test]
    fn test_add_if_absent() {
        let store = Store::new();
        let now = Instant::now();

        assert_eq!(store.add_if_absent(b"k", b"one".to_vec(), 1, Ttl::Never, now), Ok(true));
        assert_eq!(store.add_if_absent(b"k", b"two".to_vec(), 2, Ttl::Never, now), Ok(false));

        let entry = store.get(b"k").unwrap();
        assert_eq!(entry.data, b"one");
        assert_eq!(entry.flags, 1);
    }

    #[test]
    fn test_add_if_absent_overwrites_expired() {
        let store = Store::new();
        store.add(b"k", b"old".to_vec(), 0, Ttl::Seconds(-1)).unwrap();

        let now = Instant::now();
        assert_eq!(store.add_if_absent(b"k", b"new".to_vec(), 3, Ttl::Never, now), Ok(true));

        let entry = store.get(b"k").unwrap();
        assert_eq!(entry.data, b"new");
        assert_eq!(entry.ttl, Ttl::Never);
        assert_eq!(entry.inserted_at, now);
    }

    #[test]
    fn test_replace_if_live() {
        let store = Store::new();
        let now = Instant::now();
        assert_eq!(store.replace_if_live(b"k", b"x".to_vec(), 0, Ttl::Never, now), Ok(false));
        assert!(store.is_empty());

        store.add(b"k", b"old".to_vec(), 1, Ttl::Never).unwrap();
        assert_eq!(
            store.replace_if_live(b"k", b"new".to_vec(), 2, Ttl::Seconds(9), Instant::now()),
            Ok(true)
        );
        let entry = store.get(b"k").unwrap();
        assert_eq!(entry.data, b"new");
        assert_eq!(entry.flags, 2);
        assert_eq!(entry.ttl, Ttl::Seconds(9));
    }

    #[test]
    fn test_replace_if_live_removes_expired() {
        let store = Store::new();
        store.add(b"k", b"old".to_vec(), 0, Ttl::Seconds(-1)).unwrap();

        assert_eq!(
            store.replace_if_live(b"k", b"new".to_vec(), 0, Ttl::Never, Instant::now()),
            Ok(false)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_add_if_absent_single_winner() {
        let store = Arc::new(Store::new());

        for trial in 0..500u32 {
            let key = trial.to_string().into_bytes();
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = (0..2u16)
                .map(|flags| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    let key = key.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        store
                            .add_if_absent(&key, vec![b'a' + flags as u8], flags, Ttl::Never, Instant::now())
                            .unwrap()
                    })
                })
                .collect();

            let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(results.iter().filter(|stored| **stored).count(), 1, "trial {trial}");

            // The stored value belongs to the thread that reported success
            let winner = results.iter().position(|stored| *stored).unwrap() as u16;
            assert_eq!(store.get(&key).unwrap().flags, winner);
        }
    }

    #[test]
    fn test_concurrent_replace_if_live_against_expiry() {
        let store = Arc::new(Store::new());

        for trial in 0..200u32 {
            let key = trial.to_string().into_bytes();
            store.add(&key, b"old".to_vec(), 0, Ttl::Seconds(-1)).unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let adder = {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let key = key.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.add_if_absent(&key, b"added".to_vec(), 1, Ttl::Never, Instant::now()).unwrap()
                })
            };
            barrier.wait();
            let replaced = store
                .replace_if_live(&key, b"replaced".to_vec(), 2, Ttl::Never, Instant::now())
                .unwrap();
            assert!(adder.join().unwrap(), "trial {trial}");

            // Either the replace saw the expired entry (and lost), or it saw the
            // freshly added one and overwrote it. Never a mix of both.
            let entry = store.get(&key).unwrap();
            if replaced {
                assert_eq!(entry.data, b"replaced");
            } else {
                assert_eq!(entry.data, b"added");
            }
        }
    }
}
