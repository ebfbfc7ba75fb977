//! # Memtable
//!
//! The lock-free, ordered, in-memory write buffer for the storage engine.
//!
//! The memtable is the first point of contact for every write operation. It
//! buffers recent `PUT` and `DELETE` operations in a concurrent skiplist
//! before they are flushed to an immutable, on-disk sorted run.
//!
//! ## Key properties
//! - **Sorted order**: entries are always in ascending key order (required
//!   for sorted-run flush and for shadowing reads across levels).
//! - **Timestamp-gated**: stale writes (lower or equal timestamp) are
//!   silently rejected.
//! - **Tombstone support**: deletes are recorded as `ValueEntry { value: None }`
//!   markers.
//! - **Approximate size tracking**: an atomic byte counter drives flush
//!   threshold decisions without locking.
//! - **Lock-free reads**: backed by [`crossbeam_skiplist::SkipMap`], so
//!   `get`/`iter` never block, even while a write is in flight. Mutations
//!   (`put`/`delete`) are only ever called by the engine's single write path
//!   (serialized by its write mutex), so the stale-write check-then-insert
//!   below does not need to itself be atomic.
//!
//! ## Example
//! ```rust
//! use memtable::Memtable;
//!
//! let m = Memtable::new();
//! m.put(b"hello".to_vec(), b"world".to_vec(), 1);
//! assert_eq!(m.get(b"hello").unwrap().1, b"world".to_vec());
//!
//! m.delete(b"hello".to_vec(), 2);
//! assert!(m.get(b"hello").is_none());
//! ```

use crossbeam_skiplist::SkipMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single entry in the memtable, pairing a timestamp with an optional value.
///
/// - `value == Some(bytes)` — the key holds a live value.
/// - `value == None` — the key has been deleted (tombstone).
///
/// Tombstones are retained in the memtable and flushed to sorted runs so that
/// older values in lower levels are correctly shadowed during reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    /// Monotonically non-decreasing timestamp assigned at write time.
    pub timestamp: u64,
    /// `Some(bytes)` for live values, `None` for tombstones (deletes).
    pub value: Option<Vec<u8>>,
}

/// An ordered, lock-free, in-memory write buffer backed by a skiplist.
///
/// The memtable tracks an approximate byte size (keys + values) so the
/// engine can decide when to flush to a sorted run. Timestamps gate every
/// mutation: a write whose timestamp is <= the existing entry's timestamp is
/// silently dropped, which keeps WAL replay and recovery idempotent.
#[derive(Debug)]
pub struct Memtable {
    map: SkipMap<Vec<u8>, ValueEntry>,
    approx_size: AtomicUsize,
}

impl Memtable {
    /// Creates a new, empty memtable.
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
            approx_size: AtomicUsize::new(0),
        }
    }

    /// Inserts a key-value pair with the given timestamp.
    ///
    /// If the key already exists with a **newer or equal** timestamp, the
    /// write is silently ignored (stale-write protection). Otherwise the old
    /// entry is replaced and the size counter is adjusted accordingly.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>, timestamp: u64) {
        if let Some(existing) = self.map.get(&key) {
            let old = existing.value();
            if old.timestamp >= timestamp {
                return;
            }
            if let Some(ref ov) = old.value {
                self.approx_size.fetch_sub(ov.len(), Ordering::Relaxed);
            }
        } else {
            self.approx_size
                .fetch_add(key.len(), Ordering::Relaxed);
        }

        self.approx_size
            .fetch_add(value.len(), Ordering::Relaxed);

        self.map.insert(
            key,
            ValueEntry {
                timestamp,
                value: Some(value),
            },
        );
    }

    /// Records a tombstone (delete marker) for the given key.
    ///
    /// A tombstone is stored as `ValueEntry { timestamp, value: None }`. It
    /// shadows any older value both in the memtable and in sorted runs during
    /// reads. Stale-write protection applies exactly as in [`put`](Self::put).
    pub fn delete(&self, key: Vec<u8>, timestamp: u64) {
        if let Some(existing) = self.map.get(&key) {
            let old = existing.value();
            if old.timestamp >= timestamp {
                return;
            }
            if let Some(ref ov) = old.value {
                self.approx_size.fetch_sub(ov.len(), Ordering::Relaxed);
            }
        } else {
            self.approx_size
                .fetch_add(key.len(), Ordering::Relaxed);
        }

        self.map.insert(
            key,
            ValueEntry {
                timestamp,
                value: None,
            },
        );
    }

    /// Returns the live value for `key`, if any.
    ///
    /// Returns `Some((timestamp, value_bytes))` for live entries, `None` for
    /// missing keys or tombstones. Prefer [`get_entry`](Self::get_entry) when
    /// the caller needs to distinguish "not found" from "deleted".
    pub fn get(&self, key: &[u8]) -> Option<(u64, Vec<u8>)> {
        self.map
            .get(key)
            .and_then(|e| e.value().value.clone().map(|v| (e.value().timestamp, v)))
    }

    /// Returns the raw [`ValueEntry`] for `key`, if present, including
    /// tombstones.
    pub fn get_entry(&self, key: &[u8]) -> Option<ValueEntry> {
        self.map.get(key).map(|e| e.value().clone())
    }

    /// Returns an iterator over all entries in **ascending key order**.
    ///
    /// This includes tombstones. Used only internally by flush and
    /// compaction — the public engine surface never exposes range iteration.
    pub fn iter(&self) -> impl Iterator<Item = (Vec<u8>, ValueEntry)> + '_ {
        self.map.iter().map(|e| (e.key().clone(), e.value().clone()))
    }

    /// Returns the number of entries (including tombstones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns the approximate byte size of all keys and values stored.
    ///
    /// This drives the engine's flush-threshold decision. The size counts key
    /// bytes + value bytes but not skiplist node overhead, and may be read
    /// concurrently with in-flight writes without locking.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        self.approx_size.load(Ordering::Relaxed)
    }

    /// Returns `true` if the memtable contains zero entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns `true` if the memtable contains the given key (including
    /// tombstones).
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
