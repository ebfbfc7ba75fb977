//! # Cache — sharded LRU for hot key-value pairs
//!
//! Wraps the `lru` crate's classic intrusive LRU list, sharded across
//! independently-locked partitions so that cache traffic for unrelated keys
//! never contends on the same lock. Used by the engine as an optional
//! read-path accelerator that sits in front of sorted-run lookups.
//!
//! Consumers depend on the [`Cache`] trait rather than a concrete type, so a
//! disabled cache ([`NullCache`]) can be swapped in without the call sites
//! branching on whether caching is active.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Default shard count. Must stay a power of two so key hashing can mask
/// instead of dividing.
pub const DEFAULT_SHARDS: usize = 256;

/// A cache of key-value pairs keyed by their raw bytes.
///
/// Implementors must be safe to share behind an `Arc` and call concurrently
/// from multiple reader threads.
pub trait Cache: Send + Sync {
    /// Returns a clone of the cached value for `key`, if present, and marks
    /// it as most-recently-used.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Inserts or replaces the cached value for `key`.
    fn insert(&self, key: Vec<u8>, value: Vec<u8>);

    /// Evicts `key` from the cache, if present. Used when a key is deleted
    /// or overwritten on a path that must not serve the old cached value.
    fn remove(&self, key: &[u8]);

    /// Drops every cached entry. Used after compaction invalidates cached
    /// assumptions about where a key's authoritative copy lives.
    fn clear(&self);
}

/// A no-op [`Cache`] used when the engine is configured with
/// `cacheCapacity == 0`. Every lookup misses; every insert is discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl Cache for NullCache {
    fn get(&self, _key: &[u8]) -> Option<Vec<u8>> {
        None
    }

    fn insert(&self, _key: Vec<u8>, _value: Vec<u8>) {}

    fn remove(&self, _key: &[u8]) {}

    fn clear(&self) {}
}

/// A cache partitioned into `shard_count` independently-locked LRU shards.
///
/// Each shard holds roughly `capacity / shard_count` entries. A key's shard
/// is chosen by hashing it with FNV-1a and masking the low bits, so lookups
/// and inserts for unrelated keys rarely block on the same mutex.
pub struct ShardedLruCache {
    shards: Vec<Mutex<LruCache<Vec<u8>, Vec<u8>>>>,
    shard_mask: u64,
}

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl ShardedLruCache {
    /// Creates a sharded cache with `total_capacity` entries spread evenly
    /// across `DEFAULT_SHARDS` shards.
    ///
    /// # Panics
    ///
    /// Panics if `total_capacity` is zero — use [`NullCache`] to disable
    /// caching instead of a zero-capacity sharded cache.
    pub fn new(total_capacity: usize) -> Self {
        Self::with_shards(total_capacity, DEFAULT_SHARDS)
    }

    /// Creates a sharded cache with an explicit shard count.
    ///
    /// # Panics
    ///
    /// Panics if `total_capacity` is zero, or if `shard_count` is zero or not
    /// a power of two.
    pub fn with_shards(total_capacity: usize, shard_count: usize) -> Self {
        assert!(total_capacity > 0, "total_capacity must be > 0");
        assert!(
            shard_count > 0 && shard_count.is_power_of_two(),
            "shard_count must be a nonzero power of two"
        );

        let per_shard = (total_capacity / shard_count).max(1);
        let cap = NonZeroUsize::new(per_shard).expect("per_shard capacity must be nonzero");
        let shards = (0..shard_count)
            .map(|_| Mutex::new(LruCache::new(cap)))
            .collect();

        Self {
            shards,
            shard_mask: (shard_count as u64) - 1,
        }
    }

    fn shard_for(&self, key: &[u8]) -> &Mutex<LruCache<Vec<u8>, Vec<u8>>> {
        let idx = fnv1a(key) & self.shard_mask;
        &self.shards[idx as usize]
    }

    /// Number of shards this cache was built with.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl Cache for ShardedLruCache {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.shard_for(key).lock().get(key).cloned()
    }

    fn insert(&self, key: Vec<u8>, value: Vec<u8>) {
        self.shard_for(&key).lock().put(key, value);
    }

    fn remove(&self, key: &[u8]) {
        self.shard_for(key).lock().pop(key);
    }

    fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }
}
