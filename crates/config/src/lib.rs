//! # Config — validated engine options
//!
//! `EngineOptions` is the single knob surface accepted by [`Engine::open`].
//! Every field has a spec-mandated default; [`EngineOptions::validate`]
//! enforces the stated minimums before the engine ever touches disk.
//!
//! [`Engine::open`]: ../engine/struct.Engine.html#method.open

use std::time::Duration;
use thiserror::Error;

/// Minimum `max_memtable_bytes` accepted by [`EngineOptions::validate`] (4 MiB).
pub const MIN_MEMTABLE_BYTES: usize = 4 * 1024 * 1024;

/// Rejects an [`EngineOptions`] value that violates a documented minimum or
/// shape constraint.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `max_memtable_bytes` was below [`MIN_MEMTABLE_BYTES`].
    #[error("max_memtable_bytes must be at least {MIN_MEMTABLE_BYTES} bytes, got {0}")]
    MemtableTooSmall(usize),

    /// `cache_shards` was zero or not a power of two.
    #[error("cache_shards must be a nonzero power of two, got {0}")]
    CacheShardsNotPowerOfTwo(usize),

    /// `wal_batch_records` or `wal_batch_bytes` was zero.
    #[error("wal batch thresholds must be nonzero (records={0}, bytes={1})")]
    WalBatchZero(usize, usize),

    /// `filter_bits_per_key` was zero.
    #[error("filter_bits_per_key must be nonzero")]
    FilterBitsZero,
}

/// Validated configuration for [`Engine::open`], covering every option named
/// in the engine facade's external contract.
///
/// Every field carries a sensible default; construct with
/// [`EngineOptions::default`] and override only the fields that matter to
/// the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Memtable byte-size threshold that triggers a flush to a new sorted
    /// run. Default 64 MiB, enforced minimum 4 MiB.
    pub max_memtable_bytes: usize,
    /// Total LRU cache capacity in entries, spread across `cache_shards`
    /// shards. `0` disables the cache entirely (a [`cache::NullCache`] is
    /// used instead of a sharded one).
    pub cache_capacity: usize,
    /// Number of independently-locked cache shards. Must be a power of two.
    pub cache_shards: usize,
    /// Flush the WAL buffer after this many pending records.
    pub wal_batch_records: usize,
    /// Flush the WAL buffer after this many buffered bytes.
    pub wal_batch_bytes: usize,
    /// Membership filter bits allocated per expected element.
    pub filter_bits_per_key: usize,
    /// Minimum number of sorted runs before a compaction pass is worthwhile.
    pub compaction_trigger_run_count: usize,
    /// Interval between periodic (non-event-driven) compaction attempts.
    pub compaction_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_memtable_bytes: 64 * 1024 * 1024,
            cache_capacity: 10_000,
            cache_shards: 256,
            wal_batch_records: 1_000,
            wal_batch_bytes: 64 * 1024,
            filter_bits_per_key: 10,
            compaction_trigger_run_count: 4,
            compaction_interval: Duration::from_secs(5),
        }
    }
}

impl EngineOptions {
    /// Checks every field against its documented minimum/shape constraint.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint found, in field-declaration
    /// order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_memtable_bytes < MIN_MEMTABLE_BYTES {
            return Err(ConfigError::MemtableTooSmall(self.max_memtable_bytes));
        }
        if self.cache_capacity > 0
            && (self.cache_shards == 0 || !self.cache_shards.is_power_of_two())
        {
            return Err(ConfigError::CacheShardsNotPowerOfTwo(self.cache_shards));
        }
        if self.wal_batch_records == 0 || self.wal_batch_bytes == 0 {
            return Err(ConfigError::WalBatchZero(
                self.wal_batch_records,
                self.wal_batch_bytes,
            ));
        }
        if self.filter_bits_per_key == 0 {
            return Err(ConfigError::FilterBitsZero);
        }
        Ok(())
    }
}
