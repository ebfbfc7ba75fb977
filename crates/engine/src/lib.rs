//! # Engine — the embeddable key-value storage facade
//!
//! Ties [`memtable`], [`wal`], [`sstable`], [`cache`], and [`config`] into a
//! single ordered key-value store built on an LSM-tree write path.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────────┐
//! │                         ENGINE                           │
//! │                                                           │
//! │ write.rs → write mutex → WAL append → memtable insert     │
//! │               |                                           │
//! │               |  (approx_size >= max_memtable_bytes?)      │
//! │               v yes                                       │
//! │          freeze: rotate WAL, swap in a fresh memtable,     │
//! │          publish under state_lock, wake the flush worker   │
//! │               |                                           │
//! │               v (background)                              │
//! │          flush_oldest_immutable() → new sorted run         │
//! │               |                                           │
//! │               v (background, on a timer or after a flush) │
//! │          compact() → oldest-half merge, tombstone GC       │
//! │                                                           │
//! │ read.rs  → cache → memtable → immutable memtables → runs  │
//! │            (newest first; first match wins)                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! State is published copy-on-write: every reader takes a cheap `Arc` clone
//! of the current [`state::EngineState`] snapshot and is never blocked by a
//! writer or a background worker. `state_lock` only serializes the
//! *publishers* (freeze, flush, compaction); the write mutex only serializes
//! writers (timestamp assignment, WAL append, memtable mutation).
//!
//! There is no persisted manifest — [`recovery::recover`] reconstructs the
//! run list by scanning the directory for `sst-*.db` files and reading each
//! one's footer.

mod compaction;
mod error;
mod read;
mod recovery;
mod state;
mod workers;
mod write;

pub use config::EngineOptions;
pub use error::EngineError;

use cache::{Cache, NullCache, ShardedLruCache};
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use state::EngineState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use wal::WalWriter;

/// Maximum allowed key size (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size (16 MiB).
pub const MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

/// A counter step (or resulting value) for [`Engine::incr`]/[`Engine::decr`]
/// and their `_by` variants. The existing value's representation decides
/// which arm is used for the result: integer arithmetic stays integer unless
/// either side is a [`Step::Real`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// A signed integer counter value.
    Int(i64),
    /// A floating-point counter value.
    Real(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Opening,
    Open,
    Closing,
    Closed,
}

/// State shared between the `Engine` handle and its background workers.
/// Workers only ever see an `Arc<Inner>` — never the write mutex or cache,
/// which belong to the foreground `Engine` handle that owns them.
pub(crate) struct Inner {
    dir: PathBuf,
    options: EngineOptions,
    state: RwLock<Arc<EngineState>>,
    state_lock: Mutex<()>,
    health: Mutex<Option<String>>,
}

impl Inner {
    pub(crate) fn set_health(&self, msg: String) {
        *self.health.lock() = Some(msg);
    }
}

/// Write-path state guarded by `Engine::write`: the active WAL writer, the
/// path/creation-ts it was opened with (needed when rotating), and the
/// monotonic timestamp counter.
struct WriteGuard {
    wal_writer: WalWriter,
    wal_path: PathBuf,
    wal_creation_ts: u64,
    timestamp: u64,
}

/// An embeddable, ordered key-value storage engine.
///
/// Construct with [`Engine::open`]; release background workers and flush
/// pending data with [`Engine::close`]. Every operation after `close` (or
/// during it) fails with [`EngineError::Closed`].
pub struct Engine {
    inner: Arc<Inner>,
    cache: Arc<dyn Cache>,
    write: Mutex<WriteGuard>,
    lifecycle: Mutex<Lifecycle>,
    flush_tx: Mutex<Sender<()>>,
    compaction_tx: Mutex<Sender<()>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.inner.state.read().clone();
        f.debug_struct("Engine")
            .field("dir", &self.inner.dir)
            .field("lifecycle", &*self.lifecycle.lock())
            .field("memtable_entries", &snapshot.mem.len())
            .field("memtable_bytes", &snapshot.mem.approx_size())
            .field("immutable_memtables", &snapshot.imm.len())
            .field("run_count", &snapshot.runs.len())
            .field("health", &*self.inner.health.lock())
            .finish()
    }
}

impl Engine {
    /// Opens (or creates) an engine rooted at `dir`.
    ///
    /// Recovers any WAL and sorted-run files left behind by a prior process,
    /// then spawns the background flush and compaction workers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if `options` fails
    /// [`EngineOptions::validate`], or [`EngineError::Io`]/
    /// [`EngineError::CorruptRecord`] if recovery fails.
    pub fn open<P: AsRef<Path>>(dir: P, options: EngineOptions) -> Result<Self, EngineError> {
        options
            .validate()
            .map_err(|e| EngineError::InvalidArgument(e.to_string()))?;

        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        recovery::cleanup_tmp_files(&dir);

        let recovered = recovery::recover(&dir).map_err(EngineError::from)?;

        let wal_writer = WalWriter::create_with_batching(
            &recovered.active_wal_path,
            true,
            options.wal_batch_records,
            options.wal_batch_bytes,
        )?;

        let cache: Arc<dyn Cache> = if options.cache_capacity == 0 {
            Arc::new(NullCache)
        } else {
            Arc::new(ShardedLruCache::with_shards(
                options.cache_capacity,
                options.cache_shards,
            ))
        };

        let state = EngineState::new(recovered.mem, recovered.runs);
        let inner = Arc::new(Inner {
            dir: dir.clone(),
            options: options.clone(),
            state: RwLock::new(Arc::new(state)),
            state_lock: Mutex::new(()),
            health: Mutex::new(None),
        });

        let (flush_tx, flush_rx) = bounded::<()>(1);
        let (compaction_tx, compaction_rx) = bounded::<()>(1);

        let flush_handle =
            workers::spawn_flush_worker(Arc::clone(&inner), flush_rx, compaction_tx.clone());
        let compaction_handle = workers::spawn_compaction_worker(
            Arc::clone(&inner),
            compaction_rx,
            options.compaction_interval,
        );

        let write = Mutex::new(WriteGuard {
            wal_writer,
            wal_path: recovered.active_wal_path,
            wal_creation_ts: recovered.active_wal_creation_ts,
            timestamp: recovered.timestamp,
        });

        info!(dir = %dir.display(), "engine opened");

        Ok(Self {
            inner,
            cache,
            write,
            lifecycle: Mutex::new(Lifecycle::Open),
            flush_tx: Mutex::new(flush_tx),
            compaction_tx: Mutex::new(compaction_tx),
            workers: Mutex::new(vec![flush_handle, compaction_handle]),
        })
    }

    /// Flushes whatever is left in the active memtable, stops the background
    /// workers, and transitions to `Closed`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the final synchronous flush fails; the engine is
    /// still marked `Closed` in that case, since retrying would replay the
    /// same data from the WAL on the next `open`.
    pub fn close(&self) -> Result<(), EngineError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Closed || *lifecycle == Lifecycle::Closing {
                return Ok(());
            }
            *lifecycle = Lifecycle::Closing;
        }

        let flush_result = {
            let mut w = self.write.lock();
            self.drain_to_disk(&mut w)
        };

        let (dead_flush_tx, _) = bounded::<()>(0);
        let (dead_compaction_tx, _) = bounded::<()>(0);
        *self.flush_tx.lock() = dead_flush_tx;
        *self.compaction_tx.lock() = dead_compaction_tx;

        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }

        *self.lifecycle.lock() = Lifecycle::Closed;
        info!(dir = %self.inner.dir.display(), "engine closed");
        flush_result
    }

    /// Returns the last background-worker failure message recorded, if any.
    /// Cleared only by a fresh [`Engine::open`] — this is a diagnostic signal,
    /// not a latch the caller is expected to reset.
    #[must_use]
    pub fn health(&self) -> Option<String> {
        self.inner.health.lock().clone()
    }

    pub(crate) fn check_open(&self) -> Result<(), EngineError> {
        match *self.lifecycle.lock() {
            Lifecycle::Open => Ok(()),
            _ => Err(EngineError::Closed),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

pub(crate) fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}

pub(crate) fn wal_path(dir: &Path, creation_ts: u64) -> PathBuf {
    dir.join(format!("wal-{creation_ts}.log"))
}

pub(crate) fn sst_path(dir: &Path, creation_ts: u64) -> PathBuf {
    dir.join(format!("sst-{creation_ts}.db"))
}

pub(crate) fn validate_key(key: &[u8]) -> Result<(), EngineError> {
    if key.is_empty() {
        return Err(EngineError::InvalidArgument("key must not be empty".into()));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(EngineError::InvalidArgument(format!(
            "key too large: {} bytes (max {MAX_KEY_SIZE})",
            key.len()
        )));
    }
    Ok(())
}

pub(crate) fn validate_value(value: &[u8]) -> Result<(), EngineError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(EngineError::InvalidArgument(format!(
            "value too large: {} bytes (max {MAX_VALUE_SIZE})",
            value.len()
        )));
    }
    Ok(())
}

pub(crate) fn wal_err(e: wal::WalError) -> EngineError {
    EngineError::from(e)
}

#[cfg(test)]
#[path = "tests/helpers.rs"]
mod test_helpers;
