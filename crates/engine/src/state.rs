//! Immutable, copy-on-write snapshot of everything a read needs to see.
//!
//! A whole [`EngineState`] is swapped in one atomic pointer write (guarded by
//! `Shared::state_lock` on the publishing side). Readers take a cheap `Arc`
//! clone of the current snapshot and never block a writer or a background
//! worker.

use memtable::Memtable;
use sstable::SSTableReader;
use std::path::PathBuf;
use std::sync::Arc;

/// A memtable that has been swapped out of the write path and is waiting for
/// (or undergoing) flush to a sorted run.
pub(crate) struct FrozenMemtable {
    pub mem: Arc<Memtable>,
    /// WAL file this memtable's records were durable in before rotation.
    /// Unlinked once the corresponding sorted run is published.
    pub wal_path: PathBuf,
    pub creation_ts: u64,
}

/// The engine's full in-memory view: the live memtable, any memtables frozen
/// but not yet flushed, and every sorted run on disk.
///
/// `imm` and `runs` are both ordered oldest-first; reads walk them in reverse
/// so the newest version of a key is found first.
pub(crate) struct EngineState {
    pub mem: Arc<Memtable>,
    pub imm: Vec<Arc<FrozenMemtable>>,
    pub runs: Vec<Arc<SSTableReader>>,
}

impl EngineState {
    pub fn new(mem: Memtable, runs: Vec<SSTableReader>) -> Self {
        Self {
            mem: Arc::new(mem),
            imm: Vec::new(),
            runs: runs.into_iter().map(Arc::new).collect(),
        }
    }
}
