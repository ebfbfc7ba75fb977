//! Shared helpers for engine integration tests.
//!
//! `max_memtable_bytes`'s enforced minimum (4 MiB) makes naturally crossing
//! the freeze threshold too slow for a test suite, so most tests drive flush
//! and compaction directly through these hooks instead of writing enough
//! data to trigger them organically.

use std::path::Path;

use crate::{Engine, EngineOptions};

pub fn open(dir: &Path) -> Engine {
    Engine::open(dir, EngineOptions::default()).expect("engine should open")
}

pub fn open_with(dir: &Path, options: EngineOptions) -> Engine {
    Engine::open(dir, options).expect("engine should open")
}

/// Freezes the active memtable (if non-empty) and synchronously drains every
/// queued immutable memtable to a sorted run.
pub fn force_flush(engine: &Engine) {
    let mut w = engine.write.lock();
    engine
        .drain_to_disk(&mut w)
        .expect("drain_to_disk should succeed");
}

pub fn run_count(engine: &Engine) -> usize {
    engine.inner.state.read().runs.len()
}

pub fn imm_count(engine: &Engine) -> usize {
    engine.inner.state.read().imm.len()
}

pub fn compact_now(engine: &Engine) {
    engine.inner.compact().expect("compaction should succeed");
}

pub fn sst_file_count(dir: &Path) -> usize {
    count_with_ext(dir, "db")
}

pub fn wal_file_count(dir: &Path) -> usize {
    count_with_ext(dir, "log")
}

fn count_with_ext(dir: &Path, ext: &str) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    e.path()
                        .extension()
                        .and_then(|s| s.to_str())
                        .map(|e| e == ext)
                        .unwrap_or(false)
                })
                .count()
        })
        .unwrap_or(0)
}
