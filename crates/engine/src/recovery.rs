//! Cold-start recovery: rebuilds the active memtable from whatever WAL files
//! are on disk and reopens every existing sorted run.
//!
//! There is no persisted manifest. The run list is reconstructed by scanning
//! the directory for `sst-*.db` files and reading each one's footer; a run's
//! `creation_ts` (not its filename) is the source of truth for ordering.

use anyhow::{Context, Result};
use memtable::Memtable;
use sstable::SSTableReader;
use std::path::{Path, PathBuf};
use tracing::warn;
use wal::{WalReader, WalRecord, WalWriter};

use crate::{now_ts, wal_path};

/// Everything recovered from disk at `Engine::open`.
pub(crate) struct Recovered {
    pub mem: Memtable,
    pub runs: Vec<SSTableReader>,
    pub timestamp: u64,
    pub active_wal_path: PathBuf,
    pub active_wal_creation_ts: u64,
}

/// Scans `dir` for leftover `.db.tmp` files from a write that never
/// completed its atomic rename, and removes them.
pub(crate) fn cleanup_tmp_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(".db.tmp") {
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

/// Recovers the engine's starting state from `dir`.
///
/// If a prior process crashed between rotating the WAL and publishing the
/// resulting sorted run, more than one `wal-*.log` file can be found on
/// disk. All of them are replayed into a single memtable (later files'
/// timestamps dominate, same as normal dedup), and the replayed records are
/// then rewritten into one brand-new active WAL before the stale files are
/// removed — so the on-disk layout always carries exactly one WAL file again
/// once recovery completes, without ever having a window where recovered
/// data exists only in memory.
pub(crate) fn recover(dir: &Path) -> Result<Recovered> {
    let mut wal_files = scan_numbered(dir, "wal-", ".log")?;
    wal_files.sort_by_key(|(ts, _)| *ts);

    let mut sst_files = scan_numbered(dir, "sst-", ".db")?;

    let mut mem = Memtable::new();
    let mut max_timestamp = 0u64;

    for (_, path) in &wal_files {
        let mut reader = match WalReader::open(path) {
            Ok(r) => r,
            Err(wal::WalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("opening wal file {}", path.display()))
            }
        };
        let replay_result = reader.replay(|rec| match rec {
            WalRecord::Put {
                timestamp,
                key,
                value,
            } => {
                mem.put(key, value, timestamp);
                max_timestamp = max_timestamp.max(timestamp);
            }
            WalRecord::Delete { timestamp, key } => {
                mem.delete(key, timestamp);
                max_timestamp = max_timestamp.max(timestamp);
            }
        });

        // A CRC mismatch or unknown frame kind marks a corrupt tail the same
        // way a partial frame does: everything before it was already applied
        // to `mem` by the closure above, so recovery keeps that prefix and
        // treats the rest of the file as if it had hit a clean EOF there.
        match replay_result {
            Ok(()) => {}
            Err(wal::WalError::Corrupt) => {
                warn!(
                    path = %path.display(),
                    "wal file has a corrupt tail frame; truncating replay at the first bad frame"
                );
            }
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("replaying wal file {}", path.display()))
            }
        }
    }

    let mut runs = Vec::with_capacity(sst_files.len());
    for (_, path) in sst_files.drain(..) {
        let reader = SSTableReader::open(&path)
            .with_context(|| format!("opening sorted run {}", path.display()))?;
        max_timestamp = max_timestamp.max(reader.max_timestamp());
        runs.push(reader);
    }
    runs.sort_by_key(|r| r.creation_ts());

    let active_wal_creation_ts = now_ts();
    let active_wal_path = wal_path(dir, active_wal_creation_ts);
    {
        let mut writer = WalWriter::create(&active_wal_path, true)?;
        for (key, entry) in mem.iter() {
            match entry.value {
                Some(value) => writer.append(&WalRecord::Put {
                    timestamp: entry.timestamp,
                    key,
                    value,
                })?,
                None => writer.append(&WalRecord::Delete {
                    timestamp: entry.timestamp,
                    key,
                })?,
            }
        }
        writer.sync_to_disk()?;
    }
    for (_, path) in &wal_files {
        let _ = std::fs::remove_file(path);
    }

    Ok(Recovered {
        mem,
        runs,
        timestamp: max_timestamp,
        active_wal_path,
        active_wal_creation_ts,
    })
}

/// Finds files named `<prefix><u64><suffix>` in `dir`, returning each
/// parsed number alongside its path.
fn scan_numbered(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<(u64, PathBuf)>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(rest) = name.strip_prefix(prefix).and_then(|s| s.strip_suffix(suffix)) {
            if let Ok(ts) = rest.parse::<u64>() {
                out.push((ts, path));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "tests/recovery_tests.rs"]
mod tests;
