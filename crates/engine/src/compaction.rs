//! Flush (memtable -> sorted run) and compaction (oldest runs -> one merged
//! run), both run by the background workers against `Inner` directly — they
//! never touch the write-path mutex.

use anyhow::Result;
use sstable::{MergeIterator, SSTableReader, SSTableWriter};
use std::sync::Arc;
use tracing::info;

use crate::state::EngineState;
use crate::{now_ts, sst_path, Inner};

impl Inner {
    /// Flushes the single oldest frozen memtable, if any, to a new sorted
    /// run and publishes the updated run list.
    ///
    /// Returns `Ok(true)` if it flushed one (the caller should immediately
    /// check for more), `Ok(false)` if there was nothing queued.
    pub(crate) fn flush_oldest_immutable(&self) -> Result<bool> {
        let snapshot = self.state.read().clone();
        let Some(frozen) = snapshot.imm.first().cloned() else {
            return Ok(false);
        };

        let new_sst_path = sst_path(&self.dir, frozen.creation_ts);
        SSTableWriter::write_from_memtable(
            &new_sst_path,
            &frozen.mem,
            frozen.creation_ts,
            self.options.filter_bits_per_key,
        )?;
        let reader = Arc::new(SSTableReader::open(&new_sst_path)?);

        {
            let _guard = self.state_lock.lock();
            let snapshot = self.state.read().clone();
            // Freezes only ever append to the tail of `imm`, so the entry we
            // just flushed is still at the front.
            let mut imm = snapshot.imm.clone();
            imm.remove(0);
            let mut runs = snapshot.runs.clone();
            runs.push(reader);

            *self.state.write() = Arc::new(EngineState {
                mem: snapshot.mem.clone(),
                imm,
                runs,
            });
        }

        let _ = std::fs::remove_file(&frozen.wal_path);
        info!(path = %new_sst_path.display(), "flushed memtable to sorted run");
        Ok(true)
    }

    /// Merges the oldest half of the run list into one new run, if the run
    /// count has reached `compaction_trigger_run_count`.
    ///
    /// Tombstone GC: a tombstone from the selected runs is dropped unless the
    /// live memtable or an in-flight immutable memtable still references the
    /// key — those haven't been flushed yet, so a crash-recovery replay could
    /// still need the tombstone to shadow older data once it reaches disk.
    pub(crate) fn compact(&self) -> Result<()> {
        let snapshot = self.state.read().clone();
        let total = snapshot.runs.len();
        if total < self.options.compaction_trigger_run_count.max(2) {
            return Ok(());
        }

        let selected_count = total / 2;
        let selected: Vec<Arc<SSTableReader>> = snapshot.runs[..selected_count].to_vec();
        let remaining: Vec<Arc<SSTableReader>> = snapshot.runs[selected_count..].to_vec();

        let estimated_count: usize = selected.iter().map(|r| r.len()).sum();
        let mut merge = MergeIterator::new(&selected)?;

        let creation_ts = now_ts();
        let new_sst_path = sst_path(&self.dir, creation_ts);

        let mut merge_error: Option<anyhow::Error> = None;
        let streaming = std::iter::from_fn(|| loop {
            match merge.next_entry() {
                Ok(Some((key, entry))) => {
                    let still_live = snapshot.mem.contains_key(&key)
                        || snapshot.imm.iter().any(|f| f.mem.contains_key(&key));
                    if entry.value.is_none() && !still_live {
                        continue;
                    }
                    return Some((key, entry));
                }
                Ok(None) => return None,
                Err(e) => {
                    merge_error = Some(e);
                    return None;
                }
            }
        });

        let write_result = SSTableWriter::write_from_iterator(
            &new_sst_path,
            estimated_count,
            streaming,
            creation_ts,
            self.options.filter_bits_per_key,
        );

        if let Some(e) = merge_error {
            let _ = std::fs::remove_file(new_sst_path.with_extension("db.tmp"));
            return Err(e);
        }

        match write_result {
            Ok(()) => {}
            Err(e) if e.to_string().contains("empty") => {
                // Every selected run was fully tombstoned away: splice the
                // selected runs out without adding a replacement.
                let _guard = self.state_lock.lock();
                let snapshot = self.state.read().clone();
                *self.state.write() = Arc::new(EngineState {
                    mem: snapshot.mem.clone(),
                    imm: snapshot.imm.clone(),
                    runs: remaining.clone(),
                });
                for r in &selected {
                    let _ = std::fs::remove_file(r.path());
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let new_reader = Arc::new(SSTableReader::open(&new_sst_path)?);

        {
            let _guard = self.state_lock.lock();
            let snapshot = self.state.read().clone();
            let mut runs = Vec::with_capacity(remaining.len() + 1);
            runs.push(new_reader);
            runs.extend(remaining.iter().cloned());

            *self.state.write() = Arc::new(EngineState {
                mem: snapshot.mem.clone(),
                imm: snapshot.imm.clone(),
                runs,
            });
        }

        for r in &selected {
            let _ = std::fs::remove_file(r.path());
        }

        info!(
            path = %new_sst_path.display(),
            merged_runs = selected.len(),
            "compaction complete"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/compaction_tests.rs"]
mod tests;
