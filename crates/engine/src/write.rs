//! Write path: `put`, `delete`, `incr`/`decr` and their `_by` variants, and
//! the freeze step that rotates the WAL and swaps in a fresh memtable once
//! the active one crosses `max_memtable_bytes`.
//!
//! Every mutation is appended to the WAL before it touches the memtable, and
//! the whole sequence — timestamp assignment, WAL append, memtable insert,
//! freeze check — runs under `Engine::write`, the engine's single write
//! mutex.

use std::sync::Arc;
use wal::WalRecord;

use crate::state::{EngineState, FrozenMemtable};
use crate::{now_ts, validate_key, validate_value, wal_err, wal_path, Engine, EngineError, Step, WriteGuard};

impl Engine {
    /// Inserts or overwrites `key` with `value`.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        self.check_open()?;
        validate_key(&key)?;
        validate_value(&value)?;

        let mut w = self.write.lock();
        self.put_locked(&mut w, key, value)
    }

    /// Deletes `key` by writing a tombstone. Idempotent: returns `Ok(())`
    /// even if `key` was already absent.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), EngineError> {
        self.check_open()?;
        validate_key(&key)?;

        let mut w = self.write.lock();
        self.delete_locked(&mut w, key)
    }

    /// Adds 1 to the numeric value at `key` (starting from 0 if absent) and
    /// returns the new value.
    pub fn incr(&self, key: Vec<u8>) -> Result<Step, EngineError> {
        self.incr_by(key, Step::Int(1))
    }

    /// Subtracts 1 from the numeric value at `key` (starting from 0 if
    /// absent) and returns the new value.
    pub fn decr(&self, key: Vec<u8>) -> Result<Step, EngineError> {
        self.incr_by(key, Step::Int(-1))
    }

    /// Adds `step` to the numeric value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NumericFormat`] if the existing value is not a
    /// valid UTF-8 integer or float.
    pub fn incr_by(&self, key: Vec<u8>, step: Step) -> Result<Step, EngineError> {
        self.check_open()?;
        validate_key(&key)?;

        let mut w = self.write.lock();
        let current = self.current_numeric(&key)?;
        let new_value = apply_step(current, step)?;
        let bytes = serialize_step(new_value);
        self.put_locked(&mut w, key, bytes)?;
        Ok(new_value)
    }

    /// Subtracts `step` from the numeric value at `key`.
    pub fn decr_by(&self, key: Vec<u8>, step: Step) -> Result<Step, EngineError> {
        self.incr_by(key, negate(step))
    }

    fn current_numeric(&self, key: &[u8]) -> Result<Step, EngineError> {
        match self.get(key)? {
            Some(bytes) => parse_step(&bytes),
            None => Ok(Step::Int(0)),
        }
    }

    fn put_locked(&self, w: &mut WriteGuard, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        w.timestamp += 1;
        let timestamp = w.timestamp;

        w.wal_writer
            .append(&WalRecord::Put {
                timestamp,
                key: key.clone(),
                value: value.clone(),
            })
            .map_err(wal_err)?;

        let snapshot = self.inner_state_snapshot();
        snapshot.mem.put(key.clone(), value.clone(), timestamp);
        self.cache.insert(key, value);

        self.maybe_freeze(w, &snapshot)
    }

    fn delete_locked(&self, w: &mut WriteGuard, key: Vec<u8>) -> Result<(), EngineError> {
        w.timestamp += 1;
        let timestamp = w.timestamp;

        w.wal_writer
            .append(&WalRecord::Delete {
                timestamp,
                key: key.clone(),
            })
            .map_err(wal_err)?;

        let snapshot = self.inner_state_snapshot();
        snapshot.mem.delete(key.clone(), timestamp);
        self.cache.remove(&key);

        self.maybe_freeze(w, &snapshot)
    }

    fn inner_state_snapshot(&self) -> Arc<EngineState> {
        self.inner.state.read().clone()
    }

    /// Rotates the WAL and swaps in a fresh memtable if the active one has
    /// crossed `max_memtable_bytes`. Runs under the write mutex; publishing
    /// the new snapshot additionally takes `state_lock` so it never races a
    /// concurrent publish from the flush or compaction workers.
    fn maybe_freeze(&self, w: &mut WriteGuard, snapshot: &Arc<EngineState>) -> Result<(), EngineError> {
        if snapshot.mem.approx_size() < self.inner.options.max_memtable_bytes {
            return Ok(());
        }
        self.freeze(w)
    }

    fn freeze(&self, w: &mut WriteGuard) -> Result<(), EngineError> {
        let _guard = self.inner.state_lock.lock();
        let snapshot = self.inner_state_snapshot();
        if snapshot.mem.is_empty() {
            return Ok(());
        }

        w.wal_writer.flush().map_err(wal_err)?;

        let new_creation_ts = now_ts();
        let new_wal_path = wal_path(&self.inner.dir, new_creation_ts);
        let new_writer = wal::WalWriter::create_with_batching(
            &new_wal_path,
            true,
            self.inner.options.wal_batch_records,
            self.inner.options.wal_batch_bytes,
        )
        .map_err(wal_err)?;

        let old_wal_path = std::mem::replace(&mut w.wal_path, new_wal_path);
        let old_creation_ts = std::mem::replace(&mut w.wal_creation_ts, new_creation_ts);
        let _old_writer = std::mem::replace(&mut w.wal_writer, new_writer);

        let frozen = Arc::new(FrozenMemtable {
            mem: snapshot.mem.clone(),
            wal_path: old_wal_path,
            creation_ts: old_creation_ts,
        });

        let mut imm = snapshot.imm.clone();
        imm.push(frozen);

        *self.inner.state.write() = Arc::new(EngineState {
            mem: Arc::new(memtable::Memtable::new()),
            imm,
            runs: snapshot.runs.clone(),
        });

        let _ = self.flush_tx.lock().try_send(());
        Ok(())
    }

    /// Flushes the live memtable (if non-empty) and drains every queued
    /// immutable memtable synchronously. Used by [`Engine::close`].
    pub(crate) fn drain_to_disk(&self, w: &mut WriteGuard) -> Result<(), EngineError> {
        self.freeze(w)?;
        w.wal_writer.sync_to_disk().map_err(wal_err)?;

        loop {
            match self.inner.flush_oldest_immutable() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => return Err(EngineError::from(e)),
            }
        }
        Ok(())
    }
}

fn parse_step(bytes: &[u8]) -> Result<Step, EngineError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| EngineError::NumericFormat("counter value is not valid UTF-8".into()))?;
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Step::Int(i));
    }
    text.parse::<f64>()
        .map(Step::Real)
        .map_err(|_| EngineError::NumericFormat(format!("cannot parse {text:?} as a number")))
}

fn apply_step(current: Step, step: Step) -> Result<Step, EngineError> {
    Ok(match (current, step) {
        (Step::Int(c), Step::Int(s)) => Step::Int(
            c.checked_add(s)
                .ok_or_else(|| EngineError::NumericFormat("counter overflow".into()))?,
        ),
        (Step::Int(c), Step::Real(s)) => Step::Real(c as f64 + s),
        (Step::Real(c), Step::Int(s)) => Step::Real(c + s as f64),
        (Step::Real(c), Step::Real(s)) => Step::Real(c + s),
    })
}

fn serialize_step(step: Step) -> Vec<u8> {
    match step {
        Step::Int(i) => i.to_string().into_bytes(),
        Step::Real(r) => r.to_string().into_bytes(),
    }
}

fn negate(step: Step) -> Step {
    match step {
        Step::Int(i) => Step::Int(-i),
        Step::Real(r) => Step::Real(-r),
    }
}

#[cfg(test)]
#[path = "tests/write_tests.rs"]
mod tests;
