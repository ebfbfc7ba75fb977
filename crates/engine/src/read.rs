//! Read path: `get` and `has`.
//!
//! Checks the cache, then the live memtable, then immutable memtables
//! (newest first), then sorted runs (newest first). The first match wins;
//! a tombstone at any layer shadows older values and evicts the cache entry.
//!
//! There is no public range-scan surface — only point lookups. Internal
//! full-key iteration (used by flush and compaction) lives on `Memtable` and
//! `SSTableReader` directly, never exposed here.

use memtable::ValueEntry;

use crate::{validate_key, Engine, EngineError};

impl Engine {
    /// Looks up `key`, returning its current value if present and live.
    ///
    /// # Errors
    ///
    /// Returns an error if a sorted run's on-disk data fails to parse.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        self.check_open()?;
        validate_key(key)?;

        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value));
        }

        let snapshot = self.inner.state.read().clone();

        if let Some(entry) = snapshot.mem.get_entry(key) {
            return Ok(self.resolve(key, entry));
        }
        for frozen in snapshot.imm.iter().rev() {
            if let Some(entry) = frozen.mem.get_entry(key) {
                return Ok(self.resolve(key, entry));
            }
        }
        for run in snapshot.runs.iter().rev() {
            match run.get(key) {
                Ok(Some(entry)) => return Ok(self.resolve(key, entry)),
                Ok(None) => continue,
                Err(e) => return Err(EngineError::from(e)),
            }
        }

        Ok(None)
    }

    /// Returns whether `key` currently holds a live value.
    pub fn has(&self, key: &[u8]) -> Result<bool, EngineError> {
        Ok(self.get(key)?.is_some())
    }

    fn resolve(&self, key: &[u8], entry: ValueEntry) -> Option<Vec<u8>> {
        match entry.value {
            Some(value) => {
                self.cache.insert(key.to_vec(), value.clone());
                Some(value)
            }
            None => {
                self.cache.remove(key);
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/read_tests.rs"]
mod tests;
