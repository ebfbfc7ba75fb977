//! Streaming merge iterator over multiple [`SSTableReader`]s.
//!
//! Produces `(key, ValueEntry)` pairs in ascending key order. When the same
//! key appears in multiple runs, only the entry with the **highest
//! timestamp** is emitted (newest wins); ties are broken by the creation
//! order of the containing runs (the later run wins).
//!
//! This is the core primitive for compaction: walk N input runs in sorted
//! order, deduplicate by timestamp, and stream the result into a new run.
//! Each source is scanned with its own sequential file cursor, so memory
//! stays proportional to one buffered record per source, not the full
//! dataset.

use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use memtable::ValueEntry;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::SSTableReader;

const MAX_KEY_BYTES: usize = 64 * 1024;
const MAX_VALUE_BYTES: usize = 16 * 1024 * 1024;

/// A sequential, forward-only cursor over one run's `[DATA]` section.
///
/// Holds its own file handle (independent of the reader's point-lookup
/// handle) so multiple cursors can be scanned concurrently during a merge
/// without contending on a shared `Mutex`.
struct RunCursor {
    file: BufReader<File>,
    data_end: u64,
    creation_ts: u64,
}

impl RunCursor {
    fn open(reader: &SSTableReader) -> Result<Self> {
        let file = File::open(reader.path())?;
        let mut file = BufReader::new(file);
        file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            file,
            data_end: reader.byte_size(),
            creation_ts: reader.creation_ts(),
        })
    }

    fn next(&mut self) -> Result<Option<(Vec<u8>, ValueEntry)>> {
        if self.file.stream_position()? >= self.data_end {
            return Ok(None);
        }

        let key_len = self.file.read_u32::<LittleEndian>()? as usize;
        anyhow::ensure!(key_len <= MAX_KEY_BYTES, "corrupt data: key_len too large");
        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;

        let val_len = self.file.read_u32::<LittleEndian>()? as usize;
        anyhow::ensure!(val_len <= MAX_VALUE_BYTES, "corrupt data: val_len too large");
        let value = if val_len == 0 {
            None
        } else {
            let mut val = vec![0u8; val_len];
            self.file.read_exact(&mut val)?;
            Some(val)
        };

        let timestamp = self.file.read_u64::<LittleEndian>()?;
        Ok(Some((key, ValueEntry { timestamp, value })))
    }
}

/// A pending `(key, entry)` from one run, used for heap-based merge ordering.
struct HeapEntry {
    key: Vec<u8>,
    entry: ValueEntry,
    source: usize,
    creation_ts: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the *smallest* key first, so
        // reverse the key comparison. On tie, prefer the later-created run.
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Merges multiple sorted runs into a single ascending stream of
/// `(key, ValueEntry)`, deduplicating by timestamp (ties broken by creation
/// order — later run wins).
pub struct MergeIterator {
    cursors: Vec<RunCursor>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    /// Creates a new merge iterator over the given sorted runs.
    ///
    /// `readers` should be ordered oldest-created first so that ties are
    /// resolved by "later run wins" via the `source` index. Accepts either
    /// owned readers or anything that derefs to one (e.g. `Arc<SSTableReader>`
    /// from the engine's copy-on-write run list), via `AsRef`.
    pub fn new<T: AsRef<SSTableReader>>(readers: &[T]) -> Result<Self> {
        let mut cursors = Vec::with_capacity(readers.len());
        let mut heap = BinaryHeap::new();

        for (i, reader) in readers.iter().enumerate() {
            let reader = reader.as_ref();
            let mut cursor = RunCursor::open(reader)?;
            let creation_ts = cursor.creation_ts;
            if let Some((key, entry)) = cursor.next()? {
                heap.push(HeapEntry {
                    key,
                    entry,
                    source: i,
                    creation_ts,
                });
            }
            cursors.push(cursor);
        }

        Ok(Self { cursors, heap })
    }

    /// Returns the next `(key, ValueEntry)` in sorted order, or `None` when
    /// all sources are exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, ValueEntry)>> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };

        if let Some((next_key, next_entry)) = self.cursors[top.source].next()? {
            let creation_ts = self.cursors[top.source].creation_ts;
            self.heap.push(HeapEntry {
                key: next_key,
                entry: next_entry,
                source: top.source,
                creation_ts,
            });
        }

        let best_key = top.key;
        let mut best_entry = top.entry;
        let mut best_creation_ts = top.creation_ts;

        while let Some(peek) = self.heap.peek() {
            if peek.key != best_key {
                break;
            }
            let dup = self.heap.pop().unwrap();

            let dup_wins = dup.entry.timestamp > best_entry.timestamp
                || (dup.entry.timestamp == best_entry.timestamp
                    && dup.creation_ts > best_creation_ts);
            if dup_wins {
                best_entry = dup.entry;
                best_creation_ts = dup.creation_ts;
            }

            if let Some((next_key, next_entry)) = self.cursors[dup.source].next()? {
                let creation_ts = self.cursors[dup.source].creation_ts;
                self.heap.push(HeapEntry {
                    key: next_key,
                    entry: next_entry,
                    source: dup.source,
                    creation_ts,
                });
            }
        }

        Ok(Some((best_key, best_entry)))
    }

    /// Collects all remaining entries into a `Vec`. Useful for testing.
    pub fn collect_all(&mut self) -> Result<Vec<(Vec<u8>, ValueEntry)>> {
        let mut result = Vec::new();
        while let Some(pair) = self.next_entry()? {
            result.push(pair);
        }
        Ok(result)
    }
}

#[cfg(test)]
#[path = "tests/merge_tests.rs"]
mod tests;
