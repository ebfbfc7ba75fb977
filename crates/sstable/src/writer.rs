use anyhow::Result;
use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use memtable::{Memtable, ValueEntry};
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use crate::format::{write_footer, Footer};

/// Converts a bits-per-key budget into the false positive rate it buys,
/// using the standard bloom filter relation `p = (1 - e^(-k*n/m))^k` reduced
/// to its bits-per-key form at the optimal `k`: `p ~= 2^(-bits_per_key * ln2)`.
fn fpr_from_bits_per_key(bits_per_key: usize) -> f64 {
    let bits_per_key = bits_per_key as f64;
    let ln2 = std::f64::consts::LN_2;
    (-bits_per_key * ln2 * ln2).exp().clamp(1e-6, 0.5)
}

/// Every `SPARSE_INDEX_STRIDE`th record gets an anchor entry in the sparse
/// index, per the sorted run's point-lookup algorithm (binary search the
/// anchors, then linear-scan forward).
const SPARSE_INDEX_STRIDE: usize = 16;

/// Writes a [`Memtable`] to disk as an immutable sorted run.
///
/// The writer is stateless — all work happens inside the single static
/// methods below. The write is crash-safe: data is first written to a
/// temporary file, fsynced, and then atomically renamed to the final path.
pub struct SSTableWriter {}

/// Bits-per-key used when a caller doesn't care to tune the bloom filter
/// (tests, ad-hoc tooling). The engine facade always passes its configured
/// `filter_bits_per_key` explicitly rather than relying on this.
pub const DEFAULT_BITS_PER_KEY: usize = 10;

impl SSTableWriter {
    /// Flushes `mem` to a new sorted run at `path`.
    ///
    /// # File Layout
    ///
    /// ```text
    /// [DATA]   repeated: KeyLen(4B) | Key | ValueLen(4B) | Value | Timestamp(8B)
    /// [SPARSE] sparse_index_count(4B) | { KeyLen(4B) | Key | Offset(8B) } * count
    /// [BLOOM]  serialized BloomFilter
    /// [MINMAX] minKeyLen(4B) | minKey | maxKeyLen(4B) | maxKey
    /// [FOOTER] trailer_offset | max_timestamp | record_count | byte_size | creation_ts | magic
    /// ```
    ///
    /// A record with `ValueLen == 0` is a tombstone — tombstones carry an
    /// empty value payload, matching the memtable's `ValueEntry { value: None }`.
    ///
    /// # Crash Safety
    ///
    /// Writes to `path` with a `.tmp` extension, calls `sync_all()`, then
    /// atomically renames. If the process crashes mid-write the temp file is
    /// left behind and ignored on recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the memtable is empty, or on any I/O failure.
    pub fn write_from_memtable(
        path: &Path,
        mem: &Memtable,
        creation_ts: u64,
        bits_per_key: usize,
    ) -> Result<()> {
        if mem.is_empty() {
            anyhow::bail!("refusing to write an empty sorted run (empty memtable)");
        }
        let iter = mem.iter();
        Self::write_internal(path, mem.len(), iter, creation_ts, bits_per_key)
    }

    /// Writes a sorted run from an iterator of `(key, ValueEntry)` pairs.
    ///
    /// This is the **streaming compaction** entry point. Unlike
    /// [`write_from_memtable`](SSTableWriter::write_from_memtable), this
    /// method does not require the entire dataset to be materialized in a
    /// `Memtable`. Entries are consumed one at a time and written directly to
    /// disk, keeping memory usage proportional to the bloom filter + sparse
    /// index (not the data).
    ///
    /// # Arguments
    ///
    /// * `path` – destination sorted-run file path.
    /// * `expected_count` – estimated number of entries (used to size the
    ///   bloom filter). Over-estimating is safe; under-estimating increases
    ///   the false-positive rate.
    /// * `iter` – an iterator yielding `(key, ValueEntry)` in **sorted key
    ///   order** (ascending, no duplicate keys). The caller is responsible
    ///   for deduplication.
    /// * `bits_per_key` – bloom filter size budget per key; higher values
    ///   buy a lower false-positive rate at the cost of more disk space.
    ///
    /// # Errors
    ///
    /// Returns an error if the iterator yields zero entries or on I/O failure.
    pub fn write_from_iterator<I>(
        path: &Path,
        expected_count: usize,
        iter: I,
        creation_ts: u64,
        bits_per_key: usize,
    ) -> Result<()>
    where
        I: Iterator<Item = (Vec<u8>, ValueEntry)>,
    {
        Self::write_internal(path, expected_count.max(1), iter, creation_ts, bits_per_key)
    }

    fn write_internal<I>(
        path: &Path,
        expected_count: usize,
        iter: I,
        creation_ts: u64,
        bits_per_key: usize,
    ) -> Result<()>
    where
        I: Iterator<Item = (Vec<u8>, ValueEntry)>,
    {
        let tmp_path = path.with_extension("db.tmp");
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        let mut bloom = BloomFilter::new(expected_count.max(1), fpr_from_bits_per_key(bits_per_key));
        let mut sparse_index: Vec<(Vec<u8>, u64)> = Vec::new();
        let mut min_key: Option<Vec<u8>> = None;
        let mut max_key: Option<Vec<u8>> = None;
        let mut max_timestamp: u64 = 0;
        let mut record_count: u64 = 0;

        for (key, entry) in iter {
            let offset = file.stream_position()?;

            if record_count % (SPARSE_INDEX_STRIDE as u64) == 0 {
                sparse_index.push((key.clone(), offset));
            }

            file.write_u32::<LittleEndian>(key.len() as u32)?;
            file.write_all(&key)?;
            match &entry.value {
                Some(v) => {
                    file.write_u32::<LittleEndian>(v.len() as u32)?;
                    file.write_all(v)?;
                }
                None => {
                    file.write_u32::<LittleEndian>(0)?;
                }
            }
            file.write_u64::<LittleEndian>(entry.timestamp)?;

            bloom.insert(&key);
            max_timestamp = max_timestamp.max(entry.timestamp);
            if min_key.is_none() {
                min_key = Some(key.clone());
            }
            max_key = Some(key.clone());
            record_count += 1;
        }

        if record_count == 0 {
            drop(file);
            let _ = std::fs::remove_file(&tmp_path);
            anyhow::bail!("refusing to write an empty sorted run (no entries)");
        }

        let byte_size = file.stream_position()?;
        let trailer_offset = byte_size;

        // [SPARSE]
        file.write_u32::<LittleEndian>(sparse_index.len() as u32)?;
        for (key, offset) in &sparse_index {
            file.write_u32::<LittleEndian>(key.len() as u32)?;
            file.write_all(key)?;
            file.write_u64::<LittleEndian>(*offset)?;
        }

        // [BLOOM]
        bloom.write_to(&mut file)?;

        // [MINMAX]
        let min_key = min_key.unwrap();
        let max_key = max_key.unwrap();
        file.write_u32::<LittleEndian>(min_key.len() as u32)?;
        file.write_all(&min_key)?;
        file.write_u32::<LittleEndian>(max_key.len() as u32)?;
        file.write_all(&max_key)?;

        // [FOOTER]
        write_footer(
            &mut file,
            &Footer {
                trailer_offset,
                max_timestamp,
                record_count,
                byte_size,
                creation_ts,
            },
        )?;

        file.flush()?;
        file.into_inner()?.sync_all()?;

        rename(&tmp_path, path)?;

        // Fsync the parent directory to ensure the rename is durable. On
        // NTFS this is a no-op (metadata is journaled), but on ext4/XFS a
        // crash after rename but before dir sync can lose the entry.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/writer_tests.rs"]
mod tests;
