use anyhow::{bail, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use memtable::ValueEntry;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::{read_footer, Footer};

/// Maximum key size we'll allocate during reads (64 KiB). Prevents OOM on corrupt files.
const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum value size we'll allocate during reads (16 MiB). Prevents OOM on corrupt files.
const MAX_VALUE_BYTES: usize = 16 * 1024 * 1024;

/// Reads a sorted run for point lookups and full ascending scans.
///
/// On [`open`](SSTableReader::open) the sparse index, membership filter, and
/// min/max key are loaded into memory — not the full key set, which may be
/// far larger. A persistent file handle is kept open for the lifetime of the
/// reader, wrapped in a `Mutex` so that `get` can be called through a shared
/// `&self` reference.
pub struct SSTableReader {
    /// Path to the run file on disk (kept for diagnostics and compaction cleanup).
    path: PathBuf,
    /// Sparse index: every Nth record's (key, data-section offset), ascending.
    sparse_index: Vec<(Vec<u8>, u64)>,
    bloom: BloomFilter,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    footer: Footer,
    file: Mutex<BufReader<File>>,
}

impl SSTableReader {
    /// Opens a sorted run and loads its sparse index, bloom filter, and
    /// min/max key into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is too small, the magic is wrong, or any
    /// I/O operation fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut f = File::open(&path_buf)?;

        let footer = read_footer(&mut f)?;

        f.seek(SeekFrom::Start(footer.trailer_offset))?;
        let sparse_count = f.read_u32::<LittleEndian>()? as usize;
        let mut sparse_index = Vec::with_capacity(sparse_count);
        for _ in 0..sparse_count {
            let key_len = f.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                bail!("corrupt sparse index: key_len {} exceeds maximum", key_len);
            }
            let mut key = vec![0u8; key_len];
            f.read_exact(&mut key)?;
            let offset = f.read_u64::<LittleEndian>()?;
            sparse_index.push((key, offset));
        }

        let bloom = BloomFilter::read_from(&mut f)?;

        let min_key_len = f.read_u32::<LittleEndian>()? as usize;
        let mut min_key = vec![0u8; min_key_len];
        f.read_exact(&mut min_key)?;
        let max_key_len = f.read_u32::<LittleEndian>()? as usize;
        let mut max_key = vec![0u8; max_key_len];
        f.read_exact(&mut max_key)?;

        f.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path_buf,
            sparse_index,
            bloom,
            min_key,
            max_key,
            footer,
            file: Mutex::new(BufReader::new(f)),
        })
    }

    /// Point lookup for a single key.
    ///
    /// Implements the run's point-lookup algorithm: range check against
    /// `(minKey, maxKey)`, then a membership-filter negative check, then a
    /// binary search of the sparse index for the greatest anchor <= `key`,
    /// followed by a forward linear scan from that anchor.
    ///
    /// Returns `Ok(Some(entry))` if the key exists in this run (the entry may
    /// be a tombstone with `value: None`). Returns `Ok(None)` if the key is
    /// not present.
    /// Checks the embedded bloom filter directly, without the min/max key
    /// range short-circuit `get` applies first. Exists for diagnostics and
    /// tests that want to observe the filter's false-positive behavior in
    /// isolation.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.bloom.may_contain(key)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<ValueEntry>> {
        if key < self.min_key.as_slice() || key > self.max_key.as_slice() {
            return Ok(None);
        }
        if !self.bloom.may_contain(key) {
            return Ok(None);
        }

        // Binary search the sparse index for the greatest anchor <= key.
        let start_offset = match self.sparse_index.partition_point(|(k, _)| k.as_slice() <= key) {
            0 => 0,
            n => self.sparse_index[n - 1].1,
        };

        let mut f = self
            .file
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(start_offset))?;

        let data_end = self.footer.trailer_offset;
        loop {
            if f.stream_position()? >= data_end {
                return Ok(None);
            }

            let key_len = f.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                bail!("corrupt data: key_len {} exceeds maximum", key_len);
            }
            let mut cur_key = vec![0u8; key_len];
            f.read_exact(&mut cur_key)?;

            let val_len = f.read_u32::<LittleEndian>()? as usize;
            if val_len > MAX_VALUE_BYTES {
                bail!("corrupt data: val_len {} exceeds maximum", val_len);
            }
            let value = if val_len == 0 {
                None
            } else {
                let mut val = vec![0u8; val_len];
                f.read_exact(&mut val)?;
                Some(val)
            };

            let timestamp = f.read_u64::<LittleEndian>()?;

            if cur_key.as_slice() == key {
                return Ok(Some(ValueEntry { timestamp, value }));
            }
            if cur_key.as_slice() > key {
                return Ok(None);
            }
        }
    }

    /// Returns an iterator over every record in the run in ascending key
    /// order, including tombstones.
    ///
    /// Used internally by compaction's merge step; never exposed as a public
    /// range-scan API.
    pub fn iter_all(&self) -> Result<Vec<(Vec<u8>, ValueEntry)>> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(0))?;

        let data_end = self.footer.trailer_offset;
        let mut out = Vec::with_capacity(self.footer.record_count as usize);
        while f.stream_position()? < data_end {
            let key_len = f.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                bail!("corrupt data: key_len {} exceeds maximum", key_len);
            }
            let mut key = vec![0u8; key_len];
            f.read_exact(&mut key)?;

            let val_len = f.read_u32::<LittleEndian>()? as usize;
            if val_len > MAX_VALUE_BYTES {
                bail!("corrupt data: val_len {} exceeds maximum", val_len);
            }
            let value = if val_len == 0 {
                None
            } else {
                let mut val = vec![0u8; val_len];
                f.read_exact(&mut val)?;
                Some(val)
            };

            let timestamp = f.read_u64::<LittleEndian>()?;
            out.push((key, ValueEntry { timestamp, value }));
        }

        Ok(out)
    }

    /// Path to the underlying run file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest timestamp stored in this run, recovered in O(1) from the footer.
    #[must_use]
    pub fn max_timestamp(&self) -> u64 {
        self.footer.max_timestamp
    }

    /// Creation timestamp, used to order runs during directory-scan recovery.
    #[must_use]
    pub fn creation_ts(&self) -> u64 {
        self.footer.creation_ts
    }

    /// Number of records in this run (including tombstones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.footer.record_count as usize
    }

    /// Returns `true` if the run contains zero records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.footer.record_count == 0
    }

    /// On-disk byte size of the `[DATA]` section.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.footer.byte_size
    }
}

impl AsRef<SSTableReader> for SSTableReader {
    fn as_ref(&self) -> &SSTableReader {
        self
    }
}

#[cfg(test)]
#[path = "tests/reader_tests.rs"]
mod tests;
