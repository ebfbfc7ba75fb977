//! # WAL — Write-Ahead Log
//!
//! Provides crash-safe durability for the storage engine.
//!
//! Every mutation (`PUT` or `DELETE`) is serialized into a binary frame and
//! appended to the WAL **before** the corresponding in-memory update. On
//! restart the WAL is replayed to reconstruct the memtable, guaranteeing that
//! no acknowledged write is lost.
//!
//! ## Binary Frame Format
//!
//! ```text
//! [kind: u8][key_len: u32 LE][key][value_len: u32 LE][value][timestamp: u64 LE][crc32: u32 LE]
//! ```
//!
//! `kind`: `0 = Put`, `1 = Delete`. `2` and `3` are reserved for `Incr`/`Decr`
//! and are never emitted — counter operations are materialized as `Put`
//! frames carrying the serialized result. `crc32` covers every byte of the
//! frame preceding it.
//!
//! Frames are self-describing (each carries its own lengths), so they can be
//! concatenated without an outer length prefix; a reader walks the file frame
//! by frame until it runs out of bytes.
//!
//! ## Batching
//!
//! Frames are accumulated into an in-memory buffer and flushed (written +
//! optionally fsynced) once the pending record count reaches
//! `batch_records`, the buffered byte count reaches `batch_bytes`, or the
//! caller explicitly calls [`WalWriter::flush`]. A single frame whose own
//! size exceeds `batch_bytes` flushes whatever is already buffered and is
//! then written directly, bypassing the buffer.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalWriter, WalReader, WalRecord};
//!
//! let mut w = WalWriter::create("wal.log", true).unwrap();
//! w.append(&WalRecord::Put {
//!     timestamp: 1,
//!     key: b"hello".to_vec(),
//!     value: b"world".to_vec(),
//! }).unwrap();
//! w.flush().unwrap();
//! drop(w);
//!
//! let mut r = WalReader::open("wal.log").unwrap();
//! r.replay(|rec| println!("{:?}", rec)).unwrap();
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Default number of buffered records before an implicit flush.
pub const DEFAULT_BATCH_RECORDS: usize = 1;
/// Default buffered byte threshold before an implicit flush.
pub const DEFAULT_BATCH_BYTES: usize = 64 * 1024;

const KIND_PUT: u8 = 0;
const KIND_DELETE: u8 = 1;
#[allow(dead_code)]
const KIND_INCR: u8 = 2;
#[allow(dead_code)]
const KIND_DECR: u8 = 3;

/// A single WAL frame representing either a key-value insertion or a deletion.
///
/// Each frame carries a monotonically non-decreasing **timestamp** that the
/// engine uses for ordering and conflict resolution across the memtable and
/// sorted runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key-value insertion.
    Put {
        /// Timestamp assigned by the engine's write path.
        timestamp: u64,
        /// The lookup key.
        key: Vec<u8>,
        /// The payload value.
        value: Vec<u8>,
    },
    /// A key deletion (tombstone).
    Delete {
        /// Timestamp assigned by the engine's write path.
        timestamp: u64,
        /// The key to delete.
        key: Vec<u8>,
    },
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A frame failed CRC validation or contained an unknown kind.
    #[error("corrupt record")]
    Corrupt,
}

fn encode_frame(buf: &mut Vec<u8>, kind: u8, key: &[u8], value: &[u8], timestamp: u64) {
    let start = buf.len();
    buf.push(kind);
    buf.write_u32::<LittleEndian>(key.len() as u32).unwrap();
    buf.extend_from_slice(key);
    buf.write_u32::<LittleEndian>(value.len() as u32).unwrap();
    buf.extend_from_slice(value);
    buf.write_u64::<LittleEndian>(timestamp).unwrap();

    let mut hasher = Crc32::new();
    hasher.update(&buf[start..]);
    let crc = hasher.finalize();
    buf.write_u32::<LittleEndian>(crc).unwrap();
}

/// Append-only WAL writer with batched, checksummed, self-describing frames.
pub struct WalWriter {
    file: File,
    sync: bool,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    pending_records: usize,
    batch_records: usize,
    batch_bytes: usize,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode with default batching
    /// (flush after every record, matching a fully-synchronous WAL).
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        Self::create_with_batching(path, sync, DEFAULT_BATCH_RECORDS, DEFAULT_BATCH_BYTES)
    }

    /// Opens (or creates) a WAL file with explicit batching thresholds.
    pub fn create_with_batching<P: AsRef<Path>>(
        path: P,
        sync: bool,
        batch_records: usize,
        batch_bytes: usize,
    ) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self {
            file,
            sync,
            buf: Vec::with_capacity(batch_bytes.min(1 << 20)),
            scratch: Vec::with_capacity(256),
            pending_records: 0,
            batch_records: batch_records.max(1),
            batch_bytes: batch_bytes.max(1),
        })
    }

    /// Serializes `record` and appends it, flushing per the batching policy.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        self.scratch.clear();
        match record {
            WalRecord::Put {
                timestamp,
                key,
                value,
            } => encode_frame(&mut self.scratch, KIND_PUT, key, value, *timestamp),
            WalRecord::Delete { timestamp, key } => {
                encode_frame(&mut self.scratch, KIND_DELETE, key, &[], *timestamp)
            }
        }

        let frame_len = self.scratch.len();

        if !self.buf.is_empty() && self.buf.len() + frame_len > self.batch_bytes {
            self.flush()?;
        }

        if frame_len > self.batch_bytes {
            // Oversized frame: the buffer is already flushed above, write directly.
            self.file.write_all(&self.scratch)?;
            self.file.flush()?;
            if self.sync {
                self.file.sync_all()?;
            }
            return Ok(());
        }

        self.buf.extend_from_slice(&self.scratch);
        self.pending_records += 1;

        if self.pending_records >= self.batch_records || self.buf.len() >= self.batch_bytes {
            self.flush()?;
        }

        Ok(())
    }

    /// Flushes any buffered frames to the underlying file and, if `sync` is
    /// set, fsyncs them to disk.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        self.buf.clear();
        self.pending_records = 0;
        Ok(())
    }

    /// Forces all buffered data to be written and fsynced, regardless of the
    /// `sync` setting.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        // Best-effort: a dropped writer should not lose already-acknowledged
        // frames sitting in the batch buffer, but errors here are unactionable.
        let _ = self.flush();
    }
}

/// Sequential WAL reader that yields valid records.
///
/// The reader is generic over any `Read` implementor, allowing it to be used
/// with real files (`WalReader<File>`) or in-memory buffers for testing.
///
/// During replay, each frame's CRC32 is verified. A truncated tail frame
/// (e.g., from a crash mid-write) is treated as a clean EOF — all fully
/// written frames before it are still returned.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every valid frame in the WAL, calling `apply` for each one.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** (no more bytes) -> returns `Ok(())`.
    /// - **Truncated tail** (partial frame at end, e.g., crash mid-write) ->
    ///   returns `Ok(())` after yielding all complete frames before it.
    /// - **CRC mismatch** -> returns `Err(WalError::Corrupt)`.
    /// - **Unknown kind** -> returns `Err(WalError::Corrupt)`.
    /// - **I/O error** -> returns `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        const MAX_FIELD_SIZE: u32 = 64 * 1024 * 1024; // 64MB safety cap per key/value

        loop {
            let kind = match self.rdr.read_u8() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            let mut hasher = Crc32::new();
            hasher.update(&[kind]);

            let key_len = match read_u32_hashed(&mut self.rdr, &mut hasher) {
                Some(v) => v?,
                None => return Ok(()),
            };
            if key_len > MAX_FIELD_SIZE {
                return Err(WalError::Corrupt);
            }
            let mut key = vec![0u8; key_len as usize];
            if !read_exact_hashed(&mut self.rdr, &mut key, &mut hasher)? {
                return Ok(());
            }

            let value_len = match read_u32_hashed(&mut self.rdr, &mut hasher) {
                Some(v) => v?,
                None => return Ok(()),
            };
            if value_len > MAX_FIELD_SIZE {
                return Err(WalError::Corrupt);
            }
            let mut value = vec![0u8; value_len as usize];
            if !read_exact_hashed(&mut self.rdr, &mut value, &mut hasher)? {
                return Ok(());
            }

            let timestamp = match read_u64_hashed(&mut self.rdr, &mut hasher) {
                Some(v) => v?,
                None => return Ok(()),
            };

            let expected_crc = hasher.finalize();
            let actual_crc = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };
            if actual_crc != expected_crc {
                return Err(WalError::Corrupt);
            }

            match kind {
                KIND_PUT => apply(WalRecord::Put {
                    timestamp,
                    key,
                    value,
                }),
                KIND_DELETE => apply(WalRecord::Delete { timestamp, key }),
                _ => return Err(WalError::Corrupt),
            }
        }
    }
}

fn read_u32_hashed<R: Read>(
    rdr: &mut BufReader<R>,
    hasher: &mut Crc32,
) -> Option<Result<u32, WalError>> {
    let mut bytes = [0u8; 4];
    match rdr.read_exact(&mut bytes) {
        Ok(()) => {
            hasher.update(&bytes);
            Some(Ok(u32::from_le_bytes(bytes)))
        }
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => None,
        Err(e) => Some(Err(WalError::Io(e))),
    }
}

fn read_u64_hashed<R: Read>(
    rdr: &mut BufReader<R>,
    hasher: &mut Crc32,
) -> Option<Result<u64, WalError>> {
    let mut bytes = [0u8; 8];
    match rdr.read_exact(&mut bytes) {
        Ok(()) => {
            hasher.update(&bytes);
            Some(Ok(u64::from_le_bytes(bytes)))
        }
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => None,
        Err(e) => Some(Err(WalError::Io(e))),
    }
}

/// Reads exactly `buf.len()` bytes, feeding them into `hasher`. Returns
/// `Ok(false)` on a truncated tail (clean EOF mid-field).
fn read_exact_hashed<R: Read>(
    rdr: &mut BufReader<R>,
    buf: &mut [u8],
    hasher: &mut Crc32,
) -> Result<bool, WalError> {
    match rdr.read_exact(buf) {
        Ok(()) => {
            hasher.update(buf);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(WalError::Io(e)),
    }
}
