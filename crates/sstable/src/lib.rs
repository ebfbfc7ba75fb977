//! # Sorted Run — the storage engine's immutable, on-disk segment format
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold the
//! engine flushes it to disk as a sorted run. Runs are *write-once,
//! read-many* — once created they are never modified (only superseded during
//! compaction).
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA   key_len(u32) | key | value_len(u32) | value | timestamp(u64) │
//! │        ... repeated for each record, ascending by key ...      │
//! │        value_len == 0 marks a tombstone (empty value payload)  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ SPARSE sparse_index_count(u32) | { key_len(u32) | key |         │
//! │        offset(u64) } * count — every 16th record gets an anchor │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM  serialized membership filter                            │
//! ├───────────────────────────────────────────────────────────────┤
//! │ MINMAX minKeyLen(u32) | minKey | maxKeyLen(u32) | maxKey        │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always the last 44 bytes)                              │
//! │ trailer_offset | max_timestamp | record_count | byte_size |     │
//! │ creation_ts (all u64) | magic (u32) "RUN1"                     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The reader seeks to the fixed-size footer
//! from end-of-file, validates the magic, then uses `trailer_offset` to find
//! the variable-length `[SPARSE]`/`[MINMAX]` sections without needing to know
//! their size up front.
//!
//! Point lookups use the sparse index plus the bloom filter to avoid reading
//! the full data section (see [`SSTableReader::get`]); compaction streams the
//! full data section through [`MergeIterator`].

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{Footer, FOOTER_BYTES, RUN_MAGIC};
pub use merge::MergeIterator;
pub use reader::SSTableReader;
pub use writer::SSTableWriter;
