//! Sorted-run binary format constants and trailer/footer read/write helpers.
//!
//! ```text
//! [DATA]    repeated: KeyLen(4B) | Key | ValueLen(4B) | Value | Timestamp(8B)
//! [SPARSE]  sparse_index_count(4B) | { KeyLen(4B) | Key | Offset(8B) } * count
//! [BLOOM]   filter_bits_len(8B) | bits | k(4B)
//! [MINMAX]  minKeyLen(4B) | minKey | maxKeyLen(4B) | maxKey
//! [FOOTER]  trailer_offset(8B) | max_timestamp(8B) | record_count(8B) | byte_size(8B) | creation_ts(8B) | magic(4B)
//! ```
//!
//! `[FOOTER]` is a fixed 44 bytes and always sits at the end of the file, so
//! a reader can determine both the magic (last 4 bytes) and every other
//! footer field by seeking from EOF without knowing the variable-length
//! `[SPARSE]`/`[MINMAX]` sizes up front. `trailer_offset` then points back to
//! the start of `[SPARSE]`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Result as IoResult, Seek, SeekFrom, Write};

/// Magic number identifying a sorted-run file (ASCII "RUN1").
pub const RUN_MAGIC: u32 = 0x5255_4e31;

/// Size of the footer in bytes: 8 (`trailer_offset`) + 8 (`max_timestamp`) +
/// 8 (`record_count`) + 8 (`byte_size`) + 8 (`creation_ts`) + 4 (`magic`).
pub const FOOTER_BYTES: u64 = 8 + 8 + 8 + 8 + 8 + 4;

/// Parsed sorted-run footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Byte offset of the start of the `[SPARSE]` section.
    pub trailer_offset: u64,
    /// Highest timestamp of any record in this run.
    pub max_timestamp: u64,
    /// Number of records in `[DATA]`, including tombstones.
    pub record_count: u64,
    /// Total byte size of `[DATA]` (used for compaction size accounting).
    pub byte_size: u64,
    /// Creation timestamp, used to order runs during directory-scan recovery.
    pub creation_ts: u64,
}

/// Writes the footer to `w`.
pub fn write_footer<W: Write>(w: &mut W, footer: &Footer) -> IoResult<()> {
    w.write_u64::<LittleEndian>(footer.trailer_offset)?;
    w.write_u64::<LittleEndian>(footer.max_timestamp)?;
    w.write_u64::<LittleEndian>(footer.record_count)?;
    w.write_u64::<LittleEndian>(footer.byte_size)?;
    w.write_u64::<LittleEndian>(footer.creation_ts)?;
    w.write_u32::<LittleEndian>(RUN_MAGIC)?;
    Ok(())
}

/// Reads the footer from `r`, first checking the magic at the very end of
/// the file before seeking back to read the rest of the fixed-size footer.
pub fn read_footer<R: Read + Seek>(r: &mut R) -> IoResult<Footer> {
    let filesize = r.seek(SeekFrom::End(0))?;
    if filesize < FOOTER_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "file too small for a sorted-run footer",
        ));
    }

    r.seek(SeekFrom::End(-4))?;
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != RUN_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown sorted-run magic: {:#x}", magic),
        ));
    }

    r.seek(SeekFrom::End(-(FOOTER_BYTES as i64)))?;
    let trailer_offset = r.read_u64::<LittleEndian>()?;
    let max_timestamp = r.read_u64::<LittleEndian>()?;
    let record_count = r.read_u64::<LittleEndian>()?;
    let byte_size = r.read_u64::<LittleEndian>()?;
    let creation_ts = r.read_u64::<LittleEndian>()?;
    let _magic = r.read_u32::<LittleEndian>()?;

    Ok(Footer {
        trailer_offset,
        max_timestamp,
        record_count,
        byte_size,
        creation_ts,
    })
}
