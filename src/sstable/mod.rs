//! Sorted String Table (SST) module.
//!
//! An SST is an **immutable**, **disk-backed** run of [`KeyValue`] records
//! sorted by key.  Writers produce one SST per flushed sorted run; the
//! merge-tree reader consumes many of them at once and resolves versions
//! across files.  A single SST never resolves versions itself — duplicate
//! keys across files are the merge reader's problem, and duplicate keys
//! within one file do not occur (the writer deduplicates its sorted input
//! upstream).
//!
//! # On-disk layout
//!
//! ```text
//! [HEADER_BYTES]
//! [DATA_BLOCK_LEN_LE][DATA_BLOCK_BYTES][DATA_BLOCK_CRC32_LE]
//! [DATA_BLOCK_LEN_LE][DATA_BLOCK_BYTES][DATA_BLOCK_CRC32_LE]
//! ...
//! [PROPERTIES_LEN_LE][PROPERTIES_BYTES][PROPERTIES_CRC32_LE]
//! [INDEX_LEN_LE][INDEX_BYTES][INDEX_CRC32_LE]
//! [FOOTER_BYTES]
//! ```
//!
//! - **Header** — magic, format version, CRC32.
//! - **Data blocks** — concatenated encoded [`KeyValue`] cells, ~4 KiB per
//!   block, each block CRC-protected.
//! - **Properties block** — row count, min/max key, and columnar key/value
//!   statistics.  Served without touching any data block.
//! - **Index block** — first key and block handle of every data block.
//! - **Footer** — handles of the properties and index blocks, total file
//!   size, CRC32.
//!
//! # Sub-modules
//!
//! - [`builder`] — [`SstWriter`] building an SST from a sorted record
//!   stream and deriving its [`SstFileMeta`].
//! - [`reader`] — [`SstReader`] streaming records back out in batches,
//!   behind the [`RecordReader`] contract.
//!
//! # Concurrency model
//!
//! SSTs are write-once and content-immutable, so reads are lock-free; any
//! number of readers may mmap the same file concurrently.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod reader;

#[cfg(test)]
mod tests;

pub use builder::SstWriter;
pub use reader::{RecordBatch, RecordReader, SstReader};

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{fs::File, io, path::Path};

use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use thiserror::Error;

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::row::Row;
use crate::stats::FieldStats;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

const SST_MAGIC: [u8; 4] = *b"TSS0";
const SST_VERSION: u32 = 1;
const SST_HEADER_SIZE: usize = 12;
const SST_FOOTER_SIZE: usize = 44;
const SST_BLOCK_TARGET_SIZE: usize = 4096;
const BLOCK_LEN_SIZE: usize = 4;
const BLOCK_CRC_SIZE: usize = 4;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by SST operations (build, open, read).
#[derive(Debug, Error)]
pub enum SstError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A block or structural checksum did not match.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// Structural damage: bad magic, truncated block, trailing garbage.
    #[error("malformed SST: {0}")]
    Malformed(String),
}

// ------------------------------------------------------------------------------------------------
// SstFileMeta — the descriptor travelling through manifests
// ------------------------------------------------------------------------------------------------

/// Descriptor of one SST file, immutable once written.
///
/// This is what manifests record and what the scan planner hands to the
/// merge reader; opening the file itself is deferred until its records
/// are actually needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstFileMeta {
    /// File name inside its bucket directory.
    pub file_name: String,
    /// Total file size in bytes.
    pub file_size: u64,
    /// Number of records in the file.
    pub row_count: u64,
    /// Smallest key in the file.
    pub min_key: Row,
    /// Largest key in the file.
    pub max_key: Row,
    /// Columnar statistics over the key fields.
    pub key_stats: Vec<FieldStats>,
    /// Columnar statistics over the value fields.
    pub value_stats: Vec<FieldStats>,
    /// Merge-tree level; 0 holds the newest writes, compaction promotes
    /// outputs to higher levels.
    pub level: u32,
}

impl Encode for SstFileMeta {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.file_name.encode_to(buf)?;
        self.file_size.encode_to(buf)?;
        self.row_count.encode_to(buf)?;
        self.min_key.encode_to(buf)?;
        self.max_key.encode_to(buf)?;
        encoding::encode_seq(&self.key_stats, buf)?;
        encoding::encode_seq(&self.value_stats, buf)?;
        self.level.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for SstFileMeta {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (file_name, n) = String::decode_from(&buf[offset..])?;
        offset += n;
        let (file_size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (row_count, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (min_key, n) = Row::decode_from(&buf[offset..])?;
        offset += n;
        let (max_key, n) = Row::decode_from(&buf[offset..])?;
        offset += n;
        let (key_stats, n) = encoding::decode_seq::<FieldStats>(&buf[offset..])?;
        offset += n;
        let (value_stats, n) = encoding::decode_seq::<FieldStats>(&buf[offset..])?;
        offset += n;
        let (level, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                file_name,
                file_size,
                row_count,
                min_key,
                max_key,
                key_stats,
                value_stats,
                level,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// On-disk format structures
// ------------------------------------------------------------------------------------------------

/// SST file header: magic, version, CRC32 over the zeroed-crc encoding.
#[derive(Debug)]
pub(crate) struct SstHeader {
    pub(crate) magic: [u8; 4],
    pub(crate) version: u32,
    pub(crate) crc: u32,
}

impl Encode for SstHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.magic.encode_to(buf)?;
        self.version.encode_to(buf)?;
        self.crc.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for SstHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (magic, n) = <[u8; 4]>::decode_from(&buf[offset..])?;
        offset += n;
        let (version, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (crc, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                magic,
                version,
                crc,
            },
            offset,
        ))
    }
}

/// Offset and framed size of one block in the file.
#[derive(Debug, Clone)]
pub(crate) struct BlockHandle {
    /// Offset of the block's length prefix.
    pub(crate) offset: u64,
    /// Framed size: length prefix + payload + CRC.
    pub(crate) size: u64,
}

impl Encode for BlockHandle {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.offset.encode_to(buf)?;
        self.size.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BlockHandle {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (off, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { offset: off, size }, offset))
    }
}

/// Index entry: the first key of a data block and where the block lives.
#[derive(Debug)]
pub(crate) struct SstIndexEntry {
    pub(crate) first_key: Row,
    pub(crate) handle: BlockHandle,
}

impl Encode for SstIndexEntry {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.first_key.encode_to(buf)?;
        self.handle.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for SstIndexEntry {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (first_key, n) = Row::decode_from(&buf[offset..])?;
        offset += n;
        let (handle, n) = BlockHandle::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { first_key, handle }, offset))
    }
}

/// Properties block: statistics served without opening data blocks.
#[derive(Debug)]
pub(crate) struct SstProperties {
    pub(crate) row_count: u64,
    pub(crate) min_key: Row,
    pub(crate) max_key: Row,
    pub(crate) key_stats: Vec<FieldStats>,
    pub(crate) value_stats: Vec<FieldStats>,
}

impl Encode for SstProperties {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.row_count.encode_to(buf)?;
        self.min_key.encode_to(buf)?;
        self.max_key.encode_to(buf)?;
        encoding::encode_seq(&self.key_stats, buf)?;
        encoding::encode_seq(&self.value_stats, buf)?;
        Ok(())
    }
}

impl Decode for SstProperties {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (row_count, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (min_key, n) = Row::decode_from(&buf[offset..])?;
        offset += n;
        let (max_key, n) = Row::decode_from(&buf[offset..])?;
        offset += n;
        let (key_stats, n) = encoding::decode_seq::<FieldStats>(&buf[offset..])?;
        offset += n;
        let (value_stats, n) = encoding::decode_seq::<FieldStats>(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                row_count,
                min_key,
                max_key,
                key_stats,
                value_stats,
            },
            offset,
        ))
    }
}

/// Footer, stored at the very end of the file.
#[derive(Debug)]
pub(crate) struct SstFooter {
    pub(crate) properties: BlockHandle,
    pub(crate) index: BlockHandle,
    pub(crate) total_file_size: u64,
    pub(crate) crc: u32,
}

impl Encode for SstFooter {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.properties.encode_to(buf)?;
        self.index.encode_to(buf)?;
        self.total_file_size.encode_to(buf)?;
        self.crc.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for SstFooter {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (properties, n) = BlockHandle::decode_from(&buf[offset..])?;
        offset += n;
        let (index, n) = BlockHandle::decode_from(&buf[offset..])?;
        offset += n;
        let (total_file_size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (crc, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                properties,
                index,
                total_file_size,
                crc,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Sst — verified, memory-mapped handle
// ------------------------------------------------------------------------------------------------

/// A memory-mapped, integrity-verified SST file.
#[derive(Debug)]
pub struct Sst {
    pub(crate) mmap: Mmap,
    pub(crate) properties: SstProperties,
    pub(crate) index: Vec<SstIndexEntry>,
}

impl Sst {
    /// Opens an SST, verifying header, footer, and meta-block checksums
    /// and loading the properties and index blocks.
    ///
    /// Data blocks are **not** read here; their checksums are verified
    /// lazily as [`SstReader`](reader::SstReader) walks them.
    ///
    /// # Safety
    ///
    /// Uses `unsafe { Mmap::map(...) }`; sound because SST files are
    /// write-once, the map is read-only, and every block boundary is
    /// checked before slicing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SstError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SST_HEADER_SIZE + SST_FOOTER_SIZE {
            return Err(SstError::Malformed("file too small".into()));
        }

        // Header: verify CRC over the zeroed-crc encoding, then identity.
        let (header, _) = encoding::decode_from_slice::<SstHeader>(&mmap[..SST_HEADER_SIZE])?;
        let expected = header.crc;
        let zeroed = SstHeader { crc: 0, ..header };
        if crc32(&encoding::encode_to_vec(&zeroed)?) != expected {
            return Err(SstError::ChecksumMismatch);
        }
        if zeroed.magic != SST_MAGIC {
            return Err(SstError::Malformed("header magic mismatch".into()));
        }
        if zeroed.version != SST_VERSION {
            return Err(SstError::Malformed(format!(
                "unsupported format version {}",
                zeroed.version
            )));
        }

        // Footer: same CRC discipline.
        let footer_start = mmap.len() - SST_FOOTER_SIZE;
        let (footer, _) = encoding::decode_from_slice::<SstFooter>(&mmap[footer_start..])?;
        let expected = footer.crc;
        let zeroed = SstFooter { crc: 0, ..footer };
        if crc32(&encoding::encode_to_vec(&zeroed)?) != expected {
            return Err(SstError::ChecksumMismatch);
        }
        if zeroed.total_file_size != mmap.len() as u64 {
            return Err(SstError::Malformed(format!(
                "footer claims {} bytes, file has {}",
                zeroed.total_file_size,
                mmap.len()
            )));
        }

        let properties_bytes = read_block_bytes(&mmap, &zeroed.properties)?;
        let (properties, _) = encoding::decode_from_slice::<SstProperties>(&properties_bytes)?;

        let index_bytes = read_block_bytes(&mmap, &zeroed.index)?;
        let (index, _) = encoding::decode_seq::<SstIndexEntry>(&index_bytes)?;

        Ok(Self {
            mmap,
            properties,
            index,
        })
    }

    /// Number of records in this file.
    pub fn row_count(&self) -> u64 {
        self.properties.row_count
    }

    /// Smallest key in this file.
    pub fn min_key(&self) -> &Row {
        &self.properties.min_key
    }

    /// Largest key in this file.
    pub fn max_key(&self) -> &Row {
        &self.properties.max_key
    }

    /// Number of data blocks.
    pub fn block_count(&self) -> usize {
        self.index.len()
    }
}

// ------------------------------------------------------------------------------------------------
// Block I/O
// ------------------------------------------------------------------------------------------------

/// Reads and checksum-verifies the block referenced by `handle`, returning
/// its payload bytes.
pub(crate) fn read_block_bytes(mmap: &Mmap, handle: &BlockHandle) -> Result<Vec<u8>, SstError> {
    let start = usize::try_from(handle.offset)
        .map_err(|_| SstError::Malformed("block offset exceeds addressable range".into()))?;
    let size = usize::try_from(handle.size)
        .map_err(|_| SstError::Malformed("block size exceeds addressable range".into()))?;

    if size < BLOCK_LEN_SIZE + BLOCK_CRC_SIZE || start.checked_add(size).is_none_or(|end| end > mmap.len())
    {
        return Err(SstError::Malformed("block out of range".into()));
    }

    let frame = &mmap[start..start + size];
    let (len_bytes, rest) = frame
        .split_first_chunk::<BLOCK_LEN_SIZE>()
        .ok_or_else(|| SstError::Malformed("short block frame".into()))?;
    let payload_len = u32::from_le_bytes(*len_bytes) as usize;

    if rest.len() != payload_len + BLOCK_CRC_SIZE {
        return Err(SstError::Malformed("block frame length mismatch".into()));
    }
    let (payload, crc_bytes) = rest.split_at(payload_len);
    let stored: [u8; BLOCK_CRC_SIZE] = crc_bytes
        .try_into()
        .map_err(|_| SstError::Malformed("short block checksum".into()))?;

    if crc32(payload) != u32::from_le_bytes(stored) {
        return Err(SstError::ChecksumMismatch);
    }

    Ok(payload.to_vec())
}

/// CRC32 of a byte slice.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(data);
    hasher.finalize()
}
