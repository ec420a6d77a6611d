//! SST writer — builds a complete SST file from a sorted record stream.
//!
//! [`SstWriter`] consumes an iterator of [`KeyValue`] records that **must**
//! be sorted by key with at most one record per key (the write path sorts
//! and deduplicates its buffer before flushing).  It writes header, data
//! blocks, properties, index, and footer, then atomically renames the file
//! into place and returns the derived [`SstFileMeta`].
//!
//! # Atomicity
//!
//! 1. Write everything to `<path>.tmp`.
//! 2. Flush and fsync.
//! 3. Rename `<path>.tmp` → `<path>`.
//!
//! A crash cannot leave a partially-written SST at the final path.

use std::{
    fs::{OpenOptions, rename},
    io::{BufWriter, Seek, Write},
    mem,
    path::Path,
};

use tracing::debug;

use crate::encoding::{self, Encode};
use crate::row::{KeyValue, Row};
use crate::stats::StatsCollector;

use super::{
    BlockHandle, SST_BLOCK_TARGET_SIZE, SST_FOOTER_SIZE, SST_MAGIC, SST_VERSION, SstError,
    SstFileMeta, SstFooter, SstHeader, SstIndexEntry, SstProperties, crc32,
};

// ------------------------------------------------------------------------------------------------
// Block I/O helpers
// ------------------------------------------------------------------------------------------------

/// Writes a checksummed block frame: `[len_le (4 B)][payload][crc32_le (4 B)]`.
///
/// Returns the handle of the written frame.
fn write_checksummed_block(
    writer: &mut (impl Write + Seek),
    payload: &[u8],
) -> Result<BlockHandle, SstError> {
    let offset = writer.stream_position()?;
    let len = payload.len() as u32;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.write_all(&crc32(payload).to_le_bytes())?;

    Ok(BlockHandle {
        offset,
        size: (4 + payload.len() + 4) as u64,
    })
}

/// Writes the header with its CRC computed over the zeroed-crc encoding.
fn write_header(writer: &mut impl Write) -> Result<(), SstError> {
    let mut header = SstHeader {
        magic: SST_MAGIC,
        version: SST_VERSION,
        crc: 0,
    };
    header.crc = crc32(&encoding::encode_to_vec(&header)?);
    writer.write_all(&encoding::encode_to_vec(&header)?)?;
    Ok(())
}

/// Writes the footer with its CRC computed over the zeroed-crc encoding.
/// The footer is fixed-size, so `total_file_size` can account for it
/// before it is written.
fn write_footer(
    writer: &mut (impl Write + Seek),
    properties: BlockHandle,
    index: BlockHandle,
) -> Result<u64, SstError> {
    let total_file_size = writer.stream_position()? + SST_FOOTER_SIZE as u64;
    let mut footer = SstFooter {
        properties,
        index,
        total_file_size,
        crc: 0,
    };
    footer.crc = crc32(&encoding::encode_to_vec(&footer)?);
    writer.write_all(&encoding::encode_to_vec(&footer)?)?;
    Ok(total_file_size)
}

// ------------------------------------------------------------------------------------------------
// SstWriter
// ------------------------------------------------------------------------------------------------

/// Builds one SST file and derives its [`SstFileMeta`].
pub struct SstWriter<'a> {
    path: &'a Path,
    level: u32,
}

impl<'a> SstWriter<'a> {
    /// Creates a writer targeting `path`, tagging the output with the
    /// given merge-tree `level`.
    pub fn new(path: &'a Path, level: u32) -> Self {
        Self { path, level }
    }

    /// Consumes a sorted record iterator and writes a complete SST.
    ///
    /// # Errors
    ///
    /// - [`SstError::Malformed`] when the iterator is empty (an SST with
    ///   no records has no key bounds) or the path has no usable name.
    /// - I/O and encoding errors from writing.
    pub fn build(self, entries: impl Iterator<Item = KeyValue>) -> Result<SstFileMeta, SstError> {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SstError::Malformed("SST path has no file name".into()))?
            .to_string();

        let tmp_path = self.path.with_extension("tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);

        write_header(&mut writer)?;

        // Data blocks, accumulating statistics as records stream through.
        let mut key_stats = StatsCollector::new();
        let mut value_stats = StatsCollector::new();
        let mut min_key: Option<Row> = None;
        let mut max_key: Option<Row> = None;

        let mut index = Vec::new();
        let mut block = Vec::<u8>::new();
        let mut block_first_key: Option<Row> = None;

        for entry in entries {
            key_stats.collect(&entry.key);
            value_stats.collect(&entry.value);
            if min_key.is_none() {
                min_key = Some(entry.key.clone());
            }
            max_key = Some(entry.key.clone());

            if block_first_key.is_none() {
                block_first_key = Some(entry.key.clone());
            }
            entry.encode_to(&mut block)?;

            if block.len() >= SST_BLOCK_TARGET_SIZE {
                flush_data_block(&mut writer, &mut block, &mut block_first_key, &mut index)?;
            }
        }
        if !block.is_empty() {
            flush_data_block(&mut writer, &mut block, &mut block_first_key, &mut index)?;
        }

        let (Some(min_key), Some(max_key)) = (min_key, max_key) else {
            return Err(SstError::Malformed(
                "cannot build an SST from an empty record stream".into(),
            ));
        };
        let row_count = key_stats.row_count();

        // Properties block.
        let properties = SstProperties {
            row_count,
            min_key: min_key.clone(),
            max_key: max_key.clone(),
            key_stats: key_stats.finish(),
            value_stats: value_stats.finish(),
        };
        let properties_handle =
            write_checksummed_block(&mut writer, &encoding::encode_to_vec(&properties)?)?;

        // Index block.
        let mut index_bytes = Vec::new();
        encoding::encode_seq(&index, &mut index_bytes)?;
        let index_handle = write_checksummed_block(&mut writer, &index_bytes)?;

        // Footer, fsync, atomic rename.
        let file_size = write_footer(&mut writer, properties_handle, index_handle)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        rename(&tmp_path, self.path)?;

        debug!(
            file = %file_name,
            rows = row_count,
            blocks = index.len(),
            level = self.level,
            "SST written"
        );

        Ok(SstFileMeta {
            file_name,
            file_size,
            row_count,
            min_key,
            max_key,
            key_stats: properties.key_stats,
            value_stats: properties.value_stats,
            level: self.level,
        })
    }
}

/// Flushes the buffered cell bytes as one data block and records its
/// index entry.
fn flush_data_block(
    writer: &mut (impl Write + Seek),
    block: &mut Vec<u8>,
    block_first_key: &mut Option<Row>,
    index: &mut Vec<SstIndexEntry>,
) -> Result<(), SstError> {
    let payload = mem::take(block);
    let handle = write_checksummed_block(writer, &payload)?;
    let first_key = block_first_key
        .take()
        .ok_or_else(|| SstError::Malformed("data block without a first key".into()))?;
    index.push(SstIndexEntry { first_key, handle });
    Ok(())
}
