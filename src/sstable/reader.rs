//! SST reading — the record-reader contract and its SST-backed
//! implementation.
//!
//! The merge-tree reader consumes *any* source of sorted record batches
//! through the [`RecordReader`] trait, so the SST container format stays
//! swappable.  [`SstReader`] is the crate's own implementation: it walks
//! an [`Sst`](super::Sst)'s data blocks in file order, decoding one block
//! per batch.
//!
//! Batches are the unit of resource ownership: each call to
//! [`RecordReader::next_batch`] hands out an owned, fully-decoded
//! [`RecordBatch`], and dropping the batch releases it.  Readers never
//! hold more than the block being decoded.
//!
//! Unlike metadata blocks (verified at open time), data-block checksums
//! are verified here, lazily, as blocks are visited.  Any corruption —
//! checksum mismatch or a truncated cell — is a hard error, not a silent
//! end of stream.

use crate::encoding;
use crate::row::KeyValue;

use super::{Sst, SstError, read_block_bytes};

// ------------------------------------------------------------------------------------------------
// RecordReader contract
// ------------------------------------------------------------------------------------------------

/// A source of sorted record batches.
///
/// # Contract
///
/// - Batches concatenate to a stream in ascending key order.
/// - `next_batch` returns `Ok(None)` exactly once, at end of stream.
/// - After an error the reader is exhausted; callers must not retry.
pub trait RecordReader {
    /// Returns the next batch, or `None` at end of stream.
    fn next_batch(&mut self) -> Result<Option<RecordBatch>, SstError>;
}

/// One decoded batch of records, yielded in stored (ascending-key) order.
#[derive(Debug)]
pub struct RecordBatch {
    entries: std::vec::IntoIter<KeyValue>,
}

impl RecordBatch {
    /// Wraps already-decoded records.
    pub fn new(entries: Vec<KeyValue>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }

    /// Records remaining in the batch.
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

impl Iterator for RecordBatch {
    type Item = KeyValue;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

// ------------------------------------------------------------------------------------------------
// SstReader
// ------------------------------------------------------------------------------------------------

/// Streams the records of one SST, one data block per batch.
pub struct SstReader {
    sst: Sst,
    next_block: usize,
}

impl SstReader {
    /// Opens the SST at `path` and positions the reader before the first
    /// block.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, SstError> {
        Ok(Self::new(Sst::open(path)?))
    }

    /// Wraps an already-opened SST.
    pub fn new(sst: Sst) -> Self {
        Self { sst, next_block: 0 }
    }

    /// The underlying SST handle.
    pub fn sst(&self) -> &Sst {
        &self.sst
    }
}

impl RecordReader for SstReader {
    fn next_batch(&mut self) -> Result<Option<RecordBatch>, SstError> {
        let Some(entry) = self.sst.index.get(self.next_block) else {
            return Ok(None);
        };
        self.next_block += 1;

        let payload = read_block_bytes(&self.sst.mmap, &entry.handle)?;
        let entries = decode_block_cells(&payload)?;
        Ok(Some(RecordBatch::new(entries)))
    }
}

/// Decodes the concatenated cells of one data-block payload.
///
/// A cell cut off mid-encoding surfaces as a decode error, so a truncated
/// block can never silently pass for a shorter one.
fn decode_block_cells(payload: &[u8]) -> Result<Vec<KeyValue>, SstError> {
    let mut entries = Vec::new();
    let mut cursor = 0;
    while cursor < payload.len() {
        let (entry, consumed) = encoding::decode_from_slice::<KeyValue>(&payload[cursor..])?;
        cursor += consumed;
        entries.push(entry);
    }
    Ok(entries)
}
