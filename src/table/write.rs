//! Table writer — buffers keyed updates and flushes sorted level-0 SSTs.
//!
//! A [`TableWriter`] serves one `(partition, bucket)`.  Updates land in a
//! sorted buffer that deduplicates by key (newest write wins within the
//! batch); when the buffer passes its entry limit it flushes to a fresh
//! level-0 SST.  `finish()` flushes the remainder and hands back the
//! [`CommitIncrement`] the commit layer turns into manifest entries.
//!
//! The writer never talks to the commit layer itself — emitting file
//! metadata is its entire contract.

use std::collections::BTreeMap;

use tracing::debug;

use crate::commit::CommitIncrement;
use crate::path::SstPathFactory;
use crate::row::{KeyValue, Row, RowType};
use crate::sstable::{SstFileMeta, SstWriter};

use super::TableError;

/// Buffering writer for one `(partition, bucket)`.
#[derive(Debug)]
pub struct TableWriter {
    key_type: RowType,
    value_type: RowType,
    partition: Row,
    bucket: u32,
    sst_factory: SstPathFactory,
    /// Sorted write buffer; the map key is the record key, so a later
    /// write to the same key replaces the earlier one.
    buffer: BTreeMap<Row, KeyValue>,
    buffer_limit: usize,
    flushed: Vec<SstFileMeta>,
}

impl TableWriter {
    pub(super) fn new(
        key_type: RowType,
        value_type: RowType,
        partition: Row,
        bucket: u32,
        sst_factory: SstPathFactory,
        buffer_limit: usize,
    ) -> Self {
        Self {
            key_type,
            value_type,
            partition,
            bucket,
            sst_factory,
            buffer: BTreeMap::new(),
            buffer_limit: buffer_limit.max(1),
            flushed: Vec::new(),
        }
    }

    /// Buffers an upsert.
    pub fn put(&mut self, key: Row, value: Row) -> Result<(), TableError> {
        self.write(KeyValue::add(key, value))
    }

    /// Buffers a row-level tombstone.  The value row carries the
    /// tombstone's payload slot and must still match the value schema.
    pub fn delete(&mut self, key: Row, value: Row) -> Result<(), TableError> {
        self.write(KeyValue::delete(key, value))
    }

    fn write(&mut self, record: KeyValue) -> Result<(), TableError> {
        if !self.key_type.matches(&record.key) {
            return Err(TableError::Schema(format!(
                "key row {:?} does not match the key schema",
                record.key
            )));
        }
        if !self.value_type.matches(&record.value) {
            return Err(TableError::Schema(format!(
                "value row {:?} does not match the value schema",
                record.value
            )));
        }

        self.buffer.insert(record.key.clone(), record);
        if self.buffer.len() >= self.buffer_limit {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes the buffer to a new level-0 SST.  A no-op on an empty
    /// buffer.
    pub fn flush(&mut self) -> Result<(), TableError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let buffer = std::mem::take(&mut self.buffer);
        let (_, path) = self.sst_factory.new_sst();
        let meta = SstWriter::new(&path, 0).build(buffer.into_values())?;
        debug!(
            bucket = self.bucket,
            file = %meta.file_name,
            rows = meta.row_count,
            "write buffer flushed"
        );
        self.flushed.push(meta);
        Ok(())
    }

    /// Flushes the remainder and returns the files produced, batched as a
    /// [`CommitIncrement`] for the commit layer.
    pub fn finish(mut self) -> Result<CommitIncrement, TableError> {
        self.flush()?;
        Ok(CommitIncrement::append(
            self.partition,
            self.bucket,
            self.flushed,
        ))
    }
}
