use std::collections::VecDeque;

use crate::mergetree::{MergeEngine, MergeReader, MergeSource};
use crate::row::{Datum, KeyValue, Row};
use crate::sstable::{RecordBatch, RecordReader, SstError};

/// In-memory record reader serving pre-built batches.
pub struct BufferReader {
    batches: VecDeque<Vec<KeyValue>>,
}

impl BufferReader {
    /// One batch per inner vector.
    pub fn new(batches: Vec<Vec<KeyValue>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }

    /// All records in a single batch.
    pub fn single(records: Vec<KeyValue>) -> Self {
        Self::new(vec![records])
    }
}

impl RecordReader for BufferReader {
    fn next_batch(&mut self) -> Result<Option<RecordBatch>, SstError> {
        Ok(self.batches.pop_front().map(RecordBatch::new))
    }
}

/// Record reader that yields its batches, then fails.
pub struct FailingReader {
    inner: BufferReader,
    failed: bool,
}

impl FailingReader {
    pub fn new(batches: Vec<Vec<KeyValue>>) -> Self {
        Self {
            inner: BufferReader::new(batches),
            failed: false,
        }
    }
}

impl RecordReader for FailingReader {
    fn next_batch(&mut self) -> Result<Option<RecordBatch>, SstError> {
        match self.inner.next_batch()? {
            Some(batch) => Ok(Some(batch)),
            None if !self.failed => {
                self.failed = true;
                Err(SstError::ChecksumMismatch)
            }
            None => Ok(None),
        }
    }
}

pub fn kv(k: i64, v: i64) -> KeyValue {
    KeyValue::add(
        Row::new(vec![Datum::Int(k)]),
        Row::new(vec![Datum::Int(v)]),
    )
}

pub fn tombstone(k: i64) -> KeyValue {
    KeyValue::delete(Row::new(vec![Datum::Int(k)]), Row::new(vec![Datum::Int(0)]))
}

/// Builds a merge reader over in-memory files given `(level, sequence,
/// records)` triples.
pub fn reader_over(
    files: Vec<(u32, u64, Vec<KeyValue>)>,
    engine: MergeEngine,
) -> MergeReader {
    let sources = files
        .into_iter()
        .map(|(level, sequence, records)| {
            MergeSource::new(Box::new(BufferReader::single(records)), level, sequence)
        })
        .collect();
    MergeReader::new(sources, engine)
}

/// Collects a merge read that must succeed, as `(key, value)` integer
/// pairs.
pub fn collect_ints(reader: MergeReader) -> Vec<(i64, i64)> {
    reader
        .map(|item| {
            let record = item.expect("merge read failed");
            (
                record.key.field(0).unwrap().as_int().unwrap(),
                record.value.field(0).unwrap().as_int().unwrap(),
            )
        })
        .collect()
}
