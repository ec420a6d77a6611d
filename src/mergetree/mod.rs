//! Merge-tree reader — k-way merge with per-key accumulation.
//!
//! The reader consumes the sorted SSTs of one `(partition, bucket)` at a
//! planned snapshot and produces a single key-ordered stream.  Records
//! sharing a key are combined by an **accumulator**, which sees them
//! strictly newest-to-oldest:
//!
//! - primary order: the table's key order, ascending;
//! - among equal keys: merge-tree level ascending (lower level = newer
//!   data), ties broken by file recency, newest first.
//!
//! # Accumulators
//!
//! | Engine | Behaviour |
//! |--------|-----------|
//! | [`MergeEngine::Deduplicate`] | Newest record wins; a tombstone suppresses the key. |
//! | [`MergeEngine::Sum`] | Integer value fields fold additively, newest-to-oldest; a tombstone seals the fold. |
//!
//! # Projections
//!
//! The default **merged view** drops keys whose accumulated result is a
//! tombstone.  The **changelog view** ([`MergeReader::into_changelog`])
//! emits them with their `Delete` kind intact.
//!
//! # Failure and cancellation
//!
//! Batches are pulled one at a time per file; the cancellation token is
//! checked at every batch boundary.  Any underlying read error (or
//! cancellation) terminates the stream — output already yielded is valid
//! partial progress, and nothing follows the error.

#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use thiserror::Error;
use tracing::trace;

use crate::pool::CancellationToken;
use crate::row::{Datum, KeyValue, Row, RowKind};
use crate::sstable::{RecordBatch, RecordReader, SstError};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors terminating a merge read.
#[derive(Debug, Error)]
pub enum MergeError {
    /// An underlying file read failed.
    #[error("SST error: {0}")]
    Sst(#[from] SstError),

    /// Cooperative cancellation was observed at a batch boundary.
    #[error("merge cancelled")]
    Cancelled,
}

// ------------------------------------------------------------------------------------------------
// Merge sources
// ------------------------------------------------------------------------------------------------

/// One sorted input of the merge: a record reader plus the ordering
/// metadata of the file behind it.
pub struct MergeSource {
    /// Batch reader over the file's records.
    pub reader: Box<dyn RecordReader>,
    /// Merge-tree level of the file; lower levels hold newer data.
    pub level: u32,
    /// Commit recency of the file among the merged set; larger is newer.
    /// The scan plan lists files in commit order, so a file's plan index
    /// serves directly.
    pub sequence: u64,
}

impl MergeSource {
    /// Creates a merge source.
    pub fn new(reader: Box<dyn RecordReader>, level: u32, sequence: u64) -> Self {
        Self {
            reader,
            level,
            sequence,
        }
    }
}

/// Stream state of one source: the reader plus its open batch.
struct Stream {
    reader: Box<dyn RecordReader>,
    batch: Option<RecordBatch>,
    level: u32,
    sequence: u64,
}

impl Stream {
    /// Pulls the next record, crossing batch boundaries as needed.
    ///
    /// The cancellation token is observed before each new batch is
    /// requested; an in-flight batch is always drained.
    fn next(&mut self, token: &CancellationToken) -> Result<Option<KeyValue>, MergeError> {
        loop {
            if let Some(batch) = &mut self.batch {
                if let Some(record) = batch.next() {
                    return Ok(Some(record));
                }
                self.batch = None;
            }
            if token.is_cancelled() {
                return Err(MergeError::Cancelled);
            }
            match self.reader.next_batch()? {
                Some(batch) => self.batch = Some(batch),
                None => return Ok(None),
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Heap ordering
// ------------------------------------------------------------------------------------------------

struct HeapEntry {
    record: KeyValue,
    level: u32,
    sequence: u64,
    stream: usize,
}

impl HeapEntry {
    /// `(key ASC, level ASC, sequence DESC)` — the pop order that hands
    /// the accumulator equal keys newest-first.
    fn merge_cmp(&self, other: &Self) -> Ordering {
        self.record
            .key
            .cmp(&other.record.key)
            .then_with(|| self.level.cmp(&other.level))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse so the smallest key pops first.
        self.merge_cmp(other).reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.merge_cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

// ------------------------------------------------------------------------------------------------
// Accumulator
// ------------------------------------------------------------------------------------------------

/// How records sharing a key combine into at most one output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeEngine {
    /// Keep the newest record per key.
    Deduplicate,
    /// Fold integer value fields additively across versions.
    Sum,
}

/// Per-key combine state.  Protocol per key:
///
/// `reset(key, first)` with the newest record, `add(older)` for each
/// further record in newest-to-oldest order, `take_result()` once the key
/// changes or input ends.
struct Accumulator {
    engine: MergeEngine,
    key: Option<Row>,
    value: Row,
    kind: RowKind,
    /// Once set, older records no longer contribute.
    sealed: bool,
}

impl Accumulator {
    fn new(engine: MergeEngine) -> Self {
        Self {
            engine,
            key: None,
            value: Row::empty(),
            kind: RowKind::Add,
            sealed: false,
        }
    }

    /// Starts accumulation of a new key with its newest record.
    fn reset(&mut self, record: KeyValue) {
        self.sealed = match self.engine {
            MergeEngine::Deduplicate => true,
            MergeEngine::Sum => record.kind == RowKind::Delete,
        };
        self.key = Some(record.key);
        self.value = record.value;
        self.kind = record.kind;
    }

    /// Folds in the next-older record for the current key.
    fn add(&mut self, record: KeyValue) {
        if self.sealed {
            return;
        }
        if record.kind == RowKind::Delete {
            self.sealed = true;
            return;
        }
        self.value = sum_rows(&self.value, &record.value);
    }

    /// Finishes the current key, returning its single output record.
    fn take_result(&mut self) -> Option<KeyValue> {
        let key = self.key.take()?;
        Some(KeyValue {
            key,
            value: std::mem::take(&mut self.value),
            kind: self.kind,
        })
    }

    fn current_key(&self) -> Option<&Row> {
        self.key.as_ref()
    }
}

/// Field-wise additive fold: integer fields sum (wrapping), other fields
/// keep the newer side.
fn sum_rows(newer: &Row, older: &Row) -> Row {
    let fields = newer
        .fields()
        .zip(older.fields())
        .map(|(a, b)| match (a, b) {
            (Datum::Int(x), Datum::Int(y)) => Datum::Int(x.wrapping_add(*y)),
            (newer, _) => newer.clone(),
        })
        .collect();
    Row::new(fields)
}

// ------------------------------------------------------------------------------------------------
// MergeReader
// ------------------------------------------------------------------------------------------------

/// K-way merging reader over the SSTs of one `(partition, bucket)`.
///
/// Iterates `Result<KeyValue, MergeError>`; output keys are strictly
/// ascending.  The stream ends at the first error.
pub struct MergeReader {
    streams: Vec<Stream>,
    heap: BinaryHeap<HeapEntry>,
    accumulator: Accumulator,
    emit_tombstones: bool,
    token: CancellationToken,
    /// Set on EOF or error; the iterator is fused afterwards.
    done: bool,
    primed: bool,
}

impl MergeReader {
    /// Creates a merge reader over the given sources.
    pub fn new(sources: Vec<MergeSource>, engine: MergeEngine) -> Self {
        let streams = sources
            .into_iter()
            .map(|source| Stream {
                reader: source.reader,
                batch: None,
                level: source.level,
                sequence: source.sequence,
            })
            .collect();
        Self {
            streams,
            heap: BinaryHeap::new(),
            accumulator: Accumulator::new(engine),
            emit_tombstones: false,
            token: CancellationToken::new(),
            done: false,
            primed: false,
        }
    }

    /// Switches to the changelog projection: accumulated tombstones are
    /// emitted with their `Delete` kind instead of being dropped.
    pub fn into_changelog(mut self) -> Self {
        self.emit_tombstones = true;
        self
    }

    /// Replaces the cancellation token observed between batches.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Seeds the heap with the first record of every stream.
    fn prime(&mut self) -> Result<(), MergeError> {
        for idx in 0..self.streams.len() {
            self.advance(idx)?;
        }
        trace!(streams = self.streams.len(), "merge reader primed");
        Ok(())
    }

    /// Pushes the next record of stream `idx` onto the heap, if any.
    fn advance(&mut self, idx: usize) -> Result<(), MergeError> {
        let token = self.token.clone();
        let stream = &mut self.streams[idx];
        if let Some(record) = stream.next(&token)? {
            self.heap.push(HeapEntry {
                record,
                level: stream.level,
                sequence: stream.sequence,
                stream: idx,
            });
        }
        Ok(())
    }

    /// Core pull loop; see the iterator impl for the error wrapping.
    fn pull(&mut self) -> Result<Option<KeyValue>, MergeError> {
        if !self.primed {
            self.primed = true;
            self.prime()?;
        }

        loop {
            let Some(entry) = self.heap.pop() else {
                // Input exhausted — flush the key in flight.
                self.done = true;
                match self.accumulator.take_result() {
                    Some(result) if self.emit_result(&result) => return Ok(Some(result)),
                    _ => return Ok(None),
                }
            };
            self.advance(entry.stream)?;

            if self.accumulator.current_key() == Some(&entry.record.key) {
                self.accumulator.add(entry.record);
                continue;
            }

            // Key changed: emit the finished key, start the new one.
            let finished = self.accumulator.take_result();
            self.accumulator.reset(entry.record);
            if let Some(result) = finished
                && self.emit_result(&result)
            {
                return Ok(Some(result));
            }
        }
    }

    fn emit_result(&self, result: &KeyValue) -> bool {
        self.emit_tombstones || result.kind != RowKind::Delete
    }
}

impl Iterator for MergeReader {
    type Item = Result<KeyValue, MergeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.pull() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
