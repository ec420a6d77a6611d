//! Table facade — ties schema, paths, commit, plan, and read together.
//!
//! A [`Table`] owns one on-disk table: its schemas, path factory, shared
//! I/O pool, and committer.  The full write/read cycle:
//!
//! ```rust,no_run
//! use tabuladb::mergetree::MergeEngine;
//! use tabuladb::row::{Datum, DatumKind, Row, RowField, RowType};
//! use tabuladb::scan::ScanRequest;
//! use tabuladb::table::{Table, TableConfig};
//!
//! let config = TableConfig {
//!     key_type: RowType::new(vec![RowField::new("k", DatumKind::Int)]),
//!     value_type: RowType::new(vec![RowField::new("v", DatumKind::Int)]),
//!     partition_type: RowType::empty(),
//!     merge_engine: MergeEngine::Deduplicate,
//!     manifest_target_size: 8 * 1024 * 1024,
//!     write_buffer_entries: 65536,
//!     io_threads: 4,
//! };
//! let table = Table::open("/tmp/my_table", config).unwrap();
//!
//! // Write
//! let mut write = table.new_write(Row::empty(), 0).unwrap();
//! write.put(Row::new(vec![Datum::Int(1)]), Row::new(vec![Datum::Int(10)])).unwrap();
//! let increment = write.finish().unwrap();
//!
//! // Commit
//! let snapshot = table.commit(&[increment], "writer-1", "batch-1").unwrap();
//!
//! // Plan + read
//! let plan = table
//!     .plan(&ScanRequest { snapshot_id: Some(snapshot.id), ..Default::default() })
//!     .unwrap();
//! for record in table.read_bucket(&plan, &Row::empty(), 0).unwrap() {
//!     let record = record.unwrap();
//!     println!("{:?} -> {:?}", record.key, record.value);
//! }
//! ```
//!
//! The facade stays thin: planning is [`crate::scan`], merging is
//! [`crate::mergetree`], publication is [`crate::commit`].  What lives
//! here is the glue the pieces share — schema validation, opening the
//! right files for a bucket, and the one manually-driven compaction
//! rewrite the commit protocol needs for COMPACT snapshots.

pub mod write;

#[cfg(test)]
mod tests;

pub use write::TableWriter;

use std::fs;
use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::commit::{CommitError, CommitIncrement, Committer};
use crate::mergetree::{MergeEngine, MergeError, MergeReader, MergeSource};
use crate::path::PathFactory;
use crate::pool::IoPool;
use crate::row::{Row, RowType};
use crate::scan::{Plan, ScanError, ScanPlanner, ScanRequest};
use crate::snapshot::{Snapshot, SnapshotError, latest_snapshot_id};
use crate::sstable::{SstError, SstReader, SstWriter};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by the table facade.
#[derive(Debug, Error)]
pub enum TableError {
    /// A row did not match its declared schema.
    #[error("schema mismatch: {0}")]
    Schema(String),

    /// Error from scan planning.
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// Error from the merge read path.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// Error from SST building or reading.
    #[error("SST error: {0}")]
    Sst(#[from] SstError),

    /// Error from commit publication.
    #[error("commit error: {0}")]
    Commit(#[from] CommitError),

    /// Error from snapshot access.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`Table`] instance.
pub struct TableConfig {
    /// Schema of key rows.
    pub key_type: RowType,
    /// Schema of value rows.
    pub value_type: RowType,
    /// Schema of partition rows; [`RowType::empty`] for unpartitioned
    /// tables.
    pub partition_type: RowType,
    /// Accumulator used by merged reads.
    pub merge_engine: MergeEngine,
    /// Size threshold (bytes) at which manifest files roll.
    pub manifest_target_size: usize,
    /// Records a writer buffers per bucket before flushing an SST.
    pub write_buffer_entries: usize,
    /// Worker threads in the shared I/O pool.
    pub io_threads: usize,
}

// ------------------------------------------------------------------------------------------------
// Table
// ------------------------------------------------------------------------------------------------

/// Handle on one on-disk table.
pub struct Table {
    config: TableConfig,
    factory: PathFactory,
    pool: Arc<IoPool>,
    committer: Committer,
}

impl Table {
    /// Opens (or creates) a table rooted at `root`.
    pub fn open(root: impl AsRef<std::path::Path>, config: TableConfig) -> Result<Self, TableError> {
        let factory = PathFactory::new(root, config.partition_type.clone());
        fs::create_dir_all(factory.root())?;

        let pool = Arc::new(IoPool::new(config.io_threads));
        let committer = Committer::new(factory.clone(), config.manifest_target_size);
        Ok(Self {
            config,
            factory,
            pool,
            committer,
        })
    }

    /// The table's path factory.
    pub fn path_factory(&self) -> &PathFactory {
        &self.factory
    }

    /// Reads the latest published snapshot, or `None` on a fresh table.
    pub fn latest_snapshot(&self) -> Result<Option<Snapshot>, TableError> {
        match latest_snapshot_id(&self.factory.snapshot_dir())? {
            Some(id) => Ok(Some(Snapshot::read(&self.factory.snapshot_path(id), id)?)),
            None => Ok(None),
        }
    }

    /// Creates a writer for one `(partition, bucket)`.
    pub fn new_write(&self, partition: Row, bucket: u32) -> Result<TableWriter, TableError> {
        if !self.config.partition_type.matches(&partition) {
            return Err(TableError::Schema(format!(
                "partition row {partition:?} does not match the partition schema"
            )));
        }
        let sst_factory = self.factory.sst_factory(&partition, bucket);
        fs::create_dir_all(sst_factory.dir())?;
        Ok(TableWriter::new(
            self.config.key_type.clone(),
            self.config.value_type.clone(),
            partition,
            bucket,
            sst_factory,
            self.config.write_buffer_entries,
        ))
    }

    /// Publishes the given increments as one commit.
    pub fn commit(
        &self,
        increments: &[CommitIncrement],
        user: &str,
        identifier: &str,
    ) -> Result<Snapshot, TableError> {
        Ok(self.committer.commit(increments, user, identifier)?)
    }

    /// A planner over this table's metadata and shared pool.
    pub fn planner(&self) -> ScanPlanner {
        ScanPlanner::new(self.factory.clone(), Arc::clone(&self.pool))
    }

    /// Plans a read.
    pub fn plan(&self, request: &ScanRequest) -> Result<Plan, TableError> {
        Ok(self.planner().plan(request)?)
    }

    /// Opens a merged read over one `(partition, bucket)` of a plan.
    ///
    /// Files keep their plan order as recency: the plan lists survivors in
    /// commit order, so later files are newer.
    pub fn read_bucket(
        &self,
        plan: &Plan,
        partition: &Row,
        bucket: u32,
    ) -> Result<MergeReader, TableError> {
        let sst_factory = self.factory.sst_factory(partition, bucket);
        let mut sources = Vec::new();
        for (sequence, entry) in plan
            .files
            .iter()
            .enumerate()
            .filter(|(_, e)| &e.partition == partition && e.bucket == bucket)
        {
            let reader = SstReader::open(sst_factory.sst_path(&entry.file.file_name))?;
            sources.push(MergeSource::new(
                Box::new(reader),
                entry.file.level,
                sequence as u64,
            ));
        }
        Ok(MergeReader::new(sources, self.config.merge_engine))
    }

    /// Rewrites one `(partition, bucket)` of a plan into a single SST one
    /// level above its deepest input, returning the compaction increment
    /// for [`Table::commit`].
    ///
    /// The rewrite merges with tombstone suppression: since every live
    /// file of the bucket is consumed, spent tombstones can be dropped.
    pub fn compact_bucket(
        &self,
        plan: &Plan,
        partition: &Row,
        bucket: u32,
    ) -> Result<CommitIncrement, TableError> {
        let before: Vec<_> = plan
            .files
            .iter()
            .filter(|e| &e.partition == partition && e.bucket == bucket)
            .map(|e| e.file.clone())
            .collect();
        if before.is_empty() {
            return Ok(CommitIncrement::compaction(
                partition.clone(),
                bucket,
                Vec::new(),
                Vec::new(),
            ));
        }

        let output_level = before.iter().map(|f| f.level).max().unwrap_or(0) + 1;

        // Materialize the merged view; a compaction rewrite is bounded by
        // the bucket it consumes.
        let mut records = Vec::new();
        for record in self.read_bucket(plan, partition, bucket)? {
            records.push(record?);
        }

        let after = if records.is_empty() {
            Vec::new()
        } else {
            let sst_factory = self.factory.sst_factory(partition, bucket);
            let (_, path) = sst_factory.new_sst();
            vec![SstWriter::new(&path, output_level).build(records.into_iter())?]
        };

        info!(
            bucket,
            inputs = before.len(),
            output_level,
            "bucket compacted"
        );
        Ok(CommitIncrement::compaction(
            partition.clone(),
            bucket,
            before,
            after,
        ))
    }
}
