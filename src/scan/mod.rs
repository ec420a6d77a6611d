//! Scan planner — resolves a snapshot and filters to the live file set.
//!
//! Planning replays the table's metadata: snapshot → manifest list →
//! manifests → ADD/DELETE fold.  The result is a [`Plan`], a value object
//! capturing the snapshot id and the flat list of live [`ManifestEntry`]s
//! a reader should open.
//!
//! # Protocol
//!
//! 1. **Resolve the snapshot.**  A request names a snapshot id, or injects
//!    a manifest-list file directly (post-commit preview).  With neither,
//!    the plan is empty.
//! 2. **Manifest-level pruning.**  A manifest whose partition statistics
//!    cannot contain a row matching the partition filter is never opened.
//! 3. **Parallel manifest read.**  Surviving manifests are read
//!    concurrently on the shared [`IoPool`]; the planner performs a single
//!    join.
//! 4. **Per-entry pruning.**  Partition filter, bucket selector, and —
//!    since every file descriptor carries per-SST column statistics —
//!    conservative key/value filter evaluation.  Stats pruning is sound:
//!    it never drops a file that could hold a matching record.
//! 5. **ADD/DELETE fold, serial, in list order.**  Each identifier must
//!    see exactly one ADD before at most one DELETE; any other sequence
//!    is [`ScanError::CorruptManifest`].  Parallelism applies only to the
//!    reading stage — the fold runs on the caller's thread.
//!
//! The live set is a deterministic function of `(snapshot, filters)`,
//! independent of pool size and completion order.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::manifest::{self, FileKind, ManifestEntry, ManifestError, ManifestFileMeta};
use crate::path::PathFactory;
use crate::pool::{CancellationToken, IoPool, PoolError};
use crate::predicate::{Predicate, PredicateError};
use crate::snapshot::{Snapshot, SnapshotError};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by scan planning.
#[derive(Debug, Error)]
pub enum ScanError {
    /// No snapshot file exists for the requested id.  Fatal to this
    /// request, not to the process.
    #[error("snapshot {id} not found")]
    SnapshotNotFound {
        /// The requested snapshot id.
        id: u64,
    },

    /// Storage read failure; the caller owns retries at plan granularity.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// A snapshot or manifest file is malformed; fatal for the snapshot.
    #[error("format error: {0}")]
    Format(String),

    /// The ADD/DELETE event sequence is logically inconsistent.
    #[error("corrupt manifest: {0}")]
    CorruptManifest(String),

    /// A filter references a field type incompatible with the schema.
    #[error("filter type mismatch: {0}")]
    FilterTypeMismatch(#[from] PredicateError),

    /// Cooperative cancellation was observed.
    #[error("scan cancelled")]
    Cancelled,
}

impl From<ManifestError> for ScanError {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::Io(io) => ScanError::Io(io),
            other => ScanError::Format(other.to_string()),
        }
    }
}

impl From<SnapshotError> for ScanError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::NotFound { id } => ScanError::SnapshotNotFound { id },
            SnapshotError::Io(io) => ScanError::Io(io),
            other => ScanError::Format(other.to_string()),
        }
    }
}

impl From<PoolError> for ScanError {
    fn from(e: PoolError) -> Self {
        ScanError::Io(io::Error::other(e))
    }
}

// ------------------------------------------------------------------------------------------------
// Request / Plan
// ------------------------------------------------------------------------------------------------

/// Immutable description of one planning request.
///
/// Optional members model absence explicitly — there are no sentinel
/// values.  Construct with struct syntax over [`ScanRequest::default`].
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// Snapshot to resolve.  `None` together with no injected list yields
    /// an empty plan.
    pub snapshot_id: Option<u64>,
    /// Manifest-list file name to use instead of resolving a snapshot
    /// (post-commit preview).  Takes precedence over `snapshot_id`.
    pub manifest_list: Option<String>,
    /// Filter over partition rows.
    pub partition_filter: Option<Predicate>,
    /// Filter over key fields, evaluated against per-SST key statistics.
    pub key_filter: Option<Predicate>,
    /// Filter over value fields, evaluated against per-SST value
    /// statistics.
    pub value_filter: Option<Predicate>,
    /// Restrict the plan to one bucket.
    pub bucket: Option<u32>,
}

/// Result of planning: the live file set at one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// The resolved snapshot id; `None` for empty plans and injected
    /// manifest lists.
    pub snapshot_id: Option<u64>,
    /// Live entries in commit order, oldest first.
    pub files: Vec<ManifestEntry>,
}

impl Plan {
    /// The empty plan.
    fn empty() -> Self {
        Self {
            snapshot_id: None,
            files: Vec::new(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// ScanPlanner
// ------------------------------------------------------------------------------------------------

/// Plans reads against one table's metadata.
pub struct ScanPlanner {
    factory: PathFactory,
    pool: Arc<IoPool>,
    token: CancellationToken,
}

impl ScanPlanner {
    /// Creates a planner over the given path factory and shared I/O pool.
    pub fn new(factory: PathFactory, pool: Arc<IoPool>) -> Self {
        Self {
            factory,
            pool,
            token: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token observed by this planner.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Resolves `request` to the live file set.
    pub fn plan(&self, request: &ScanRequest) -> Result<Plan, ScanError> {
        // 1. Resolve snapshot → manifest list.
        let (snapshot_id, list_name) = match (&request.manifest_list, request.snapshot_id) {
            (Some(list), _) => (None, list.clone()),
            (None, Some(id)) => {
                let snapshot = Snapshot::read(&self.factory.snapshot_path(id), id)?;
                (Some(id), snapshot.manifest_list)
            }
            (None, None) => return Ok(Plan::empty()),
        };

        let manifests = manifest::read_manifest_list(&self.factory.manifest_path(&list_name))?;
        let total_manifests = manifests.len();

        // 2. Manifest-level pruning on partition statistics.
        let surviving: Vec<ManifestFileMeta> = match &request.partition_filter {
            None => manifests,
            Some(filter) => {
                let mut kept = Vec::with_capacity(manifests.len());
                for meta in manifests {
                    if filter.test_stats(meta.num_entries(), &meta.partition_stats)? {
                        kept.push(meta);
                    } else {
                        debug!(manifest = %meta.file_name, "manifest pruned by partition stats");
                    }
                }
                kept
            }
        };

        // 3. Parallel manifest read; results joined in list order.
        let token = &self.token;
        if token.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let tasks: Vec<_> = surviving
            .iter()
            .map(|meta| {
                let path = self.factory.manifest_path(&meta.file_name);
                let token = token.clone();
                move || -> Result<Vec<ManifestEntry>, ScanError> {
                    if token.is_cancelled() {
                        return Err(ScanError::Cancelled);
                    }
                    Ok(manifest::read_manifest(&path)?)
                }
            })
            .collect();
        let results = self.pool.run_ordered(tasks)?;

        // 4 + 5. Per-entry pruning and the serial ADD/DELETE fold.  The
        // fold keeps ADD arrival order so the plan lists surviving files
        // in commit order (oldest first) — the merge reader derives file
        // recency from that order.
        let mut slots: Vec<Option<ManifestEntry>> = Vec::new();
        let mut live: HashMap<_, usize> = HashMap::new();
        for entries in results {
            for entry in entries? {
                if !self.keep_entry(request, &entry)? {
                    continue;
                }
                match entry.kind {
                    FileKind::Add => {
                        let identifier = entry.identifier();
                        if live.insert(identifier.clone(), slots.len()).is_some() {
                            return Err(ScanError::CorruptManifest(format!(
                                "duplicate ADD for {identifier:?}"
                            )));
                        }
                        slots.push(Some(entry));
                    }
                    FileKind::Delete => {
                        let identifier = entry.identifier();
                        let Some(slot) = live.remove(&identifier) else {
                            return Err(ScanError::CorruptManifest(format!(
                                "DELETE without matching ADD for {identifier:?}"
                            )));
                        };
                        slots[slot] = None;
                    }
                }
            }
        }
        let files: Vec<ManifestEntry> = slots.into_iter().flatten().collect();

        info!(
            snapshot = ?snapshot_id,
            manifests = total_manifests,
            read = surviving.len(),
            live = files.len(),
            "scan planned"
        );
        Ok(Plan { snapshot_id, files })
    }

    /// Per-entry pruning: partition filter, bucket selector, and
    /// conservative key/value statistics.
    fn keep_entry(&self, request: &ScanRequest, entry: &ManifestEntry) -> Result<bool, ScanError> {
        if let Some(filter) = &request.partition_filter
            && !filter.test(&entry.partition)?
        {
            return Ok(false);
        }
        if let Some(bucket) = request.bucket
            && entry.bucket != bucket
        {
            return Ok(false);
        }
        if let Some(filter) = &request.key_filter
            && !filter.test_stats(entry.file.row_count, &entry.file.key_stats)?
        {
            return Ok(false);
        }
        if let Some(filter) = &request.value_filter
            && !filter.test_stats(entry.file.row_count, &entry.file.value_stats)?
        {
            return Ok(false);
        }
        Ok(true)
    }
}
