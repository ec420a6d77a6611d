//! Commit layer — turns writer increments into published snapshots.
//!
//! The write path reports finished files as [`CommitIncrement`]s; the
//! [`Committer`] converts them into manifest entries, writes the
//! manifest(s) and a new manifest list, and publishes the next snapshot:
//!
//! 1. `new_files` and `compacted_after` become ADD entries,
//!    `compacted_before` become DELETE entries.
//! 2. Entries are written through a rolling [`ManifestWriter`].
//! 3. The previous snapshot's manifest list is extended with the new
//!    manifests — the list for snapshot N replays to N−1's state plus the
//!    new events.
//! 4. `snapshot-<N>` is published with create-new semantics.  Losing the
//!    publish race surfaces as [`CommitError::Conflict`]; the caller owns
//!    the retry, re-planning on top of the winner.
//!
//! Retries are made idempotent by the `(commit_user, commit_identifier)`
//! pair: before publishing, the committer walks existing snapshots newest
//! to oldest and returns the already-published snapshot when the pair is
//! found.


use std::fs;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::info;

use crate::manifest::{
    FileKind, ManifestEntry, ManifestError, ManifestWriter, read_manifest_list,
    write_manifest_list,
};
use crate::path::PathFactory;
use crate::row::Row;
use crate::snapshot::{CommitKind, Snapshot, SnapshotError, latest_snapshot_id};
use crate::sstable::SstFileMeta;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by commit operations.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Manifest codec failure.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Snapshot codec failure.
    #[error("snapshot error: {0}")]
    Snapshot(SnapshotError),

    /// Another writer published the contested snapshot id first.  The
    /// caller re-plans against the new head and retries.
    #[error("snapshot {id} already published by another writer")]
    Conflict {
        /// The contested snapshot id.
        id: u64,
    },
}

impl From<SnapshotError> for CommitError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::AlreadyExists { id } => CommitError::Conflict { id },
            other => CommitError::Snapshot(other),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// CommitIncrement — the writer-emit contract
// ------------------------------------------------------------------------------------------------

/// Files one writer produced for one `(partition, bucket)` since its last
/// commit.
///
/// `new_files` are freshly flushed sorted runs.  A compaction rewrite
/// reports the files it consumed in `compacted_before` and the files it
/// produced in `compacted_after`.
#[derive(Debug, Clone, Default)]
pub struct CommitIncrement {
    /// Partition the files belong to.
    pub partition: Row,
    /// Bucket within the partition.
    pub bucket: u32,
    /// Newly flushed data files.
    pub new_files: Vec<SstFileMeta>,
    /// Files consumed by compaction.
    pub compacted_before: Vec<SstFileMeta>,
    /// Files produced by compaction.
    pub compacted_after: Vec<SstFileMeta>,
}

impl CommitIncrement {
    /// An increment that only appends new files.
    pub fn append(partition: Row, bucket: u32, new_files: Vec<SstFileMeta>) -> Self {
        Self {
            partition,
            bucket,
            new_files,
            ..Default::default()
        }
    }

    /// An increment reporting a compaction rewrite.
    pub fn compaction(
        partition: Row,
        bucket: u32,
        before: Vec<SstFileMeta>,
        after: Vec<SstFileMeta>,
    ) -> Self {
        Self {
            partition,
            bucket,
            new_files: Vec::new(),
            compacted_before: before,
            compacted_after: after,
        }
    }

    /// Returns `true` when this increment carries compaction results.
    pub fn has_compaction(&self) -> bool {
        !self.compacted_before.is_empty() || !self.compacted_after.is_empty()
    }
}

// ------------------------------------------------------------------------------------------------
// Committer
// ------------------------------------------------------------------------------------------------

/// Publishes commits for one table.
pub struct Committer {
    factory: PathFactory,
    manifest_target_size: usize,
}

impl Committer {
    /// Creates a committer minting paths from `factory` and rolling
    /// manifests past `manifest_target_size` bytes.
    pub fn new(factory: PathFactory, manifest_target_size: usize) -> Self {
        Self {
            factory,
            manifest_target_size,
        }
    }

    /// Publishes one commit and returns its snapshot.
    ///
    /// Retrying a commit with the same `(user, identifier)` pair after a
    /// crash returns the already-published snapshot instead of writing a
    /// second one.
    pub fn commit(
        &self,
        increments: &[CommitIncrement],
        user: &str,
        identifier: &str,
    ) -> Result<Snapshot, CommitError> {
        fs::create_dir_all(self.factory.snapshot_dir())?;
        fs::create_dir_all(self.factory.manifest_dir())?;

        let latest = latest_snapshot_id(&self.factory.snapshot_dir())?;
        if let Some(published) = self.find_published(latest, user, identifier)? {
            info!(
                id = published.id,
                user, identifier, "commit retry matched published snapshot"
            );
            return Ok(published);
        }

        // Increments → manifest entries.
        let mut writer = ManifestWriter::new(&self.factory, self.manifest_target_size);
        let mut commit_kind = CommitKind::Append;
        for increment in increments {
            if increment.has_compaction() {
                commit_kind = CommitKind::Compact;
            }
            for (kind, files) in [
                (FileKind::Add, &increment.new_files),
                (FileKind::Add, &increment.compacted_after),
                (FileKind::Delete, &increment.compacted_before),
            ] {
                for file in files {
                    writer.add(&ManifestEntry {
                        kind,
                        partition: increment.partition.clone(),
                        bucket: increment.bucket,
                        file: file.clone(),
                    })?;
                }
            }
        }
        let new_manifests = writer.finish()?;

        // Extend the previous manifest list.
        let mut manifests = match latest {
            Some(id) => {
                let snapshot = Snapshot::read(&self.factory.snapshot_path(id), id)?;
                read_manifest_list(&self.factory.manifest_path(&snapshot.manifest_list))?
            }
            None => Vec::new(),
        };
        manifests.extend(new_manifests);

        let (list_name, list_path) = self.factory.new_manifest();
        write_manifest_list(&list_path, &manifests)?;

        // Publish the next snapshot.
        let id = latest.unwrap_or(0) + 1;
        let snapshot = Snapshot {
            id,
            manifest_list: list_name,
            commit_user: user.to_string(),
            commit_identifier: identifier.to_string(),
            commit_kind,
            time_millis: unix_time_millis(),
        };
        snapshot.publish(&self.factory.snapshot_path(id))?;

        info!(
            id,
            kind = ?commit_kind,
            manifests = manifests.len(),
            "commit published"
        );
        Ok(snapshot)
    }

    /// Walks snapshots newest to oldest looking for a previous publication
    /// of `(user, identifier)`.  Stops at the first gap (expired ids).
    fn find_published(
        &self,
        latest: Option<u64>,
        user: &str,
        identifier: &str,
    ) -> Result<Option<Snapshot>, CommitError> {
        let Some(latest) = latest else {
            return Ok(None);
        };
        for id in (1..=latest).rev() {
            let snapshot = match Snapshot::read(&self.factory.snapshot_path(id), id) {
                Ok(snapshot) => snapshot,
                Err(SnapshotError::NotFound { .. }) => break,
                Err(e) => return Err(e.into()),
            };
            if snapshot.commit_user == user && snapshot.commit_identifier == identifier {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }
}

/// Milliseconds since the UNIX epoch.
fn unix_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_millis() as i64
}
