//! Snapshot documents — immutable pointers to a table state at a commit.
//!
//! A snapshot is a small JSON document naming the manifest list that
//! describes the table at one commit, plus commit metadata.  Snapshot ids
//! are strictly monotonic starting at 1; a snapshot file is immutable once
//! it exists.
//!
//! # JSON schema
//!
//! ```json
//! {
//!   "id": 3,
//!   "manifestList": "6f7c…",
//!   "commitUser": "writer-1",
//!   "commitIdentifier": "batch-17",
//!   "commitKind": "APPEND",
//!   "timeMillis": 1718000000000
//! }
//! ```
//!
//! All listed fields are required; unknown fields are ignored on read so
//! newer writers can add append-compatible metadata.  An unrecognised
//! `commitKind` is a format error.  The encoding round-trips: field names
//! are stable and carry no ordering dependence.
//!
//! # Publication
//!
//! Commit publishes `snapshot-<id>` with *create-new* semantics: losing a
//! publish race surfaces as [`SnapshotError::AlreadyExists`], and the
//! loser retries on top of the winner's state.  The `(commitUser,
//! commitIdentifier)` pair is the idempotency key for such retries.

#[cfg(test)]
mod tests;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No snapshot file exists for the requested id.
    #[error("snapshot {id} not found")]
    NotFound {
        /// The requested snapshot id.
        id: u64,
    },

    /// The snapshot file exists but is not a well-formed document.
    #[error("malformed snapshot document: {0}")]
    Format(#[from] serde_json::Error),

    /// A snapshot with this id has already been published.
    #[error("snapshot {id} already exists")]
    AlreadyExists {
        /// The contested snapshot id.
        id: u64,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// Snapshot
// ------------------------------------------------------------------------------------------------

/// What kind of commit produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommitKind {
    /// Only new data files were added.
    Append,
    /// Data files were rewritten by compaction; table contents unchanged.
    Compact,
}

/// Immutable pointer to a table state at a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Strictly monotonic snapshot id, starting at 1.
    pub id: u64,
    /// File name of this snapshot's manifest list.
    pub manifest_list: String,
    /// Writer identity that produced the commit.
    pub commit_user: String,
    /// Writer-chosen identifier; with `commit_user`, the idempotency key
    /// for commit retries.
    pub commit_identifier: String,
    /// What kind of commit produced this snapshot.
    pub commit_kind: CommitKind,
    /// Commit wall-clock time, milliseconds since the UNIX epoch.
    pub time_millis: i64,
}

impl Snapshot {
    /// Parses a snapshot from its JSON document.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Renders this snapshot as a JSON document.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads and parses the snapshot with the given `id` from `path`.
    ///
    /// A missing file maps to [`SnapshotError::NotFound`].
    pub fn read(path: &Path, id: u64) -> Result<Self, SnapshotError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound { id });
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&json)
    }

    /// Publishes this snapshot at `path` with create-new semantics.
    ///
    /// The document is fully written and fsynced before the call returns;
    /// the parent directory is fsynced so the new entry is durable.  If a
    /// file already exists at `path`, another writer won the race and
    /// [`SnapshotError::AlreadyExists`] is returned.
    pub fn publish(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = self.to_json()?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SnapshotError::AlreadyExists { id: self.id });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        if let Some(dir) = path.parent() {
            File::open(dir)?.sync_all()?;
        }

        debug!(id = self.id, kind = ?self.commit_kind, "snapshot published");
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Directory scanning
// ------------------------------------------------------------------------------------------------

/// Returns the highest snapshot id present in `snapshot_dir`, or `None`
/// when the directory is missing or holds no snapshot files.
///
/// Files that do not match the `snapshot-<id>` pattern are ignored.
pub fn latest_snapshot_id(snapshot_dir: &Path) -> Result<Option<u64>, SnapshotError> {
    let entries = match fs::read_dir(snapshot_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut latest = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(id) = name
            .to_str()
            .and_then(|n| n.strip_prefix("snapshot-"))
            .and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        latest = latest.max(Some(id));
    }
    Ok(latest)
}
