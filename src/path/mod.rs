//! Path factory — maps logical entities to storage paths.
//!
//! All on-disk artifacts of one table live under a single root:
//!
//! ```text
//! <root>/snapshot/snapshot-<id>             JSON snapshot documents
//! <root>/manifest/<uuid>                    manifests and manifest lists
//! <root>/<k1=v1/…>/bucket-<n>/<uuid>        SST data files
//! ```
//!
//! Partition directories encode the partition row's fields as
//! `name=value` segments in schema order.  The factory is stateless apart
//! from the root and the partition schema; file names are minted from
//! random UUIDs so concurrent writers never collide.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::row::{Row, RowType};

/// Directory holding snapshot documents.
pub const SNAPSHOT_DIR: &str = "snapshot";
/// Directory holding manifests and manifest lists.
pub const MANIFEST_DIR: &str = "manifest";

// ------------------------------------------------------------------------------------------------
// PathFactory
// ------------------------------------------------------------------------------------------------

/// Mints storage paths for one table.
#[derive(Debug, Clone)]
pub struct PathFactory {
    root: PathBuf,
    partition_type: RowType,
}

impl PathFactory {
    /// Creates a factory rooted at `root` for tables partitioned by
    /// `partition_type` (use [`RowType::empty`] for unpartitioned tables).
    pub fn new(root: impl AsRef<Path>, partition_type: RowType) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            partition_type,
        }
    }

    /// The table root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding snapshot documents.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOT_DIR)
    }

    /// Path of the snapshot document with the given id.
    pub fn snapshot_path(&self, id: u64) -> PathBuf {
        self.snapshot_dir().join(format!("snapshot-{id}"))
    }

    /// Directory holding manifests and manifest lists.
    pub fn manifest_dir(&self) -> PathBuf {
        self.root.join(MANIFEST_DIR)
    }

    /// Path of an existing manifest or manifest-list file.
    pub fn manifest_path(&self, file_name: &str) -> PathBuf {
        self.manifest_dir().join(file_name)
    }

    /// Mints a fresh manifest (or manifest-list) file name and path.
    pub fn new_manifest(&self) -> (String, PathBuf) {
        let file_name = Uuid::new_v4().to_string();
        let path = self.manifest_path(&file_name);
        (file_name, path)
    }

    /// Directory holding the SSTs of one `(partition, bucket)`.
    ///
    /// Partition fields beyond the schema arity are ignored; validation of
    /// partition rows against the schema happens at write time.
    pub fn bucket_dir(&self, partition: &Row, bucket: u32) -> PathBuf {
        let mut dir = self.root.clone();
        for (field, datum) in self.partition_type.fields().zip(partition.fields()) {
            dir.push(format!("{}={}", field.name, datum));
        }
        dir.push(format!("bucket-{bucket}"));
        dir
    }

    /// Returns a subordinate factory minting SST paths for one
    /// `(partition, bucket)`.
    pub fn sst_factory(&self, partition: &Row, bucket: u32) -> SstPathFactory {
        SstPathFactory {
            dir: self.bucket_dir(partition, bucket),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// SstPathFactory
// ------------------------------------------------------------------------------------------------

/// Mints SST paths inside one `(partition, bucket)` directory.
#[derive(Debug, Clone)]
pub struct SstPathFactory {
    dir: PathBuf,
}

impl SstPathFactory {
    /// The bucket directory all minted paths live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an existing SST file.
    pub fn sst_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Mints a fresh SST file name and path.
    pub fn new_sst(&self) -> (String, PathBuf) {
        let file_name = Uuid::new_v4().to_string();
        let path = self.sst_path(&file_name);
        (file_name, path)
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{Datum, DatumKind, RowField};

    fn factory() -> PathFactory {
        PathFactory::new(
            "/data/t1",
            RowType::new(vec![
                RowField::new("dt", DatumKind::Str),
                RowField::new("hr", DatumKind::Int),
            ]),
        )
    }

    #[test]
    fn test_snapshot_path() {
        assert_eq!(
            factory().snapshot_path(42),
            PathBuf::from("/data/t1/snapshot/snapshot-42")
        );
    }

    #[test]
    fn test_bucket_dir_encodes_partition_fields() {
        let partition = Row::new(vec![Datum::Str("2024-06-01".into()), Datum::Int(7)]);
        assert_eq!(
            factory().bucket_dir(&partition, 3),
            PathBuf::from("/data/t1/dt=2024-06-01/hr=7/bucket-3")
        );
    }

    #[test]
    fn test_unpartitioned_bucket_dir() {
        let factory = PathFactory::new("/data/t2", RowType::empty());
        assert_eq!(
            factory.bucket_dir(&Row::empty(), 0),
            PathBuf::from("/data/t2/bucket-0")
        );
    }

    #[test]
    fn test_minted_names_are_unique() {
        let factory = factory();
        let (a, _) = factory.new_manifest();
        let (b, _) = factory.new_manifest();
        assert_ne!(a, b);

        let sst = factory.sst_factory(&Row::new(vec![Datum::Str("d".into()), Datum::Int(0)]), 0);
        let (a, path_a) = sst.new_sst();
        let (b, _) = sst.new_sst();
        assert_ne!(a, b);
        assert!(path_a.starts_with(sst.dir()));
    }
}
