use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::manifest::{
    FileKind, ManifestEntry, ManifestFileMeta, ManifestWriter, write_manifest_list,
};
use crate::path::PathFactory;
use crate::pool::IoPool;
use crate::row::{Datum, DatumKind, Row, RowField, RowType};
use crate::scan::ScanPlanner;
use crate::snapshot::{CommitKind, Snapshot};
use crate::sstable::SstFileMeta;
use crate::stats::FieldStats;

/// Path factory over a one-string-field partition schema.
pub fn factory(root: &Path) -> PathFactory {
    let factory = PathFactory::new(root, RowType::new(vec![RowField::new("p", DatumKind::Str)]));
    fs::create_dir_all(factory.snapshot_dir()).unwrap();
    fs::create_dir_all(factory.manifest_dir()).unwrap();
    factory
}

pub fn planner(factory: &PathFactory, threads: usize) -> ScanPlanner {
    ScanPlanner::new(factory.clone(), Arc::new(IoPool::new(threads)))
}

pub fn part(p: &str) -> Row {
    Row::new(vec![Datum::Str(p.into())])
}

/// File descriptor with int key stats covering `[min, max]`.
pub fn file_meta(name: &str, min: i64, max: i64, level: u32) -> SstFileMeta {
    let mut key_stats = FieldStats::empty();
    key_stats.observe(&Datum::Int(min));
    key_stats.observe(&Datum::Int(max));
    SstFileMeta {
        file_name: name.into(),
        file_size: 64,
        row_count: (max - min + 1) as u64,
        min_key: Row::new(vec![Datum::Int(min)]),
        max_key: Row::new(vec![Datum::Int(max)]),
        key_stats: vec![key_stats],
        value_stats: vec![FieldStats::empty()],
        level,
    }
}

pub fn add(partition: Row, bucket: u32, file: SstFileMeta) -> ManifestEntry {
    ManifestEntry {
        kind: FileKind::Add,
        partition,
        bucket,
        file,
    }
}

pub fn delete(partition: Row, bucket: u32, file: SstFileMeta) -> ManifestEntry {
    ManifestEntry {
        kind: FileKind::Delete,
        partition,
        bucket,
        file,
    }
}

/// Writes one manifest per entry group, a manifest list over them, and a
/// snapshot pointing at the list.  Returns the snapshot.
pub fn publish_snapshot(
    factory: &PathFactory,
    id: u64,
    groups: &[&[ManifestEntry]],
) -> Snapshot {
    let mut metas: Vec<ManifestFileMeta> = Vec::new();
    for group in groups {
        let mut writer = ManifestWriter::new(factory, 8 << 20);
        for entry in *group {
            writer.add(entry).unwrap();
        }
        metas.extend(writer.finish().unwrap());
    }

    let (list_name, list_path) = factory.new_manifest();
    write_manifest_list(&list_path, &metas).unwrap();

    let snapshot = Snapshot {
        id,
        manifest_list: list_name,
        commit_user: "test".into(),
        commit_identifier: format!("c-{id}"),
        commit_kind: CommitKind::Append,
        time_millis: 0,
    };
    snapshot.publish(&factory.snapshot_path(id)).unwrap();
    snapshot
}

/// Names of the manifests referenced by a snapshot's list, in order.
pub fn manifest_names(factory: &PathFactory, snapshot: &Snapshot) -> Vec<String> {
    crate::manifest::read_manifest_list(&factory.manifest_path(&snapshot.manifest_list))
        .unwrap()
        .into_iter()
        .map(|meta| meta.file_name)
        .collect()
}
