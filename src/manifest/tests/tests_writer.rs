use std::fs;

use tempfile::TempDir;

use super::tests_codec::entry;
use crate::manifest::{FileKind, ManifestWriter, read_manifest};
use crate::path::PathFactory;
use crate::row::{Datum, Row, RowField, RowType, DatumKind};

fn factory(root: &std::path::Path) -> PathFactory {
    PathFactory::new(root, RowType::new(vec![RowField::new("p", DatumKind::Str)]))
}

fn part(p: &str) -> Row {
    Row::new(vec![Datum::Str(p.into())])
}

#[test]
fn test_single_file_with_stats_and_counts() {
    let tmp = TempDir::new().unwrap();
    let factory = factory(tmp.path());
    fs::create_dir_all(factory.manifest_dir()).unwrap();

    let mut writer = ManifestWriter::new(&factory, 1 << 20);
    writer.add(&entry(FileKind::Add, part("a"), 0, "f1")).unwrap();
    writer.add(&entry(FileKind::Add, part("c"), 0, "f2")).unwrap();
    writer.add(&entry(FileKind::Delete, part("b"), 0, "f3")).unwrap();

    let metas = writer.finish().unwrap();
    assert_eq!(metas.len(), 1);
    let meta = &metas[0];
    assert_eq!(meta.num_added_files, 2);
    assert_eq!(meta.num_deleted_files, 1);
    assert_eq!(meta.partition_stats.len(), 1);
    assert_eq!(meta.partition_stats[0].min, Some(Datum::Str("a".into())));
    assert_eq!(meta.partition_stats[0].max, Some(Datum::Str("c".into())));

    let path = factory.manifest_path(&meta.file_name);
    assert_eq!(fs::metadata(&path).unwrap().len(), meta.file_size);
    assert_eq!(read_manifest(&path).unwrap().len(), 3);
}

#[test]
fn test_rolls_past_target_size() {
    let tmp = TempDir::new().unwrap();
    let factory = factory(tmp.path());
    fs::create_dir_all(factory.manifest_dir()).unwrap();

    // A tiny target forces a roll after every entry.
    let mut writer = ManifestWriter::new(&factory, 1);
    for i in 0..5 {
        writer
            .add(&entry(FileKind::Add, part("a"), 0, &format!("f{i}")))
            .unwrap();
    }
    let metas = writer.finish().unwrap();
    assert_eq!(metas.len(), 5);

    // Stats and counts reset per file.
    for meta in &metas {
        assert_eq!(meta.num_added_files, 1);
        assert_eq!(meta.num_deleted_files, 0);
        assert_eq!(read_manifest(&factory.manifest_path(&meta.file_name)).unwrap().len(), 1);
    }
}

#[test]
fn test_no_entries_no_files() {
    let tmp = TempDir::new().unwrap();
    let factory = factory(tmp.path());
    fs::create_dir_all(factory.manifest_dir()).unwrap();

    let writer = ManifestWriter::new(&factory, 1 << 20);
    assert!(writer.finish().unwrap().is_empty());
}

#[test]
fn test_unpartitioned_entries_have_empty_stats() {
    let tmp = TempDir::new().unwrap();
    let factory = PathFactory::new(tmp.path(), RowType::empty());
    fs::create_dir_all(factory.manifest_dir()).unwrap();

    let mut writer = ManifestWriter::new(&factory, 1 << 20);
    writer.add(&entry(FileKind::Add, Row::empty(), 0, "f1")).unwrap();
    let metas = writer.finish().unwrap();
    assert!(metas[0].partition_stats.is_empty());
}
