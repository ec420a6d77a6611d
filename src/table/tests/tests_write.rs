use tempfile::TempDir;

use super::helpers::{init_tracing, int_table, key, plan_at, read_ints, value};
use crate::mergetree::MergeEngine;
use crate::row::{Datum, DatumKind, Row, RowField, RowType};
use crate::table::{Table, TableConfig, TableError};

#[test]
fn test_writer_dedups_within_batch() {
    let tmp = TempDir::new().unwrap();
    let table = int_table(tmp.path(), MergeEngine::Deduplicate);

    let mut write = table.new_write(Row::empty(), 0).unwrap();
    write.put(key(1), value(10)).unwrap();
    write.put(key(1), value(11)).unwrap();
    let increment = write.finish().unwrap();
    assert_eq!(increment.new_files.len(), 1);
    assert_eq!(increment.new_files[0].row_count, 1);

    table.commit(&[increment], "u", "c-1").unwrap();
    let plan = plan_at(&table, 1);
    assert_eq!(read_ints(&table, &plan, &Row::empty(), 0), vec![(1, 11)]);
}

#[test]
fn test_buffer_limit_rolls_files() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let config = TableConfig {
        key_type: RowType::new(vec![RowField::new("k", DatumKind::Int)]),
        value_type: RowType::new(vec![RowField::new("v", DatumKind::Int)]),
        partition_type: RowType::empty(),
        merge_engine: MergeEngine::Deduplicate,
        manifest_target_size: 8 << 20,
        write_buffer_entries: 10,
        io_threads: 1,
    };
    let table = Table::open(tmp.path(), config).unwrap();

    let mut write = table.new_write(Row::empty(), 0).unwrap();
    for k in 0..25 {
        write.put(key(k), value(k)).unwrap();
    }
    let increment = write.finish().unwrap();
    assert_eq!(increment.new_files.len(), 3, "10 + 10 + 5");

    // All files are level 0 and disjoint by construction here, but the
    // merged read does not rely on that.
    table.commit(&[increment], "u", "c-1").unwrap();
    let plan = plan_at(&table, 1);
    let rows = read_ints(&table, &plan, &Row::empty(), 0);
    assert_eq!(rows.len(), 25);
}

#[test]
fn test_empty_writer_produces_empty_increment() {
    let tmp = TempDir::new().unwrap();
    let table = int_table(tmp.path(), MergeEngine::Deduplicate);

    let write = table.new_write(Row::empty(), 0).unwrap();
    let increment = write.finish().unwrap();
    assert!(increment.new_files.is_empty());
    assert!(!increment.has_compaction());
}

#[test]
fn test_key_schema_enforced() {
    let tmp = TempDir::new().unwrap();
    let table = int_table(tmp.path(), MergeEngine::Deduplicate);

    let mut write = table.new_write(Row::empty(), 0).unwrap();
    let err = write
        .put(Row::new(vec![Datum::Str("oops".into())]), value(1))
        .unwrap_err();
    assert!(matches!(err, TableError::Schema(_)));
}

#[test]
fn test_value_schema_enforced() {
    let tmp = TempDir::new().unwrap();
    let table = int_table(tmp.path(), MergeEngine::Deduplicate);

    let mut write = table.new_write(Row::empty(), 0).unwrap();
    let err = write
        .put(key(1), Row::new(vec![Datum::Int(1), Datum::Int(2)]))
        .unwrap_err();
    assert!(matches!(err, TableError::Schema(_)));
}

#[test]
fn test_partition_schema_enforced() {
    let tmp = TempDir::new().unwrap();
    let table = int_table(tmp.path(), MergeEngine::Deduplicate);

    let err = table
        .new_write(Row::new(vec![Datum::Str("p".into())]), 0)
        .unwrap_err();
    assert!(matches!(err, TableError::Schema(_)));
}

#[test]
fn test_buckets_are_independent() {
    let tmp = TempDir::new().unwrap();
    let table = int_table(tmp.path(), MergeEngine::Deduplicate);

    let mut increments = Vec::new();
    for bucket in 0..2u32 {
        let mut write = table.new_write(Row::empty(), bucket).unwrap();
        write.put(key(bucket as i64), value(100 + bucket as i64)).unwrap();
        increments.push(write.finish().unwrap());
    }
    table.commit(&increments, "u", "c-1").unwrap();

    let plan = plan_at(&table, 1);
    assert_eq!(read_ints(&table, &plan, &Row::empty(), 0), vec![(0, 100)]);
    assert_eq!(read_ints(&table, &plan, &Row::empty(), 1), vec![(1, 101)]);
}
