use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::mergetree::MergeEngine;
use crate::row::{Datum, DatumKind, Row, RowField, RowType};
use crate::scan::{Plan, ScanRequest};
use crate::table::{Table, TableConfig};

/// Initialize tracing controlled by `RUST_LOG`.  Safe to call multiple
/// times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Unpartitioned int-key / int-value table.
pub fn int_table(root: &Path, engine: MergeEngine) -> Table {
    init_tracing();
    let config = TableConfig {
        key_type: RowType::new(vec![RowField::new("k", DatumKind::Int)]),
        value_type: RowType::new(vec![RowField::new("v", DatumKind::Int)]),
        partition_type: RowType::empty(),
        merge_engine: engine,
        manifest_target_size: 8 << 20,
        write_buffer_entries: 1024,
        io_threads: 2,
    };
    Table::open(root, config).unwrap()
}

/// Table partitioned by one string field.
pub fn partitioned_table(root: &Path) -> Table {
    init_tracing();
    let config = TableConfig {
        key_type: RowType::new(vec![RowField::new("k", DatumKind::Int)]),
        value_type: RowType::new(vec![RowField::new("v", DatumKind::Int)]),
        partition_type: RowType::new(vec![RowField::new("p", DatumKind::Str)]),
        merge_engine: MergeEngine::Deduplicate,
        manifest_target_size: 8 << 20,
        write_buffer_entries: 1024,
        io_threads: 2,
    };
    Table::open(root, config).unwrap()
}

pub fn key(k: i64) -> Row {
    Row::new(vec![Datum::Int(k)])
}

pub fn value(v: i64) -> Row {
    Row::new(vec![Datum::Int(v)])
}

pub fn plan_at(table: &Table, snapshot_id: u64) -> Plan {
    table
        .plan(&ScanRequest {
            snapshot_id: Some(snapshot_id),
            ..Default::default()
        })
        .unwrap()
}

/// Merged read of one bucket as `(key, value)` integer pairs.
pub fn read_ints(table: &Table, plan: &Plan, partition: &Row, bucket: u32) -> Vec<(i64, i64)> {
    table
        .read_bucket(plan, partition, bucket)
        .unwrap()
        .map(|record| {
            let record = record.unwrap();
            (
                record.key.field(0).unwrap().as_int().unwrap(),
                record.value.field(0).unwrap().as_int().unwrap(),
            )
        })
        .collect()
}
