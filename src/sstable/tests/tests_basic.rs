use tempfile::TempDir;

use crate::row::{Datum, KeyValue, Row};
use crate::sstable::{Sst, SstError, SstWriter};

fn kv(k: i64, v: i64) -> KeyValue {
    KeyValue::add(
        Row::new(vec![Datum::Int(k)]),
        Row::new(vec![Datum::Int(v)]),
    )
}

#[test]
fn test_build_and_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f1");

    let entries = vec![kv(1, 10), kv(2, 20), kv(3, 30)];
    let meta = SstWriter::new(&path, 0)
        .build(entries.into_iter())
        .expect("build SST");

    assert_eq!(meta.file_name, "f1");
    assert_eq!(meta.row_count, 3);
    assert_eq!(meta.level, 0);
    assert_eq!(meta.min_key, Row::new(vec![Datum::Int(1)]));
    assert_eq!(meta.max_key, Row::new(vec![Datum::Int(3)]));
    assert_eq!(meta.key_stats.len(), 1);
    assert_eq!(meta.key_stats[0].min, Some(Datum::Int(1)));
    assert_eq!(meta.key_stats[0].max, Some(Datum::Int(3)));
    assert_eq!(meta.value_stats[0].min, Some(Datum::Int(10)));
    assert_eq!(meta.value_stats[0].max, Some(Datum::Int(30)));

    let on_disk = std::fs::metadata(&path).unwrap().len();
    assert_eq!(meta.file_size, on_disk);

    let sst = Sst::open(&path).expect("open SST");
    assert_eq!(sst.row_count(), 3);
    assert_eq!(sst.min_key(), &Row::new(vec![Datum::Int(1)]));
    assert_eq!(sst.max_key(), &Row::new(vec![Datum::Int(3)]));
    assert_eq!(sst.block_count(), 1);
}

#[test]
fn test_tombstones_are_preserved() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f2");

    let entries = vec![
        kv(1, 10),
        KeyValue::delete(Row::new(vec![Datum::Int(2)]), Row::new(vec![Datum::Int(0)])),
    ];
    let meta = SstWriter::new(&path, 0).build(entries.into_iter()).unwrap();
    assert_eq!(meta.row_count, 2);
}

#[test]
fn test_empty_stream_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f3");
    let err = SstWriter::new(&path, 0)
        .build(std::iter::empty())
        .unwrap_err();
    assert!(matches!(err, SstError::Malformed(_)));
    assert!(!path.exists());
}

#[test]
fn test_many_rows_span_multiple_blocks() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f4");

    let meta = SstWriter::new(&path, 2)
        .build((0..2000).map(|i| kv(i, i * 10)))
        .unwrap();
    assert_eq!(meta.row_count, 2000);
    assert_eq!(meta.level, 2);

    let sst = Sst::open(&path).unwrap();
    assert!(sst.block_count() > 1, "2000 rows should roll several blocks");
}

#[test]
fn test_meta_wire_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f5");
    let meta = SstWriter::new(&path, 1)
        .build(vec![kv(5, 50), kv(6, 60)].into_iter())
        .unwrap();

    let bytes = crate::encoding::encode_to_vec(&meta).unwrap();
    let (back, _) = crate::encoding::decode_from_slice::<crate::sstable::SstFileMeta>(&bytes).unwrap();
    assert_eq!(back, meta);
}
