use std::fs;

use tempfile::TempDir;

use crate::row::{Datum, KeyValue, Row};
use crate::sstable::{RecordReader, Sst, SstError, SstReader, SstWriter};

fn build_sample(path: &std::path::Path, rows: i64) {
    let entries = (0..rows).map(|i| {
        KeyValue::add(
            Row::new(vec![Datum::Int(i)]),
            Row::new(vec![Datum::Str("some-payload".into())]),
        )
    });
    SstWriter::new(path, 0).build(entries).unwrap();
}

#[test]
fn test_truncated_file_rejected_at_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f1");
    build_sample(&path, 10);

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    assert!(Sst::open(&path).is_err());
}

#[test]
fn test_tiny_file_rejected_at_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f2");
    fs::write(&path, b"TSS0").unwrap();

    let err = Sst::open(&path).unwrap_err();
    assert!(matches!(err, SstError::Malformed(_)));
}

#[test]
fn test_flipped_header_byte_fails_checksum() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f3");
    build_sample(&path, 10);

    let mut bytes = fs::read(&path).unwrap();
    bytes[1] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let err = Sst::open(&path).unwrap_err();
    assert!(matches!(err, SstError::ChecksumMismatch));
}

#[test]
fn test_flipped_data_byte_fails_on_read_not_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f4");
    build_sample(&path, 200);

    // Flip a byte inside the first data block (just past the 12-byte
    // header and the block's 4-byte length prefix).
    let mut bytes = fs::read(&path).unwrap();
    bytes[40] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    // Metadata blocks are intact, so open succeeds.
    let mut reader = SstReader::open(&path).expect("open should not touch data blocks");

    let err = reader.next_batch().unwrap_err();
    assert!(matches!(err, SstError::ChecksumMismatch));
}

#[test]
fn test_bad_footer_size_claim_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("f5");
    build_sample(&path, 10);

    // Append trailing garbage: the footer no longer sits at the end and
    // its size claim no longer matches.
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(&[0u8; 16]);
    fs::write(&path, &bytes).unwrap();

    assert!(Sst::open(&path).is_err());
}
