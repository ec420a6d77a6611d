use std::fs;

use tempfile::TempDir;

use crate::snapshot::{CommitKind, Snapshot, SnapshotError, latest_snapshot_id};

fn snapshot(id: u64) -> Snapshot {
    Snapshot {
        id,
        manifest_list: format!("list-{id}"),
        commit_user: "u".into(),
        commit_identifier: format!("c-{id}"),
        commit_kind: CommitKind::Append,
        time_millis: 1,
    }
}

#[test]
fn test_publish_then_read() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("snapshot-1");

    snapshot(1).publish(&path).unwrap();
    let back = Snapshot::read(&path, 1).unwrap();
    assert_eq!(back, snapshot(1));
}

#[test]
fn test_publish_loses_race() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("snapshot-1");

    snapshot(1).publish(&path).unwrap();
    let err = snapshot(1).publish(&path).unwrap_err();
    assert!(matches!(err, SnapshotError::AlreadyExists { id: 1 }));
}

#[test]
fn test_read_missing_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = Snapshot::read(&tmp.path().join("snapshot-9"), 9).unwrap_err();
    assert!(matches!(err, SnapshotError::NotFound { id: 9 }));
}

#[test]
fn test_read_garbage_is_format_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("snapshot-2");
    fs::write(&path, b"{not json").unwrap();
    let err = Snapshot::read(&path, 2).unwrap_err();
    assert!(matches!(err, SnapshotError::Format(_)));
}

#[test]
fn test_latest_snapshot_id_scans_directory() {
    let tmp = TempDir::new().unwrap();

    assert_eq!(latest_snapshot_id(tmp.path()).unwrap(), None);

    for id in [1u64, 3, 2] {
        snapshot(id)
            .publish(&tmp.path().join(format!("snapshot-{id}")))
            .unwrap();
    }
    // Stray files are skipped.
    fs::write(tmp.path().join("LATEST.tmp"), b"x").unwrap();

    assert_eq!(latest_snapshot_id(tmp.path()).unwrap(), Some(3));
}

#[test]
fn test_latest_snapshot_id_missing_dir() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope");
    assert_eq!(latest_snapshot_id(&missing).unwrap(), None);
}
