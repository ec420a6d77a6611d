use tempfile::TempDir;

use super::helpers::{add, factory, file_meta, part, planner, publish_snapshot};
use crate::pool::CancellationToken;
use crate::scan::{ScanError, ScanRequest};

#[test]
fn test_no_selector_yields_empty_plan() {
    let tmp = TempDir::new().unwrap();
    let factory = factory(tmp.path());

    let plan = planner(&factory, 2).plan(&ScanRequest::default()).unwrap();
    assert_eq!(plan.snapshot_id, None);
    assert!(plan.files.is_empty());
}

#[test]
fn test_missing_snapshot_reported() {
    let tmp = TempDir::new().unwrap();
    let factory = factory(tmp.path());

    let err = planner(&factory, 2)
        .plan(&ScanRequest {
            snapshot_id: Some(41),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, ScanError::SnapshotNotFound { id: 41 }));
}

#[test]
fn test_injected_manifest_list_has_no_snapshot_id() {
    let tmp = TempDir::new().unwrap();
    let factory = factory(tmp.path());

    let snapshot = publish_snapshot(
        &factory,
        1,
        &[&[add(part("a"), 0, file_meta("f1", 0, 9, 0))]],
    );

    // Post-commit preview: plan straight off the list file.
    let plan = planner(&factory, 2)
        .plan(&ScanRequest {
            manifest_list: Some(snapshot.manifest_list),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(plan.snapshot_id, None);
    assert_eq!(plan.files.len(), 1);
}

#[test]
fn test_plan_deterministic_across_pool_sizes() {
    let tmp = TempDir::new().unwrap();
    let factory = factory(tmp.path());

    // Many small manifests so the pool actually interleaves reads.
    let entries: Vec<Vec<_>> = (0..24)
        .map(|i| {
            vec![add(
                part(if i % 2 == 0 { "a" } else { "b" }),
                i % 4,
                file_meta(&format!("f{i}"), 0, 9, 0),
            )]
        })
        .collect();
    let groups: Vec<&[_]> = entries.iter().map(|g| g.as_slice()).collect();
    publish_snapshot(&factory, 1, &groups);

    let request = ScanRequest {
        snapshot_id: Some(1),
        ..Default::default()
    };
    let reference = planner(&factory, 1).plan(&request).unwrap();
    assert_eq!(reference.files.len(), 24);

    for threads in [2, 4, 8] {
        let plan = planner(&factory, threads).plan(&request).unwrap();
        assert_eq!(plan, reference, "plan differed with {threads} threads");
    }
}

#[test]
fn test_cancelled_token_aborts_planning() {
    let tmp = TempDir::new().unwrap();
    let factory = factory(tmp.path());

    publish_snapshot(&factory, 1, &[&[add(part("a"), 0, file_meta("f", 0, 9, 0))]]);

    let token = CancellationToken::new();
    token.cancel();
    let err = planner(&factory, 2)
        .with_cancellation(token)
        .plan(&ScanRequest {
            snapshot_id: Some(1),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, ScanError::Cancelled));
}
