use crate::snapshot::{CommitKind, Snapshot};

fn sample() -> Snapshot {
    Snapshot {
        id: 3,
        manifest_list: "6f7c1c2e".into(),
        commit_user: "writer-1".into(),
        commit_identifier: "batch-17".into(),
        commit_kind: CommitKind::Append,
        time_millis: 1_718_000_000_000,
    }
}

#[test]
fn test_json_round_trip() {
    let snapshot = sample();
    let json = snapshot.to_json().unwrap();
    let back = Snapshot::from_json(&json).unwrap();
    assert_eq!(back, snapshot);
}

#[test]
fn test_field_names_are_stable() {
    let json = sample().to_json().unwrap();
    for field in [
        "\"id\"",
        "\"manifestList\"",
        "\"commitUser\"",
        "\"commitIdentifier\"",
        "\"commitKind\"",
        "\"timeMillis\"",
    ] {
        assert!(json.contains(field), "missing {field} in {json}");
    }
    assert!(json.contains("\"APPEND\""));
}

#[test]
fn test_field_order_does_not_matter() {
    let json = r#"
        {
            "timeMillis": 99,
            "commitKind": "COMPACT",
            "commitIdentifier": "c-1",
            "commitUser": "u",
            "manifestList": "m",
            "id": 7
        }
    "#;
    let snapshot = Snapshot::from_json(json).unwrap();
    assert_eq!(snapshot.id, 7);
    assert_eq!(snapshot.commit_kind, CommitKind::Compact);
}

#[test]
fn test_unknown_fields_ignored() {
    let json = r#"
        {
            "id": 1,
            "manifestList": "m",
            "commitUser": "u",
            "commitIdentifier": "c",
            "commitKind": "APPEND",
            "timeMillis": 0,
            "baseRecordCount": 123,
            "watermark": null
        }
    "#;
    let snapshot = Snapshot::from_json(json).unwrap();
    assert_eq!(snapshot.id, 1);
}

#[test]
fn test_unknown_commit_kind_rejected() {
    let json = r#"
        {
            "id": 1,
            "manifestList": "m",
            "commitUser": "u",
            "commitIdentifier": "c",
            "commitKind": "TRUNCATE",
            "timeMillis": 0
        }
    "#;
    assert!(Snapshot::from_json(json).is_err());
}

#[test]
fn test_missing_required_field_rejected() {
    let json = r#"{ "id": 1, "manifestList": "m" }"#;
    assert!(Snapshot::from_json(json).is_err());
}
