use super::*;
use loom_core::WorkspaceId;
use std::collections::BTreeMap;

#[test]
fn spawn_request_round_trips_through_json() {
    let mut targets = BTreeMap::new();
    targets.insert("claude".to_string(), 2u32);

    let request = Request::Spawn {
        repo: Some("git@example.com:acme/repo.git".to_string()),
        branch: Some("main".to_string()),
        prompt: Some("fix the bug".to_string()),
        nickname: None,
        targets,
        workspace_id: Some(WorkspaceId::new("repo", 1)),
    };

    let json = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(back, request);
}

#[test]
fn tag_field_names_the_variant() {
    let json = serde_json::to_string(&Request::ListSessions).unwrap();
    assert!(json.contains("\"type\":\"ListSessions\""), "{json}");
}

#[test]
fn missing_targets_field_fails_to_deserialize() {
    let json = r#"{"type":"Spawn","prompt":"hi"}"#;
    assert!(serde_json::from_str::<Request>(json).is_err());
}

#[test]
fn sync_from_default_request_round_trips() {
    let request = Request::SyncFromDefault { workspace_id: WorkspaceId::new("repo", 1) };
    let json = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(back, request);
}
