use super::*;
use loom_core::Config;
use loom_storage::StateStore;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn test_config(root: &std::path::Path) -> Config {
    Config {
        workspace_path: root.join("workspaces"),
        worktree_base_path: root.join("repos"),
        query_repo_path: root.join("query"),
        ..Config::default()
    }
}

async fn bare_origin(dir: &std::path::Path) -> std::path::PathBuf {
    let work = dir.join("origin-work");
    let repo = GitRepo::new(&work, CancellationToken::new());
    repo.init_with_initial_commit("main", Duration::from_secs(5)).await.unwrap();

    let bare = dir.join("origin.git");
    GitRepo::clone_repo(
        work.to_str().unwrap(),
        &bare,
        true,
        Duration::from_secs(5),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    bare
}

#[tokio::test]
async fn get_or_create_local_repo_creates_fresh_workspace() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let manager = WorkspaceManager::new(store, test_config(dir.path()));

    let ws = manager.get_or_create("local:scratch", "agent/task", &CancellationToken::new()).await.unwrap();
    assert_eq!(ws.branch, "agent/task");
    assert!(ws.path.exists());
    assert_eq!(ws.id.repo_name(), Some("scratch"));
}

#[tokio::test]
async fn get_or_create_reuses_idle_workspace_on_same_branch() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let manager = WorkspaceManager::new(store, test_config(dir.path()));

    let first = manager.get_or_create("local:scratch", "agent/task", &CancellationToken::new()).await.unwrap();
    let second = manager.get_or_create("local:scratch", "agent/task", &CancellationToken::new()).await.unwrap();

    // Local repos always create new; non-local repos would reuse an idle one.
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn create_from_remote_origin_materializes_worktree() {
    let dir = tempdir().unwrap();
    let origin = bare_origin(dir.path()).await;
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let manager = WorkspaceManager::new(store, test_config(dir.path()));

    let url = origin.to_str().unwrap();
    let ws = manager.create(url, "main", &CancellationToken::new()).await.unwrap();
    assert!(ws.path.join(".git").exists());
    assert_eq!(ws.branch, "main");
}

#[tokio::test]
async fn create_with_git_source_control_management_materializes_full_clone() {
    let dir = tempdir().unwrap();
    let origin = bare_origin(dir.path()).await;
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let config =
        Config { source_code_management: loom_core::SourceCodeManagement::Git, ..test_config(dir.path()) };
    let manager = WorkspaceManager::new(store, config);

    let url = origin.to_str().unwrap();
    let ws = manager.create(url, "main", &CancellationToken::new()).await.unwrap();

    assert_eq!(ws.branch, "main");
    assert!(ws.path.join(".git").is_dir(), "a full clone's .git is a directory, not a worktree's gitlink file");
    // No worktree base is ever created for the full-clone path.
    assert!(manager.store().get_worktree_base(url).is_none());
}

#[tokio::test]
async fn default_branch_uses_a_dedicated_query_mirror_not_the_worktree_base() {
    let dir = tempdir().unwrap();
    let origin = bare_origin(dir.path()).await;
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let manager = WorkspaceManager::new(store, test_config(dir.path()));

    let url = origin.to_str().unwrap();
    let default_branch = manager.default_branch(url, &CancellationToken::new()).await.unwrap();

    assert_eq!(default_branch.as_deref(), Some("main"));
    assert!(manager.store().get_query_mirror(url).is_some());
    assert!(manager.store().get_worktree_base(url).is_none());
}

#[tokio::test]
async fn dispose_refuses_when_sessions_active() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let manager = WorkspaceManager::new(store.clone(), test_config(dir.path()));

    let ws = manager.get_or_create("local:scratch", "agent/task", &CancellationToken::new()).await.unwrap();
    store
        .add_session(loom_storage::Session {
            id: "ses-1".to_string(),
            workspace_id: ws.id.clone(),
            target: "claude".to_string(),
            mux_session_name: "x".to_string(),
            nickname: None,
            created_at_ms: 0,
            last_output_at_ms: 0,
            last_classification: None,
        })
        .unwrap();

    let result = manager.dispose(&ws.id, &CancellationToken::new()).await;
    assert!(matches!(result, Err(WorkspaceError::HasActiveSessions(_))));
}

#[tokio::test]
async fn dispose_removes_clean_workspace() {
    let dir = tempdir().unwrap();
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let manager = WorkspaceManager::new(store.clone(), test_config(dir.path()));

    let ws = manager.get_or_create("local:scratch", "agent/task", &CancellationToken::new()).await.unwrap();
    manager.dispose(&ws.id, &CancellationToken::new()).await.unwrap();
    assert!(store.get_workspace(ws.id.as_str()).is_none());
    assert!(!ws.path.exists());
}

#[tokio::test]
async fn derive_repo_name_strips_git_suffix() {
    assert_eq!(derive_repo_name("git@example.com:acme/widget.git"), "widget");
    assert_eq!(derive_repo_name("https://example.com/acme/widget"), "widget");
}
