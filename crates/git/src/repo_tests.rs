use super::*;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

async fn init_repo_with_commit(dir: &Path) -> GitRepo {
    let repo = GitRepo::new(dir, cancel());
    repo.init_with_initial_commit("main", Duration::from_secs(5)).await.unwrap();
    repo
}

#[tokio::test]
async fn init_creates_clean_repo_on_named_branch() {
    let dir = tempdir().unwrap();
    let repo = init_repo_with_commit(dir.path()).await;
    let status = repo.status_porcelain(Duration::from_secs(5)).await.unwrap();
    assert!(status.trim().is_empty());
    assert_eq!(repo.symbolic_ref_head(Duration::from_secs(5)).await.unwrap(), Some("main".to_string()));
}

#[tokio::test]
async fn dirty_working_tree_reports_in_porcelain() {
    let dir = tempdir().unwrap();
    let repo = init_repo_with_commit(dir.path()).await;
    tokio::fs::write(dir.path().join("a.txt"), "hello").await.unwrap();
    let status = repo.status_porcelain(Duration::from_secs(5)).await.unwrap();
    assert!(status.contains("a.txt"));
}

#[tokio::test]
async fn create_and_checkout_branch() {
    let dir = tempdir().unwrap();
    let repo = init_repo_with_commit(dir.path()).await;
    repo.create_branch_from_ref("feature", "HEAD", Duration::from_secs(5)).await.unwrap();
    assert!(repo.branch_exists("feature", Duration::from_secs(5)).await.unwrap());
    repo.checkout_branch("feature", Duration::from_secs(5)).await.unwrap();
    assert_eq!(repo.symbolic_ref_head(Duration::from_secs(5)).await.unwrap(), Some("feature".to_string()));
}

#[tokio::test]
async fn worktree_add_and_list_and_remove() {
    let base_dir = tempdir().unwrap();
    let base = init_repo_with_commit(base_dir.path()).await;
    let worktree_dir = tempdir().unwrap();
    let worktree_path = worktree_dir.path().join("wt");

    base.worktree_add(&worktree_path, "feature", "HEAD", Duration::from_secs(5)).await.unwrap();
    let worktrees = base.list_worktrees(Duration::from_secs(5)).await.unwrap();
    assert!(worktrees.iter().any(|(p, b)| p == &worktree_path && b.as_deref() == Some("feature")));

    let worktree_repo = GitRepo::new(&worktree_path, cancel());
    worktree_repo.worktree_remove(&worktree_path, Duration::from_secs(5)).await.unwrap();
    base.worktree_prune(Duration::from_secs(5)).await.unwrap();
    let worktrees_after = base.list_worktrees(Duration::from_secs(5)).await.unwrap();
    assert!(!worktrees_after.iter().any(|(p, _)| p == &worktree_path));
}

#[tokio::test]
async fn diff_numstat_counts_added_lines() {
    let dir = tempdir().unwrap();
    let repo = init_repo_with_commit(dir.path()).await;
    tokio::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").await.unwrap();
    repo.run_ok(&["add", "a.txt"], Duration::from_secs(5), "git add").await.unwrap();
    let (added, removed, files) = repo.diff_numstat(Duration::from_secs(5)).await.unwrap();
    assert_eq!(added, 3);
    assert_eq!(removed, 0);
    assert_eq!(files, 1);
}

#[tokio::test]
async fn check_ignore_reports_ignored_paths() {
    let dir = tempdir().unwrap();
    let repo = init_repo_with_commit(dir.path()).await;
    tokio::fs::write(dir.path().join(".gitignore"), "*.log\n").await.unwrap();
    assert!(repo.is_ignored("debug.log", Duration::from_secs(5)).await.unwrap());
    assert!(!repo.is_ignored("main.rs", Duration::from_secs(5)).await.unwrap());
}

#[tokio::test]
async fn commit_all_distinguishes_nothing_to_commit() {
    let dir = tempdir().unwrap();
    let repo = init_repo_with_commit(dir.path()).await;
    let committed = repo.commit_all("WIP: test", Duration::from_secs(5)).await.unwrap();
    assert!(!committed);

    tokio::fs::write(dir.path().join("b.txt"), "content").await.unwrap();
    let committed = repo.commit_all("WIP: test", Duration::from_secs(5)).await.unwrap();
    assert!(committed);
}

#[tokio::test]
async fn merge_base_and_is_ancestor() {
    let dir = tempdir().unwrap();
    let repo = init_repo_with_commit(dir.path()).await;
    repo.create_branch_from_ref("feature", "HEAD", Duration::from_secs(5)).await.unwrap();
    let base = repo.merge_base("main", "feature", Duration::from_secs(5)).await.unwrap();
    assert!(repo.is_ancestor(&base, "feature", Duration::from_secs(5)).await.unwrap());
}
