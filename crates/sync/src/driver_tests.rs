use super::*;
use crate::llm::LlmClient;
use async_trait::async_trait;
use std::path::Path;
use tempfile::tempdir;

const T: Duration = Duration::from_secs(10);

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

async fn seed_bare(root: &Path) -> String {
    let source_dir = root.join("source");
    let source = GitRepo::new(&source_dir, cancel());
    source.init_with_initial_commit("main", T).await.unwrap();
    tokio::fs::write(source_dir.join("shared.txt"), "base\n").await.unwrap();
    source.commit_all("seed shared.txt", T).await.unwrap();
    let bare_dir = root.join("origin.git");
    GitRepo::clone_repo(&source_dir.display().to_string(), &bare_dir, true, T, &cancel()).await.unwrap();
    bare_dir.display().to_string()
}

async fn clone_work(root: &Path, name: &str, bare_url: &str) -> GitRepo {
    let dir = root.join(name);
    GitRepo::clone_repo(bare_url, &dir, false, T, &cancel()).await.unwrap()
}

/// Clones a throwaway working copy, writes `content` to `file`, commits, and
/// pushes — simulating another client advancing the default branch.
async fn push_upstream_change(root: &Path, bare_url: &str, name: &str, file: &str, content: &str, message: &str) {
    let updater = clone_work(root, name, bare_url).await;
    tokio::fs::write(updater.dir().join(file), content).await.unwrap();
    updater.commit_all(message, T).await.unwrap();
    updater.push(None, T).await.unwrap();
}

#[tokio::test]
async fn from_default_already_caught_up() {
    let root = tempdir().unwrap();
    let bare_url = seed_bare(root.path()).await;
    let work = clone_work(root.path(), "work", &bare_url).await;

    let driver = SyncDriver::new(&work, "ns", cancel());
    let outcome = driver.sync_from_default("main", T, &mut |_| {}).await.unwrap();
    assert_eq!(outcome, FromDefaultOutcome::AlreadyCaughtUp);
}

#[tokio::test]
async fn from_default_applies_non_conflicting_commits() {
    let root = tempdir().unwrap();
    let bare_url = seed_bare(root.path()).await;
    let work = clone_work(root.path(), "work", &bare_url).await;
    push_upstream_change(root.path(), &bare_url, "updater1", "other.txt", "hello\n", "add other file").await;

    let driver = SyncDriver::new(&work, "ns", cancel());
    let mut events = Vec::new();
    let outcome = driver.sync_from_default("main", T, &mut |e| events.push(e)).await.unwrap();
    assert_eq!(outcome, FromDefaultOutcome::Synced { commits_applied: 1 });
    assert!(work.dir().join("other.txt").exists());
    assert!(events.iter().any(|e| e.step == ProgressStep::RebaseStart && e.status == ProgressStatus::Done));
}

#[tokio::test]
async fn from_default_stops_at_first_conflicting_commit() {
    let root = tempdir().unwrap();
    let bare_url = seed_bare(root.path()).await;
    let work = clone_work(root.path(), "work", &bare_url).await;

    tokio::fs::write(work.dir().join("shared.txt"), "local change\n").await.unwrap();
    work.commit_all("local edit", T).await.unwrap();

    push_upstream_change(root.path(), &bare_url, "updater1", "other.txt", "hello\n", "add other file").await;
    push_upstream_change(root.path(), &bare_url, "updater2", "shared.txt", "remote change\n", "edit shared").await;

    let driver = SyncDriver::new(&work, "ns", cancel());
    let outcome = driver.sync_from_default("main", T, &mut |_| {}).await.unwrap();
    assert_eq!(outcome, FromDefaultOutcome::ConflictAt { commits_applied: 1 });

    // Rebase was aborted and any WIP unwound; the working tree must be clean
    // and the local commit must still exist.
    let status = work.status_porcelain(T).await.unwrap();
    assert!(status.trim().is_empty());
    assert!(!work.rebase_in_progress().await);
}

#[tokio::test]
async fn to_default_refuses_when_dirty() {
    let root = tempdir().unwrap();
    let bare_url = seed_bare(root.path()).await;
    let work = clone_work(root.path(), "work", &bare_url).await;
    tokio::fs::write(work.dir().join("shared.txt"), "dirty\n").await.unwrap();

    let driver = SyncDriver::new(&work, "ns", cancel());
    let outcome = driver.sync_to_default("main", T, &mut |_| {}).await.unwrap();
    assert!(matches!(outcome, ToDefaultOutcome::Refused(_)));
}

#[tokio::test]
async fn to_default_refuses_when_not_ahead() {
    let root = tempdir().unwrap();
    let bare_url = seed_bare(root.path()).await;
    let work = clone_work(root.path(), "work", &bare_url).await;

    let driver = SyncDriver::new(&work, "ns", cancel());
    let outcome = driver.sync_to_default("main", T, &mut |_| {}).await.unwrap();
    assert!(matches!(outcome, ToDefaultOutcome::Refused(_)));
}

#[tokio::test]
async fn to_default_pushes_feature_branch_and_ff_merges() {
    let root = tempdir().unwrap();
    let bare_url = seed_bare(root.path()).await;
    let work = clone_work(root.path(), "work", &bare_url).await;

    work.create_branch_from_ref("feature", "HEAD", T).await.unwrap();
    work.checkout_branch("feature", T).await.unwrap();
    tokio::fs::write(work.dir().join("feature.txt"), "new\n").await.unwrap();
    work.commit_all("add feature file", T).await.unwrap();

    let driver = SyncDriver::new(&work, "ns", cancel());
    let outcome = driver.sync_to_default("main", T, &mut |_| {}).await.unwrap();
    assert_eq!(outcome, ToDefaultOutcome::Pushed);

    let bare = GitRepo::new(bare_url.as_str(), cancel());
    let bare_tip = bare.branch_tip("main", T).await.unwrap();
    let work_head = work.branch_tip("feature", T).await.unwrap();
    assert!(bare_tip.is_some());
    assert_eq!(bare_tip, work_head);
}

struct ResolvingClient;

#[async_trait]
impl LlmClient for ResolvingClient {
    async fn complete(
        &self,
        _prompt: &str,
        cwd: &Path,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> std::result::Result<String, crate::llm::LlmError> {
        tokio::fs::write(cwd.join("shared.txt"), "merged content\n").await.unwrap();
        Ok(r#"{"all_resolved":true,"confidence":"high","summary":"merged both changes","files":{"shared.txt":{"action":"modified","description":"merged local and remote edits"}}}"#.to_string())
    }
}

#[tokio::test]
async fn resolve_conflict_succeeds_with_llm_assist() {
    let root = tempdir().unwrap();
    let bare_url = seed_bare(root.path()).await;
    let work = clone_work(root.path(), "work", &bare_url).await;

    tokio::fs::write(work.dir().join("shared.txt"), "local change\n").await.unwrap();
    work.commit_all("local edit", T).await.unwrap();

    push_upstream_change(root.path(), &bare_url, "updater1", "shared.txt", "remote change\n", "edit shared").await;

    let driver = SyncDriver::new(&work, "ns", cancel());
    let llm = ResolvingClient;
    let mut events = Vec::new();
    let outcome = driver
        .resolve_conflict("main", work.dir(), &llm, T, T, &mut |e| events.push(e))
        .await
        .unwrap();

    assert!(outcome.success, "{:?}", outcome.message);
    assert_eq!(outcome.resolutions.len(), 1);
    assert_eq!(outcome.resolutions[0].commit_subject, "local edit");
    assert!(!work.rebase_in_progress().await);
    let content = tokio::fs::read_to_string(work.dir().join("shared.txt")).await.unwrap();
    assert_eq!(content, "merged content\n");
    assert!(events.iter().any(|e| e.step == ProgressStep::LlmCall && e.status == ProgressStatus::Done));
}

#[tokio::test]
async fn resolve_conflict_aborts_when_response_not_high_confidence() {
    struct LowConfidenceClient;

    #[async_trait]
    impl LlmClient for LowConfidenceClient {
        async fn complete(
            &self,
            _prompt: &str,
            cwd: &Path,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> std::result::Result<String, crate::llm::LlmError> {
            tokio::fs::write(cwd.join("shared.txt"), "merged content\n").await.unwrap();
            Ok(r#"{"all_resolved":true,"confidence":"medium","summary":"unsure","files":{"shared.txt":{"action":"modified","description":"maybe"}}}"#.to_string())
        }
    }

    let root = tempdir().unwrap();
    let bare_url = seed_bare(root.path()).await;
    let work = clone_work(root.path(), "work", &bare_url).await;

    tokio::fs::write(work.dir().join("shared.txt"), "local change\n").await.unwrap();
    work.commit_all("local edit", T).await.unwrap();
    push_upstream_change(root.path(), &bare_url, "updater1", "shared.txt", "remote change\n", "edit shared").await;

    let driver = SyncDriver::new(&work, "ns", cancel());
    let llm = LowConfidenceClient;
    let outcome = driver.resolve_conflict("main", work.dir(), &llm, T, T, &mut |_| {}).await.unwrap();

    assert!(!outcome.success);
    assert!(!work.rebase_in_progress().await);
    let status = work.status_porcelain(T).await.unwrap();
    assert!(status.trim().is_empty());
}
