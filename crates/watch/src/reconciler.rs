//! Periodic reconciler.
//!
//! A single loop: one tick interval, and a predicate supplied by the owning
//! component — the Workspace Manager's "is this workspace's repo lock
//! currently held" check — gating which entities get touched on a given
//! tick.

use loom_git::GitRepo;
use loom_workspace::WorkspaceManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs `WorkspaceManager`'s periodic reconciliation tick until `shutdown`
/// fires: fetch every origin-query mirror, refresh the default-branch cache,
/// reload per-workspace config (logging only when the file mtime or
/// existence changes), and update git status for every workspace whose repo
/// lock is not currently held.
pub async fn run(manager: Arc<WorkspaceManager>, config_path: std::path::PathBuf, shutdown: CancellationToken) {
    let interval = Duration::from_millis(manager.config().git_status_poll_interval_ms);
    let mut last_config_mtime = config_mtime(&config_path).await;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => {
                tracing::info!("reconciler stopped");
                return;
            }
        }

        tick(&manager, &config_path, &mut last_config_mtime).await;
    }
}

async fn tick(
    manager: &Arc<WorkspaceManager>,
    config_path: &std::path::Path,
    last_config_mtime: &mut Option<std::time::SystemTime>,
) {
    let cancel = CancellationToken::new();
    let status_timeout = Duration::from_secs(manager.config().git_status_timeout_seconds);

    // Origin-query mirrors are fetched unconditionally, with no repo-lock
    // check: they are dedicated read-only mirrors `create`/`prepare` never
    // touch, not the shared worktree base those mutate under the repo lock.
    let repo_urls: Vec<String> = manager
        .store()
        .list_workspaces()
        .into_iter()
        .map(|ws| ws.repo_url)
        .filter(|url| !url.starts_with("local:"))
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();

    for repo_url in repo_urls {
        if let Err(e) = manager.refresh_query_mirror(&repo_url, &cancel).await {
            tracing::warn!(repo_url = %repo_url, error = %e, "query-mirror refresh failed");
        }
    }

    let current_mtime = config_mtime(config_path).await;
    if current_mtime != *last_config_mtime {
        tracing::info!(path = %config_path.display(), "config file changed, reload recommended");
        *last_config_mtime = current_mtime;
    }

    for ws in manager.store().list_workspaces() {
        if manager.is_repo_locked(&ws.repo_url) {
            continue;
        }
        let default_branch = manager.default_branch(&ws.repo_url, &cancel).await.ok().flatten();
        let repo = GitRepo::new(&ws.path, cancel.clone());
        let branch_for_status = default_branch.unwrap_or_else(|| ws.branch.clone());
        match loom_git::update_git_status(&repo, &branch_for_status, status_timeout).await {
            Ok(status) => {
                let _ = manager.store().update_workspace(ws.id.as_str(), |w| w.status = status);
            }
            Err(e) => {
                tracing::debug!(workspace = %ws.id, error = %e, "status refresh failed (workspace may be gone)");
            }
        }
    }
}

async fn config_mtime(path: &std::path::Path) -> Option<std::time::SystemTime> {
    tokio::fs::metadata(path).await.ok().and_then(|m| m.modified().ok())
}
