//! Workspace Manager: allocation, prepare, dispose.

use crate::error::{Result, WorkspaceError};
use crate::repo_lock::RepoLockMap;
use loom_core::{BranchLookup, Config, GitStatus, SourceCodeManagement, WorkspaceId};
use loom_git::repo::GitRepo;
use loom_storage::{QueryMirror, StateStore, WorktreeBase, Workspace as StoredWorkspace};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BRANCH_SUFFIX_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const MAX_BRANCH_SUFFIX_ATTEMPTS: u32 = 10;

/// Owns repo-URL locking and orchestrates workspace allocation, prepare, and
/// disposal over the state store and the git repository layer.
pub struct WorkspaceManager {
    store: Arc<StateStore>,
    config: Config,
    repo_locks: RepoLockMap,
}

impl WorkspaceManager {
    pub fn new(store: Arc<StateStore>, config: Config) -> Self {
        Self { store, config, repo_locks: RepoLockMap::new() }
    }

    fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.config.git_status_timeout_seconds)
    }

    fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.config.git_clone_timeout_seconds)
    }

    /// `GetOrCreate(repoURL, branch)`.
    pub async fn get_or_create(
        &self,
        repo_url: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredWorkspace> {
        loom_core::validate_branch_name(branch).map_err(loom_core::Error::Validation)?;
        let _guard = self.repo_locks.acquire(repo_url).await;

        if let Some(local_name) = repo_url.strip_prefix("local:") {
            return self.create_local(local_name, branch, cancel).await;
        }

        // Step 2: reuse a workspace on the same (url, branch) with no active sessions.
        if let Some(ws) = self.find_reusable(repo_url, Some(branch)) {
            self.prepare(&ws.id, cancel).await?;
            return Ok(self.store.get_workspace(ws.id.as_str()).ok_or_else(|| {
                WorkspaceError::NotFound(ws.id.as_str().to_string())
            })?);
        }

        // Step 3: reuse any workspace on the same url, switching its branch.
        if let Some(ws) = self.find_reusable(repo_url, None) {
            self.store.update_workspace(ws.id.as_str(), |w| w.branch = branch.to_string())?;
            self.prepare(&ws.id, cancel).await?;
            return Ok(self.store.get_workspace(ws.id.as_str()).ok_or_else(|| {
                WorkspaceError::NotFound(ws.id.as_str().to_string())
            })?);
        }

        // Step 4: create new, then prepare.
        let ws = self.create(repo_url, branch, cancel).await?;
        self.prepare(&ws.id, cancel).await?;
        Ok(self.store.get_workspace(ws.id.as_str()).ok_or_else(|| {
            WorkspaceError::NotFound(ws.id.as_str().to_string())
        })?)
    }

    fn find_reusable(&self, repo_url: &str, branch: Option<&str>) -> Option<StoredWorkspace> {
        self.store.list_workspaces().into_iter().find(|ws| {
            ws.repo_url == repo_url
                && branch.map(|b| ws.branch == b).unwrap_or(true)
                && ws.path.exists()
                && self.store.sessions_for_workspace(&ws.id).is_empty()
        })
    }

    async fn create_local(
        &self,
        local_name: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredWorkspace> {
        let suffix = self.store.next_workspace_suffix(local_name);
        let id = WorkspaceId::new(local_name, suffix);
        let path = self.config.workspace_path.join(id.as_str());

        let repo = GitRepo::new(&path, cancel.clone());
        repo.init_with_initial_commit(branch, self.status_timeout()).await?;

        let workspace = StoredWorkspace {
            id: id.clone(),
            repo_url: format!("local:{local_name}"),
            branch: branch.to_string(),
            path,
            status: GitStatus::default(),
        };
        self.store.add_workspace(workspace.clone())?;
        Ok(workspace)
    }

    /// `Create`. Materializes either a lightweight working tree against the
    /// shared worktree base, or a full clone, per `Config.source_code_management`.
    pub async fn create(
        &self,
        repo_url: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredWorkspace> {
        let repo_name = derive_repo_name(repo_url);
        let suffix = self.store.next_workspace_suffix(&repo_name);
        let id = WorkspaceId::new(&repo_name, suffix);
        let path = self.config.workspace_path.join(id.as_str());

        let workspace = match self.config.source_code_management {
            SourceCodeManagement::Worktrees => {
                self.create_worktree(&id, &path, repo_url, &repo_name, branch, cancel).await?
            }
            SourceCodeManagement::Git => {
                self.create_full_clone(&id, &path, repo_url, &repo_name, branch, cancel).await?
            }
        };

        if let Err(e) = self.store.add_workspace(workspace.clone()) {
            self.unwind_create(repo_url, &path, &workspace.branch, cancel).await;
            return Err(e.into());
        }

        Ok(workspace)
    }

    async fn create_worktree(
        &self,
        id: &WorkspaceId,
        path: &std::path::Path,
        repo_url: &str,
        repo_name: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredWorkspace> {
        let base = self.ensure_worktree_base(repo_url, repo_name, cancel).await?;
        let base_repo = GitRepo::new(&base.path, cancel.clone());
        base_repo.fetch(self.clone_timeout()).await?;

        let final_branch = self.ensure_unique_branch(&base_repo, branch).await?;

        let start_point = base_repo
            .branch_tip(&final_branch, self.status_timeout())
            .await?
            .unwrap_or_else(|| "HEAD".to_string());

        base_repo.worktree_add(path, &final_branch, &start_point, self.clone_timeout()).await?;

        if let Err(e) = self.copy_overlay(repo_name, path).await {
            tracing::warn!(repo_name = %repo_name, error = %e, "overlay copy failed during create");
        }

        Ok(StoredWorkspace {
            id: id.clone(),
            repo_url: repo_url.to_string(),
            branch: final_branch,
            path: path.to_path_buf(),
            status: GitStatus::default(),
        })
    }

    /// Full-clone path for `SourceCodeManagement::Git`: an independent
    /// non-bare clone per workspace rather than a working tree against a
    /// shared base, so no worktree-base lock or branch-uniqueness search
    /// applies — each clone owns its own `refs/heads/<branch>`.
    async fn create_full_clone(
        &self,
        id: &WorkspaceId,
        path: &std::path::Path,
        repo_url: &str,
        repo_name: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredWorkspace> {
        let repo = GitRepo::clone_repo(repo_url, path, false, self.clone_timeout(), cancel).await?;

        let has_origin_branch = repo.remote_branch_exists(branch, self.status_timeout()).await.unwrap_or(false);
        if !repo.branch_exists(branch, self.status_timeout()).await.unwrap_or(false) {
            let start_point = if has_origin_branch { format!("origin/{branch}") } else { "HEAD".to_string() };
            repo.create_branch_from_ref(branch, &start_point, self.status_timeout()).await?;
        }
        repo.checkout_branch(branch, self.status_timeout()).await?;

        if let Err(e) = self.copy_overlay(repo_name, path).await {
            tracing::warn!(repo_name = %repo_name, error = %e, "overlay copy failed during create");
        }

        Ok(StoredWorkspace {
            id: id.clone(),
            repo_url: repo_url.to_string(),
            branch: branch.to_string(),
            path: path.to_path_buf(),
            status: GitStatus::default(),
        })
    }

    /// Undo whatever `create_worktree`/`create_full_clone` materialized,
    /// after the subsequent `add_workspace` persistence call failed.
    async fn unwind_create(
        &self,
        repo_url: &str,
        path: &std::path::Path,
        branch: &str,
        cancel: &CancellationToken,
    ) {
        match self.config.source_code_management {
            SourceCodeManagement::Worktrees => {
                if let Some(base) = self.store.get_worktree_base(repo_url) {
                    let base_repo = GitRepo::new(&base.path, cancel.clone());
                    let _ = base_repo.worktree_remove(path, self.clone_timeout()).await;
                    let _ = base_repo.delete_branch(branch, self.status_timeout()).await;
                }
            }
            SourceCodeManagement::Git => {
                let _ = tokio::fs::remove_dir_all(path).await;
            }
        }
    }

    async fn ensure_worktree_base(
        &self,
        repo_url: &str,
        repo_name: &str,
        cancel: &CancellationToken,
    ) -> Result<WorktreeBase> {
        if let Some(base) = self.store.get_worktree_base(repo_url) {
            return Ok(base);
        }
        let path = self.config.worktree_base_path.join(repo_name);
        let clone_result = GitRepo::clone_repo(repo_url, &path, true, self.clone_timeout(), cancel).await;
        match clone_result {
            Ok(_) => {}
            Err(e) => {
                // Tolerate "already exists" under concurrent creation by another process.
                if !path.join("HEAD").exists() {
                    return Err(e.into());
                }
            }
        }
        let base = WorktreeBase { repo_url: repo_url.to_string(), path };
        self.store.add_worktree_base(base.clone())?;
        Ok(base)
    }

    /// If `branch` is already checked out by another worktree of `base`,
    /// generate `<branch>-<3-char-suffix>` candidates (seeded from the
    /// branch's current tip) until one is free, up to ten attempts.
    async fn ensure_unique_branch(&self, base_repo: &GitRepo, branch: &str) -> Result<String> {
        let worktrees = base_repo.list_worktrees(self.status_timeout()).await?;
        let in_use = |candidate: &str| worktrees.iter().any(|(_, b)| b.as_deref() == Some(candidate));

        if !in_use(branch) {
            return Ok(branch.to_string());
        }

        let tip = base_repo
            .branch_tip(branch, self.status_timeout())
            .await?
            .ok_or_else(|| loom_core::Error::Validation(format!("branch '{branch}' has no tip")))?;

        for _ in 0..MAX_BRANCH_SUFFIX_ATTEMPTS {
            let candidate = format!("{branch}-{}", random_suffix());
            if in_use(&candidate) {
                continue;
            }
            base_repo.create_branch_from_ref(&candidate, &tip, self.status_timeout()).await?;
            return Ok(candidate);
        }

        Err(loom_core::Error::Conflict(format!(
            "could not find a unique branch name for '{branch}' after {MAX_BRANCH_SUFFIX_ATTEMPTS} attempts"
        ))
        .into())
    }

    async fn copy_overlay(&self, repo_name: &str, workspace_path: &std::path::Path) -> Result<()> {
        crate::overlay::apply_overlay(repo_name, workspace_path, self.status_timeout()).await
    }

    /// `Prepare`.
    pub async fn prepare(&self, id: &WorkspaceId, cancel: &CancellationToken) -> Result<()> {
        let ws =
            self.store.get_workspace(id.as_str()).ok_or_else(|| WorkspaceError::NotFound(id.to_string()))?;

        if !self.store.sessions_for_workspace(id).is_empty() {
            return Err(WorkspaceError::HasActiveSessions(id.to_string()));
        }

        let repo = GitRepo::new(&ws.path, cancel.clone());
        repo.fetch(self.clone_timeout()).await?;
        let has_origin = repo.remote_branch_exists(&ws.branch, self.status_timeout()).await.unwrap_or(false);

        repo.discard_local_changes(self.status_timeout()).await?;

        if has_origin {
            let origin_ref = format!("origin/{}", ws.branch);
            repo.checkout_reset_to_ref(&origin_ref, self.status_timeout()).await?;
        } else if !repo.branch_exists(&ws.branch, self.status_timeout()).await? {
            repo.create_branch_from_ref(&ws.branch, "HEAD", self.status_timeout()).await?;
            repo.checkout_branch(&ws.branch, self.status_timeout()).await?;
        }

        if has_origin {
            let origin_ref = format!("origin/{}", ws.branch);
            repo.rebase_onto(&origin_ref, self.status_timeout()).await?;
        }

        Ok(())
    }

    /// `Dispose`.
    pub async fn dispose(&self, id: &WorkspaceId, cancel: &CancellationToken) -> Result<()> {
        let ws =
            self.store.get_workspace(id.as_str()).ok_or_else(|| WorkspaceError::NotFound(id.to_string()))?;
        let _guard = self.repo_locks.acquire(&ws.repo_url).await;

        if !self.store.sessions_for_workspace(id).is_empty() {
            return Err(WorkspaceError::HasActiveSessions(id.to_string()));
        }

        if ws.path.exists() {
            let default_branch = self.default_branch(&ws.repo_url, cancel).await.unwrap_or(None);
            let repo = GitRepo::new(&ws.path, cancel.clone());
            let reasons =
                loom_git::git_safety(&repo, default_branch.as_deref().unwrap_or(&ws.branch), self.status_timeout())
                    .await?;
            if !reasons.is_safe() {
                return Err(WorkspaceError::Unsafe(id.to_string(), reasons));
            }

            let is_worktree = tokio::fs::symlink_metadata(ws.path.join(".git"))
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);

            if is_worktree {
                repo.worktree_remove(&ws.path, self.clone_timeout()).await?;
                if let Some(base) = self.store.get_worktree_base(&ws.repo_url) {
                    let base_repo = GitRepo::new(&base.path, cancel.clone());
                    let _ = base_repo.worktree_prune(self.status_timeout()).await;
                }
            } else if let Err(e) = tokio::fs::remove_dir_all(&ws.path).await {
                tracing::warn!(workspace = %id, error = %e, "failed to remove workspace directory");
            }
        }

        self.store.remove_workspace(id.as_str())?;
        Ok(())
    }

    /// Default-branch cache lookup/refresh, detected via the origin-query
    /// mirror (never the worktree base, so this never races `create`'s
    /// worktree/branch mutations against the base).
    pub async fn default_branch(
        &self,
        repo_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        if let Some(cached) = self.store.cached_default_branch(repo_url) {
            return Ok(cached.as_branch().map(str::to_string));
        }
        if repo_url.starts_with("local:") {
            return Ok(None);
        }

        let repo_name = derive_repo_name(repo_url);
        let mirror = self.ensure_query_mirror(repo_url, &repo_name, cancel).await?;
        let mirror_repo = GitRepo::new(&mirror.path, cancel.clone());
        let lookup = loom_git::detect_default_branch(&mirror_repo, self.status_timeout()).await?;
        self.store.cache_default_branch(repo_url, lookup.clone())?;
        Ok(lookup.as_branch().map(str::to_string))
    }

    pub fn refresh_default_branch_cache_sync(&self, repo_url: &str, lookup: BranchLookup) -> Result<()> {
        self.store.cache_default_branch(repo_url, lookup)?;
        Ok(())
    }

    async fn ensure_query_mirror(
        &self,
        repo_url: &str,
        repo_name: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryMirror> {
        if let Some(mirror) = self.store.get_query_mirror(repo_url) {
            return Ok(mirror);
        }
        let path = self.config.query_repo_path.join(repo_name);
        let clone_result = GitRepo::clone_repo(repo_url, &path, true, self.clone_timeout(), cancel).await;
        match clone_result {
            Ok(_) => {}
            Err(e) => {
                // Tolerate "already exists" under concurrent creation by another process.
                if !path.join("HEAD").exists() {
                    return Err(e.into());
                }
            }
        }
        let mirror = QueryMirror { repo_url: repo_url.to_string(), path };
        self.store.add_query_mirror(mirror.clone())?;
        Ok(mirror)
    }

    /// Fetch the origin-query mirror for `repo_url` (creating it first if
    /// absent) and refresh the default-branch cache from it. This is the
    /// call the periodic reconciler makes on every tick; it never touches
    /// the worktree base or takes a repo lock, so it cannot race `create`'s
    /// worktree/branch mutations.
    pub async fn refresh_query_mirror(&self, repo_url: &str, cancel: &CancellationToken) -> Result<()> {
        let repo_name = derive_repo_name(repo_url);
        let mirror = self.ensure_query_mirror(repo_url, &repo_name, cancel).await?;
        let mirror_repo = GitRepo::new(&mirror.path, cancel.clone());
        mirror_repo.fetch(self.clone_timeout()).await?;
        let lookup = loom_git::detect_default_branch(&mirror_repo, self.status_timeout()).await?;
        self.store.cache_default_branch(repo_url, lookup)?;
        Ok(())
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a mutating operation currently holds `repo_url`'s lock — the
    /// predicate the periodic reconciler uses to skip in-flight workspaces.
    pub fn is_repo_locked(&self, repo_url: &str) -> bool {
        self.repo_locks.is_locked(repo_url)
    }
}

fn random_suffix() -> String {
    nanoid::nanoid!(3, &BRANCH_SUFFIX_ALPHABET)
}

/// The bare mirror directory name and workspace-id prefix for a repo URL:
/// the final path segment with a trailing `.git` stripped.
fn derive_repo_name(repo_url: &str) -> String {
    let trimmed = repo_url.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
