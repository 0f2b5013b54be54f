//! The process-wide state store.
//!
//! A single `RwLock`-guarded in-memory inventory, serialized to a JSON file
//! after every mutation. A write-ahead log is not required here — the
//! persistence call happens inside the write lock, which is acceptable
//! given infrequent updates and local disk.

use crate::helpers::{find_by_prefix, lowest_unused};
use crate::types::{Inventory, QueryMirror, Session, WorktreeBase, Workspace};
use loom_core::{BranchLookup, QuickLaunch, RunTarget, Variant, WorkspaceId};
use parking_lot::RwLock;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file {path}: {source}")]
    Read { path: PathBuf, #[source] source: io::Error },

    #[error("failed to parse state file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },

    #[error("failed to persist state file {path}: {source}")]
    Write { path: PathBuf, #[source] source: io::Error },
}

/// In-memory inventory of workspaces, sessions, and shared bare repositories,
/// with durable JSON persistence.
pub struct StateStore {
    path: PathBuf,
    inner: RwLock<Inventory>,
}

impl StateStore {
    /// Load the store from `path`. A missing file is not an error (fresh
    /// install); a present-but-corrupt file is.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inventory = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|source| StoreError::Read { path: path.clone(), source })?;
            serde_json::from_str(&text)
                .map_err(|source| StoreError::Parse { path: path.clone(), source })?
        } else {
            Inventory::default()
        };
        Ok(Self { path, inner: RwLock::new(inventory) })
    }

    /// Write the current inventory to disk atomically (temp file + rename).
    fn persist_locked(&self, inventory: &Inventory) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(inventory)
            .expect("Inventory serialization is infallible for our field types");
        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| StoreError::Write { path: self.path.clone(), source })?;
        }
        std::fs::write(&tmp_path, text)
            .map_err(|source| StoreError::Write { path: tmp_path.clone(), source })?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|source| StoreError::Write { path: self.path.clone(), source })?;
        Ok(())
    }

    /// Run `mutate` against a clone of the inventory's relevant map, commit
    /// it and persist if `mutate` succeeds, and leave the in-memory state
    /// untouched if persistence fails — so a persist failure never leaves
    /// memory and disk disagreeing.
    fn mutate<T>(
        &self,
        mutate: impl FnOnce(&mut Inventory) -> T,
    ) -> Result<T, StoreError> {
        let mut guard = self.inner.write();
        let before = guard.clone();
        let result = mutate(&mut guard);
        if let Err(e) = self.persist_locked(&guard) {
            *guard = before;
            return Err(e);
        }
        Ok(result)
    }

    // ---- Workspaces ----

    pub fn list_workspaces(&self) -> Vec<Workspace> {
        self.inner.read().workspaces.values().cloned().collect()
    }

    pub fn get_workspace(&self, id: &str) -> Option<Workspace> {
        self.inner.read().workspaces.get(id).cloned()
    }

    pub fn find_workspace_by_prefix(&self, id: &str) -> Option<Workspace> {
        find_by_prefix(&self.inner.read().workspaces, id).cloned()
    }

    /// The lowest unused positive integer suffix for `repo_name`, considering
    /// only workspaces whose id parses as `<repo_name>-NNN`.
    pub fn next_workspace_suffix(&self, repo_name: &str) -> u32 {
        let guard = self.inner.read();
        let used: Vec<u32> = guard
            .workspaces
            .values()
            .filter_map(|w| {
                let suffix = w.id.suffix()?;
                (w.id.repo_name() == Some(repo_name)).then_some(suffix)
            })
            .collect();
        lowest_unused(used)
    }

    pub fn add_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        self.mutate(|inv| {
            inv.workspaces.insert(workspace.id.as_str().to_string(), workspace);
        })
    }

    pub fn update_workspace(
        &self,
        id: &str,
        update: impl FnOnce(&mut Workspace),
    ) -> Result<bool, StoreError> {
        self.mutate(|inv| {
            if let Some(ws) = inv.workspaces.get_mut(id) {
                update(ws);
                true
            } else {
                false
            }
        })
    }

    pub fn remove_workspace(&self, id: &str) -> Result<Option<Workspace>, StoreError> {
        self.mutate(|inv| inv.workspaces.remove(id))
    }

    // ---- Sessions ----

    pub fn list_sessions(&self) -> Vec<Session> {
        self.inner.read().sessions.values().cloned().collect()
    }

    pub fn sessions_for_workspace(&self, workspace_id: &WorkspaceId) -> Vec<Session> {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| &s.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.inner.read().sessions.get(id).cloned()
    }

    pub fn add_session(&self, session: Session) -> Result<(), StoreError> {
        self.mutate(|inv| {
            inv.sessions.insert(session.id.clone(), session);
        })
    }

    pub fn update_session(
        &self,
        id: &str,
        update: impl FnOnce(&mut Session),
    ) -> Result<bool, StoreError> {
        self.mutate(|inv| {
            if let Some(s) = inv.sessions.get_mut(id) {
                update(s);
                true
            } else {
                false
            }
        })
    }

    pub fn remove_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.mutate(|inv| inv.sessions.remove(id))
    }

    // ---- Worktree bases ----

    pub fn get_worktree_base(&self, repo_url: &str) -> Option<WorktreeBase> {
        self.inner.read().worktree_bases.get(repo_url).cloned()
    }

    pub fn add_worktree_base(&self, base: WorktreeBase) -> Result<(), StoreError> {
        self.mutate(|inv| {
            inv.worktree_bases.insert(base.repo_url.clone(), base);
        })
    }

    // ---- Origin-query mirrors ----

    pub fn get_query_mirror(&self, repo_url: &str) -> Option<QueryMirror> {
        self.inner.read().query_mirrors.get(repo_url).cloned()
    }

    pub fn add_query_mirror(&self, mirror: QueryMirror) -> Result<(), StoreError> {
        self.mutate(|inv| {
            inv.query_mirrors.insert(mirror.repo_url.clone(), mirror);
        })
    }

    // ---- Run targets / quick launches / variants ----

    pub fn list_run_targets(&self) -> Vec<RunTarget> {
        self.inner.read().run_targets.values().cloned().collect()
    }

    pub fn get_run_target(&self, name: &str) -> Option<RunTarget> {
        self.inner.read().run_targets.get(name).cloned()
    }

    pub fn add_run_target(&self, target: RunTarget) -> Result<(), StoreError> {
        self.mutate(|inv| {
            inv.run_targets.insert(target.name.clone(), target);
        })
    }

    pub fn list_quick_launches(&self) -> Vec<QuickLaunch> {
        self.inner.read().quick_launches.values().cloned().collect()
    }

    pub fn add_quick_launch(&self, ql: QuickLaunch) -> Result<(), StoreError> {
        self.mutate(|inv| {
            inv.quick_launches.insert(ql.name.clone(), ql);
        })
    }

    pub fn get_variant(&self, name: &str) -> Option<Variant> {
        self.inner.read().variants.get(name).cloned()
    }

    pub fn add_variant(&self, variant: Variant) -> Result<(), StoreError> {
        self.mutate(|inv| {
            inv.variants.insert(variant.name.clone(), variant);
        })
    }

    // ---- Default branch cache ----

    pub fn cached_default_branch(&self, repo_url: &str) -> Option<BranchLookup> {
        self.inner.read().default_branch_cache.get(repo_url).cloned()
    }

    pub fn cache_default_branch(
        &self,
        repo_url: &str,
        lookup: BranchLookup,
    ) -> Result<(), StoreError> {
        self.mutate(|inv| {
            inv.default_branch_cache.insert(repo_url.to_string(), lookup);
        })
    }

    /// Path of the backing JSON file, for diagnostics.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
