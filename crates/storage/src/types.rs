//! Persisted entity records.

use loom_core::{GitStatus, QuickLaunch, RunTarget, Variant, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One isolated working copy on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub repo_url: String,
    pub branch: String,
    pub path: PathBuf,
    #[serde(default)]
    pub status: GitStatus,
}

/// One attached interactive agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub workspace_id: WorkspaceId,
    pub target: String,
    pub mux_session_name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    pub created_at_ms: u64,
    #[serde(default)]
    pub last_output_at_ms: u64,
    #[serde(default)]
    pub last_classification: Option<String>,
}

/// A shared bare mirror backing many working copies for one repo URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeBase {
    pub repo_url: String,
    pub path: PathBuf,
}

/// A read-only bare mirror used only to answer "what branches exist on
/// origin" (branch listing, default-branch detection). Kept distinct from
/// `WorktreeBase` so the periodic reconciler's fetches never race the
/// worktree/branch mutations `WorkspaceManager::create` performs against the
/// worktree base under the repo lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMirror {
    pub repo_url: String,
    pub path: PathBuf,
}

/// The full persisted inventory the state store keeps in memory and on disk.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub workspaces: std::collections::HashMap<String, Workspace>,
    #[serde(default)]
    pub sessions: std::collections::HashMap<String, Session>,
    #[serde(default)]
    pub worktree_bases: std::collections::HashMap<String, WorktreeBase>,
    #[serde(default)]
    pub query_mirrors: std::collections::HashMap<String, QueryMirror>,
    #[serde(default)]
    pub run_targets: std::collections::HashMap<String, RunTarget>,
    #[serde(default)]
    pub quick_launches: std::collections::HashMap<String, QuickLaunch>,
    #[serde(default)]
    pub variants: std::collections::HashMap<String, Variant>,
    /// repo URL -> known default branch, or the `Unknown` sentinel.
    #[serde(default)]
    pub default_branch_cache: std::collections::HashMap<String, loom_core::BranchLookup>,
}
