//! DTOs carried by [`crate::Request`]/[`crate::Response`].
//!
//! Deliberately decoupled from `loom-storage`'s persisted record shapes:
//! the wire crate only depends on `loom-core` for ids and enums, and
//! defines its own `*Summary`/`*Detail` structs rather than re-exporting
//! internal storage types.

use loom_core::{GitStatus, SessionId, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One workspace as presented to a client, without its sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceSummary {
    pub id: WorkspaceId,
    pub repo_url: String,
    pub branch: String,
    pub path: PathBuf,
    pub status: GitStatus,
}

/// One attached session as presented to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub workspace_id: WorkspaceId,
    pub target: String,
    #[serde(default)]
    pub nickname: Option<String>,
    pub created_at_ms: u64,
    #[serde(default)]
    pub last_output_at_ms: u64,
    #[serde(default)]
    pub last_classification: Option<String>,
}

/// A workspace with its attached sessions, for `GET /api/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceGroup {
    pub workspace: WorkspaceSummary,
    pub sessions: Vec<SessionSummary>,
}

/// Per-session outcome of a `POST /api/spawn` call — one entry per
/// `(target, replica)` pair requested in `targets`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionResult {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a `POST /api/workspaces/scan` reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanReport {
    pub added: Vec<WorkspaceId>,
    pub updated: Vec<WorkspaceId>,
    pub removed: Vec<WorkspaceId>,
}

/// How a single file differs from the default branch (`GET /api/diff/{id}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffFileStatus {
    Modified,
    Added,
    Deleted,
    Renamed,
    Untracked,
}

/// One file's diff entry, including untracked files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffEntry {
    pub path: String,
    pub status: DiffFileStatus,
    pub additions: u32,
    pub deletions: u32,
    /// Unified diff text; empty for untracked files (no prior content to
    /// diff against).
    #[serde(default)]
    pub patch: String,
}

/// One repo's overlay file count, for `GET /api/overlays`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverlaySummary {
    pub repo_name: String,
    pub file_count: u32,
}

/// Partial update to [`loom_core::Config`] (`POST|PUT /api/config`). Every
/// field is optional; only present fields are applied, the rest keep their
/// current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_status_watch_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_status_watch_debounce_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime_poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_status_poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_clone_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_status_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_query_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_operation_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolve_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolve_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudgenik_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_access: Option<bool>,
}

impl ConfigPatch {
    /// Applies every present field onto `config`, leaving absent fields
    /// untouched, and reports whether any applied field requires a daemon
    /// restart to take effect (the poll-cadence and watch-enable knobs are
    /// read once at watcher startup).
    pub fn apply(&self, config: &mut loom_core::Config) -> bool {
        let mut needs_restart = false;
        if let Some(v) = self.git_status_watch_enabled {
            config.git_status_watch_enabled = v;
            needs_restart = true;
        }
        if let Some(v) = self.git_status_watch_debounce_ms {
            config.git_status_watch_debounce_ms = v;
            needs_restart = true;
        }
        if let Some(v) = self.mtime_poll_interval_ms {
            config.mtime_poll_interval_ms = v;
            needs_restart = true;
        }
        if let Some(v) = self.sessions_poll_interval_ms {
            config.sessions_poll_interval_ms = v;
            needs_restart = true;
        }
        if let Some(v) = self.git_status_poll_interval_ms {
            config.git_status_poll_interval_ms = v;
            needs_restart = true;
        }
        if let Some(v) = self.git_clone_timeout_seconds {
            config.git_clone_timeout_seconds = v;
        }
        if let Some(v) = self.git_status_timeout_seconds {
            config.git_status_timeout_seconds = v;
        }
        if let Some(v) = self.tmux_query_timeout_seconds {
            config.tmux_query_timeout_seconds = v;
        }
        if let Some(v) = self.tmux_operation_timeout_seconds {
            config.tmux_operation_timeout_seconds = v;
        }
        if let Some(ref v) = self.conflict_resolve_target {
            config.conflict_resolve_target = v.clone();
        }
        if let Some(v) = self.conflict_resolve_timeout_ms {
            config.conflict_resolve_timeout_ms = v;
        }
        if let Some(ref v) = self.nudgenik_target {
            config.nudgenik_target = v.clone();
        }
        if let Some(v) = self.network_access {
            config.network_access = v;
        }
        needs_restart
    }
}

/// `targets:{name:qty}` from `POST /api/spawn` — a replica count per run
/// target name.
pub type SpawnTargets = BTreeMap<String, u32>;

/// Step of a Linear-Sync conflict loop, mirroring `loom_sync::ProgressStep`
/// as a wire-local type the same way
/// every other DTO here is decoupled from its owning crate's internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncProgressStep {
    CheckBehind,
    WipCommit,
    RebaseStart,
    ConflictDetected,
    LlmCall,
    RebaseContinue,
    WipUnwind,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncProgressStatus {
    InProgress,
    Done,
    Failed,
}

/// One entry in the progress stream a sync call accumulates and returns
/// alongside its result, since the control socket is request/response and
/// has no other way to carry a synchronous callback's output to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgressEntry {
    pub step: SyncProgressStep,
    pub status: SyncProgressStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

/// Outcome of `SyncFromDefault`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncFromDefaultResult {
    AlreadyCaughtUp,
    Synced { commits_applied: usize },
    ConflictAt { commits_applied: usize },
}

/// Outcome of `SyncToDefault`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncToDefaultResult {
    Refused { reason: String },
    Pushed,
}

/// One file's resolved content from a conflict-resolution pass, mirroring
/// `loom_sync::ConflictResolution`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionEntry {
    pub commit_hash: String,
    pub commit_subject: String,
    pub summary: String,
    pub files: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_applies_only_present_fields() {
        let mut config = loom_core::Config::default();
        let original_timeout = config.git_clone_timeout_seconds;
        let patch = ConfigPatch { network_access: Some(false), ..Default::default() };
        let needs_restart = patch.apply(&mut config);
        assert!(!config.network_access);
        assert_eq!(config.git_clone_timeout_seconds, original_timeout);
        assert!(!needs_restart);
    }

    #[test]
    fn patch_flags_restart_for_poll_cadence() {
        let mut config = loom_core::Config::default();
        let patch = ConfigPatch { mtime_poll_interval_ms: Some(5_000), ..Default::default() };
        assert!(patch.apply(&mut config));
        assert_eq!(config.mtime_poll_interval_ms, 5_000);
    }
}
