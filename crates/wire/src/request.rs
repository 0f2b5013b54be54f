//! Requests the control socket accepts, one variant per route plus the
//! daemon-lifecycle requests every protocol like this one carries alongside
//! its actual commands (`Ping`/`Hello`/`Shutdown`).

use crate::types::{ConfigPatch, SpawnTargets};
use loom_core::WorkspaceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Liveness probe over the control socket itself (distinct from
    /// `GET /api/healthz`, which also reports daemon-internal health).
    Ping,

    /// Version handshake, sent as the first request on a connection.
    Hello { version: String },

    /// Graceful shutdown.
    Shutdown,

    /// `GET /api/sessions` — workspaces grouped with their sessions.
    ListSessions,

    /// `POST /api/workspaces/scan` — reconcile state against the filesystem.
    ScanWorkspaces,

    /// `POST /api/spawn`.
    Spawn {
        #[serde(default)]
        repo: Option<String>,
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        nickname: Option<String>,
        targets: SpawnTargets,
        #[serde(default)]
        workspace_id: Option<WorkspaceId>,
    },

    /// `POST /api/dispose/{sessionId}`.
    DisposeSession { session_id: loom_core::SessionId },

    /// `POST /api/dispose-workspace/{id}`.
    DisposeWorkspace { workspace_id: WorkspaceId },

    /// `PUT|PATCH /api/sessions-nickname/{id}`.
    RenameSession { session_id: loom_core::SessionId, nickname: String },

    /// `GET /api/config`.
    GetConfig,

    /// `GET|POST|PUT /api/config` — read/update.
    UpdateConfig { patch: ConfigPatch },

    /// `GET /api/diff/{workspaceId}`.
    GetDiff { workspace_id: WorkspaceId },

    /// `POST /api/workspaces/{id}/refresh-overlay`.
    RefreshOverlay { workspace_id: WorkspaceId },

    /// `GET /api/overlays`.
    ListOverlays,

    /// Rebase a workspace's branch onto the latest default branch,
    /// running the conflict-resolution loop if it falls behind (spec
    /// §4.7 `LinearSyncFromDefault`).
    SyncFromDefault { workspace_id: WorkspaceId },

    /// Fast-forward-push a workspace's branch onto the default branch.
    SyncToDefault { workspace_id: WorkspaceId },

    /// Re-run the one-shot conflict resolver against a workspace already
    /// mid-rebase.
    ResolveConflict { workspace_id: WorkspaceId },

    /// `GET /api/healthz`.
    Healthz,

    /// `GET /ws` — upgrade to the push channel for change broadcasts.
    Subscribe,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
