//! Responses the control socket sends back, mirroring
//! [`crate::Request`] one variant per route plus daemon-lifecycle replies.

use crate::types::{
    ConflictResolutionEntry, DiffEntry, OverlaySummary, ScanReport, SessionResult,
    SyncFromDefaultResult, SyncProgressEntry, SyncToDefaultResult, WorkspaceGroup,
};
use loom_core::Config;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
    Hello { version: String },
    ShuttingDown,

    /// `GET /api/sessions`.
    Sessions { workspaces: Vec<WorkspaceGroup> },

    /// `POST /api/workspaces/scan`.
    ScanResult(ScanReport),

    /// `POST /api/spawn` — one result per requested `(target, replica)`.
    SpawnResult { results: Vec<SessionResult> },

    /// Generic success (dispose, rename, refresh-overlay).
    Ok,

    /// `GET|POST|PUT /api/config`.
    ConfigResult {
        config: Config,
        #[serde(default)]
        needs_restart: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },

    /// `GET /api/diff/{workspaceId}`.
    Diff { files: Vec<DiffEntry> },

    /// `GET /api/overlays`.
    Overlays { overlays: Vec<OverlaySummary> },

    /// Reply to `SyncFromDefault`.
    SyncFromDefaultResult { result: SyncFromDefaultResult, progress: Vec<SyncProgressEntry> },

    /// Reply to `SyncToDefault`.
    SyncToDefaultResult { result: SyncToDefaultResult, progress: Vec<SyncProgressEntry> },

    /// Reply to `ResolveConflict`.
    ResolveConflictResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        resolutions: Vec<ConflictResolutionEntry>,
        progress: Vec<SyncProgressEntry>,
    },

    /// `GET /api/healthz`.
    Healthz { ok: bool, uptime_secs: u64 },

    /// Connection is now subscribed to the change-broadcast channel
    /// (stands in for a websocket upgrade).
    Subscribed,

    /// A change-broadcast event pushed to a subscribed connection.
    Changed { workspace_id: Option<loom_core::WorkspaceId>, reason: String },

    /// Any of `loom_core::Error`'s kinds, with the HTTP status a caller at
    /// the (out-of-scope) HTTP layer should map this onto.
    Error { status: u16, message: String },
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
