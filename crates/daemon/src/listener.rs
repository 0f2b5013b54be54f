//! Listener task for the Unix control socket.
//!
//! Per connection: read-request-with-timeout, race against disconnect
//! detection, write-response-with-timeout. Unix-domain only — nothing in
//! this system calls for a remote control plane.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use loom_core::WorkspaceId;
use loom_git::GitRepo;
use loom_storage::{Session as StoredSession, Workspace as StoredWorkspace};
use loom_sync::llm::CliLlmClient;
use loom_sync::progress::{ProgressEvent, ProgressStatus as DriverProgressStatus, ProgressStep as DriverProgressStep};
use loom_sync::{FromDefaultOutcome, SyncDriver, ToDefaultOutcome};
use loom_wire::{
    ConflictResolutionEntry, ConfigPatch, DiffEntry, DiffFileStatus, OverlaySummary, Request, Response,
    ScanReport, SessionResult, SessionSummary, SyncFromDefaultResult, SyncProgressEntry, SyncProgressStatus,
    SyncProgressStep, SyncToDefaultResult, WorkspaceGroup, WorkspaceSummary,
};
use loom_workspace::{SessionManager, WorkspaceManager};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::env::{ipc_timeout, PROTOCOL_VERSION};

/// One entry broadcast to every subscribed connection on a state change.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub workspace_id: Option<WorkspaceId>,
    pub reason: String,
}

/// Shared daemon context every request handler reads from.
pub struct ListenCtx {
    pub workspace_manager: Arc<WorkspaceManager>,
    pub session_manager: Arc<SessionManager>,
    pub config_path: PathBuf,
    pub start_time: Instant,
    pub shutdown: Arc<Notify>,
    pub changes: broadcast::Sender<ChangeEvent>,
}

pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] loom_wire::ProtocolError),
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    pub async fn run(self) {
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = handle_connection(reader, writer, &ctx).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("unix accept error: {e}"),
            }
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(loom_wire::ProtocolError::ConnectionClosed) => debug!("client disconnected"),
        ConnectionError::Protocol(loom_wire::ProtocolError::Timeout) => warn!("connection timeout"),
        other => error!("connection error: {other}"),
    }
}

async fn handle_connection<R, W>(mut reader: R, mut writer: W, ctx: &ListenCtx) -> Result<(), ConnectionError>
where
    R: AsyncRead + AsyncReadExt + Unpin + Send + 'static,
    W: AsyncWrite + AsyncWriteExt + Unpin + Send + 'static,
{
    let request = loom_wire::read_request(&mut reader, ipc_timeout()).await?;
    info!(request = ?request, "received request");

    // `Subscribe` upgrades the connection to a long-lived push stream — handled
    // before the normal one-shot request/response dispatch.
    if matches!(request, Request::Subscribe) {
        return handle_subscribe(writer, ctx).await;
    }

    let token = CancellationToken::new();
    let response = tokio::select! {
        result = handle_request(request, ctx, token.clone()) => result,
        _ = detect_client_disconnect(&mut reader) => {
            token.cancel();
            debug!("client disconnected, cancelling handler");
            return Ok(());
        }
    };

    loom_wire::write_response(&mut writer, &response, ipc_timeout()).await?;
    Ok(())
}

async fn handle_subscribe<W>(mut writer: W, ctx: &ListenCtx) -> Result<(), ConnectionError>
where
    W: AsyncWrite + AsyncWriteExt + Unpin + Send + 'static,
{
    loom_wire::write_response(&mut writer, &Response::Subscribed, ipc_timeout()).await?;
    let mut rx = ctx.changes.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let response = Response::Changed { workspace_id: event.workspace_id, reason: event.reason };
                if loom_wire::write_response(&mut writer, &response, ipc_timeout()).await.is_err() {
                    return Ok(());
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

async fn detect_client_disconnect<R: AsyncReadExt + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 1];
    let _ = reader.read(&mut buf).await;
}

async fn handle_request(request: Request, ctx: &ListenCtx, cancel: CancellationToken) -> Response {
    match dispatch(request, ctx, cancel).await {
        Ok(response) => response,
        Err(e) => error_response(e),
    }
}

async fn dispatch(
    request: Request,
    ctx: &ListenCtx,
    cancel: CancellationToken,
) -> Result<Response, loom_core::Error> {
    match request {
        Request::Ping => Ok(Response::Pong),

        Request::Hello { version: _ } => Ok(Response::Hello { version: PROTOCOL_VERSION.to_string() }),

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Ok(Response::ShuttingDown)
        }

        Request::ListSessions => Ok(Response::Sessions { workspaces: list_sessions(ctx) }),

        Request::ScanWorkspaces => Ok(Response::ScanResult(scan_workspaces(ctx).await)),

        Request::Spawn { repo, branch, prompt, nickname, targets, workspace_id } => {
            Ok(handle_spawn(ctx, repo, branch, prompt, nickname, targets, workspace_id, &cancel).await?)
        }

        Request::DisposeSession { session_id } => {
            let session = ctx
                .workspace_manager
                .store()
                .get_session(session_id.as_str())
                .ok_or_else(|| loom_core::Error::not_found("session", session_id.as_str()))?;
            ctx.session_manager.dispose(session_id.as_str()).await.map_err(loom_core::Error::from)?;
            broadcast_change(ctx, Some(session.workspace_id), "dispose-session");
            Ok(Response::Ok)
        }

        Request::DisposeWorkspace { workspace_id } => {
            ctx.workspace_manager.dispose(&workspace_id, &cancel).await.map_err(loom_core::Error::from)?;
            broadcast_change(ctx, Some(workspace_id), "dispose-workspace");
            Ok(Response::Ok)
        }

        Request::RenameSession { session_id, nickname } => {
            ctx.session_manager.rename(session_id.as_str(), &nickname).map_err(loom_core::Error::from)?;
            Ok(Response::Ok)
        }

        Request::GetConfig => Ok(Response::ConfigResult {
            config: ctx.workspace_manager.config().clone(),
            needs_restart: false,
            warning: None,
        }),

        Request::UpdateConfig { patch } => handle_update_config(ctx, patch).await,

        Request::GetDiff { workspace_id } => handle_get_diff(ctx, workspace_id).await,

        Request::RefreshOverlay { workspace_id } => {
            let ws = get_workspace(ctx, &workspace_id)?;
            let repo_name = ws.id.repo_name().unwrap_or(ws.id.as_str()).to_string();
            let timeout = status_timeout(ctx);
            loom_workspace::overlay::apply_overlay(&repo_name, &ws.path, timeout)
                .await
                .map_err(loom_core::Error::from)?;
            broadcast_change(ctx, Some(workspace_id), "refresh-overlay");
            Ok(Response::Ok)
        }

        Request::ListOverlays => {
            let overlays = loom_workspace::overlay::list_overlays()
                .await
                .map_err(|e| loom_core::Error::Transient(e.to_string()))?
                .into_iter()
                .map(|(repo_name, file_count)| OverlaySummary { repo_name, file_count })
                .collect();
            Ok(Response::Overlays { overlays })
        }

        Request::SyncFromDefault { workspace_id } => handle_sync_from_default(ctx, workspace_id, cancel).await,

        Request::SyncToDefault { workspace_id } => handle_sync_to_default(ctx, workspace_id, cancel).await,

        Request::ResolveConflict { workspace_id } => handle_resolve_conflict(ctx, workspace_id, cancel).await,

        Request::Healthz => {
            Ok(Response::Healthz { ok: true, uptime_secs: ctx.start_time.elapsed().as_secs() })
        }

        Request::Subscribe => unreachable!("intercepted in handle_connection"),
    }
}

fn get_workspace(ctx: &ListenCtx, id: &WorkspaceId) -> Result<StoredWorkspace, loom_core::Error> {
    ctx.workspace_manager
        .store()
        .get_workspace(id.as_str())
        .ok_or_else(|| loom_core::Error::not_found("workspace", id.as_str()))
}

fn status_timeout(ctx: &ListenCtx) -> Duration {
    Duration::from_secs(ctx.workspace_manager.config().git_status_timeout_seconds)
}

fn broadcast_change(ctx: &ListenCtx, workspace_id: Option<WorkspaceId>, reason: &str) {
    let _ = ctx.changes.send(ChangeEvent { workspace_id, reason: reason.to_string() });
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn to_workspace_summary(ws: &StoredWorkspace) -> WorkspaceSummary {
    WorkspaceSummary {
        id: ws.id.clone(),
        repo_url: ws.repo_url.clone(),
        branch: ws.branch.clone(),
        path: ws.path.clone(),
        status: ws.status.clone(),
    }
}

fn to_session_summary(session: &StoredSession) -> SessionSummary {
    SessionSummary {
        id: loom_core::SessionId::from_string(session.id.clone()),
        workspace_id: session.workspace_id.clone(),
        target: session.target.clone(),
        nickname: session.nickname.clone(),
        created_at_ms: session.created_at_ms,
        last_output_at_ms: session.last_output_at_ms,
        last_classification: session.last_classification.clone(),
    }
}

/// `GET /api/sessions`: every workspace grouped with its attached sessions.
fn list_sessions(ctx: &ListenCtx) -> Vec<WorkspaceGroup> {
    let store = ctx.workspace_manager.store();
    store
        .list_workspaces()
        .into_iter()
        .map(|ws| {
            let sessions = store.sessions_for_workspace(&ws.id).iter().map(to_session_summary).collect();
            WorkspaceGroup { workspace: to_workspace_summary(&ws), sessions }
        })
        .collect()
}

/// `POST /api/workspaces/scan`: diff the configured workspace root against
/// the store. Grounded in the periodic reconciler's own existence check
/// (`loom_watch::reconciler::tick` drops status for workspaces whose
/// directory is gone); this handler runs the equivalent check on demand and
/// also reports directories the store doesn't yet know about.
async fn scan_workspaces(ctx: &ListenCtx) -> ScanReport {
    let store = ctx.workspace_manager.store();
    let known = store.list_workspaces();

    let mut removed = Vec::new();
    for ws in &known {
        if !ws.path.exists() {
            if store.remove_workspace(ws.id.as_str()).is_ok() {
                removed.push(ws.id.clone());
            }
        }
    }

    let mut added = Vec::new();
    let workspace_root = &ctx.workspace_manager.config().workspace_path;
    if let Ok(mut entries) = tokio::fs::read_dir(workspace_root).await {
        let known_ids: std::collections::HashSet<String> =
            known.iter().map(|ws| ws.id.as_str().to_string()).collect();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else { continue };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !known_ids.contains(&name) {
                // An on-disk directory the store has no record of is surfaced
                // but not auto-adopted — its repo URL/branch can't be inferred
                // without a git remote round-trip the caller didn't ask for.
                added.push(WorkspaceId::from_string(name));
            }
        }
    }

    ScanReport { added, updated: Vec::new(), removed }
}

#[allow(clippy::too_many_arguments)]
async fn handle_spawn(
    ctx: &ListenCtx,
    repo: Option<String>,
    branch: Option<String>,
    prompt: Option<String>,
    nickname: Option<String>,
    targets: loom_wire::SpawnTargets,
    workspace_id: Option<WorkspaceId>,
    cancel: &CancellationToken,
) -> Result<Response, loom_core::Error> {
    let ws = match workspace_id {
        Some(id) => get_workspace(ctx, &id)?,
        None => {
            let repo = repo.ok_or_else(|| {
                loom_core::Error::Validation("repo is required when workspace_id is absent".to_string())
            })?;
            let branch = branch.ok_or_else(|| {
                loom_core::Error::Validation("branch is required when workspace_id is absent".to_string())
            })?;
            ctx.workspace_manager.get_or_create(&repo, &branch, cancel).await.map_err(loom_core::Error::from)?
        }
    };

    let now = now_ms();
    let mut results = Vec::new();
    for (target_name, qty) in &targets {
        let Some(target) = ctx.workspace_manager.store().get_run_target(target_name) else {
            results.push(SessionResult {
                target: target_name.clone(),
                session: None,
                error: Some(format!("unknown run target '{target_name}'")),
            });
            continue;
        };

        for _ in 0..*qty {
            let variant = ctx.workspace_manager.store().get_variant(target_name);
            match ctx
                .session_manager
                .spawn(&ws.id, &ws.path, &target, prompt.as_deref(), nickname.as_deref(), variant.as_ref(), now)
                .await
            {
                Ok(session) => {
                    results.push(SessionResult {
                        target: target_name.clone(),
                        session: Some(to_session_summary(&session)),
                        error: None,
                    });
                }
                Err(e) => {
                    results.push(SessionResult { target: target_name.clone(), session: None, error: Some(e.to_string()) });
                }
            }
        }
    }

    broadcast_change(ctx, Some(ws.id.clone()), "spawn");
    Ok(Response::SpawnResult { results })
}

async fn handle_update_config(ctx: &ListenCtx, patch: ConfigPatch) -> Result<Response, loom_core::Error> {
    let mut config = ctx.workspace_manager.config().clone();
    patch.apply(&mut config);

    let text = toml::to_string_pretty(&config)
        .map_err(|e| loom_core::Error::Invariant(format!("failed to serialize config: {e}")))?;
    if let Some(parent) = ctx.config_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| loom_core::Error::Transient(format!("failed to create config directory: {e}")))?;
    }
    tokio::fs::write(&ctx.config_path, text)
        .await
        .map_err(|e| loom_core::Error::Transient(format!("failed to write config: {e}")))?;

    // `WorkspaceManager`/`SessionManager` hold their own config snapshot from
    // construction time, so no in-process component observes this change
    // until loomd restarts and reloads it, regardless of which fields
    // `ConfigPatch::apply` itself considers restart-free.
    Ok(Response::ConfigResult {
        config,
        needs_restart: true,
        warning: Some("configuration saved; restart loomd to apply it".to_string()),
    })
}

async fn handle_get_diff(ctx: &ListenCtx, workspace_id: WorkspaceId) -> Result<Response, loom_core::Error> {
    let ws = get_workspace(ctx, &workspace_id)?;
    let repo = GitRepo::new(&ws.path, CancellationToken::new());
    let diffs = loom_git::diff_against_head(&repo, status_timeout(ctx))
        .await
        .map_err(|e| loom_core::Error::Transient(e.to_string()))?;
    let files = diffs
        .into_iter()
        .map(|d| DiffEntry {
            path: d.path,
            status: to_diff_file_status(d.status),
            additions: d.additions,
            deletions: d.deletions,
            patch: d.patch,
        })
        .collect();
    Ok(Response::Diff { files })
}

fn to_diff_file_status(status: loom_git::FileDiffStatus) -> DiffFileStatus {
    match status {
        loom_git::FileDiffStatus::Modified => DiffFileStatus::Modified,
        loom_git::FileDiffStatus::Added => DiffFileStatus::Added,
        loom_git::FileDiffStatus::Deleted => DiffFileStatus::Deleted,
        loom_git::FileDiffStatus::Renamed => DiffFileStatus::Renamed,
        loom_git::FileDiffStatus::Untracked => DiffFileStatus::Untracked,
    }
}

/// Common setup for every Linear-Sync request: the workspace's default
/// branch and a `SyncDriver` bound to `repo`/`ws`, both owned by the caller
/// for at least as long as the driver is used.
async fn prepare_sync<'a>(
    ctx: &ListenCtx,
    ws: &'a StoredWorkspace,
    repo: &'a GitRepo,
    cancel: CancellationToken,
) -> Result<(String, SyncDriver<'a>), loom_core::Error> {
    let default_branch = ctx
        .workspace_manager
        .default_branch(&ws.repo_url, &cancel)
        .await
        .map_err(loom_core::Error::from)?
        .ok_or_else(|| loom_core::Error::Invariant(format!("no known default branch for '{}'", ws.repo_url)))?;
    let driver = SyncDriver::new(repo, ws.id.as_str(), cancel);
    Ok((default_branch, driver))
}

async fn handle_sync_from_default(
    ctx: &ListenCtx,
    workspace_id: WorkspaceId,
    cancel: CancellationToken,
) -> Result<Response, loom_core::Error> {
    let ws = get_workspace(ctx, &workspace_id)?;
    let repo = GitRepo::new(&ws.path, cancel.clone());
    let (default_branch, driver) = prepare_sync(ctx, &ws, &repo, cancel).await?;

    let mut progress = Vec::new();
    let mut sink = |event: ProgressEvent| progress.push(to_wire_progress(event));
    let outcome = driver
        .sync_from_default(&default_branch, status_timeout(ctx), &mut sink)
        .await
        .map_err(|e| loom_core::Error::Transient(e.to_string()))?;

    broadcast_change(ctx, Some(workspace_id), "sync-from-default");
    Ok(Response::SyncFromDefaultResult { result: to_wire_from_default(outcome), progress })
}

async fn handle_sync_to_default(
    ctx: &ListenCtx,
    workspace_id: WorkspaceId,
    cancel: CancellationToken,
) -> Result<Response, loom_core::Error> {
    let ws = get_workspace(ctx, &workspace_id)?;
    let repo = GitRepo::new(&ws.path, cancel.clone());
    let (default_branch, driver) = prepare_sync(ctx, &ws, &repo, cancel).await?;

    let mut progress = Vec::new();
    let mut sink = |event: ProgressEvent| progress.push(to_wire_progress(event));
    let outcome = driver
        .sync_to_default(&default_branch, status_timeout(ctx), &mut sink)
        .await
        .map_err(|e| loom_core::Error::Transient(e.to_string()))?;

    broadcast_change(ctx, Some(workspace_id), "sync-to-default");
    Ok(Response::SyncToDefaultResult { result: to_wire_to_default(outcome), progress })
}

async fn handle_resolve_conflict(
    ctx: &ListenCtx,
    workspace_id: WorkspaceId,
    cancel: CancellationToken,
) -> Result<Response, loom_core::Error> {
    let ws = get_workspace(ctx, &workspace_id)?;
    let repo = GitRepo::new(&ws.path, cancel.clone());
    let (default_branch, driver) = prepare_sync(ctx, &ws, &repo, cancel).await?;

    let config = ctx.workspace_manager.config().clone();
    let llm = CliLlmClient::new(config.conflict_resolve_target.clone());
    let llm_timeout = Duration::from_millis(config.conflict_resolve_timeout_ms);
    let git_timeout = status_timeout(ctx);

    let mut progress = Vec::new();
    let mut sink = |event: ProgressEvent| progress.push(to_wire_progress(event));
    let outcome = driver
        .resolve_conflict(&default_branch, &ws.path, &llm, llm_timeout, git_timeout, &mut sink)
        .await
        .map_err(|e| loom_core::Error::Transient(e.to_string()))?;

    broadcast_change(ctx, Some(workspace_id), "resolve-conflict");
    Ok(Response::ResolveConflictResult {
        success: outcome.success,
        message: outcome.message,
        resolutions: outcome.resolutions.into_iter().map(to_wire_resolution).collect(),
        progress,
    })
}

fn to_wire_progress(event: ProgressEvent) -> SyncProgressEntry {
    SyncProgressEntry {
        step: match event.step {
            DriverProgressStep::CheckBehind => SyncProgressStep::CheckBehind,
            DriverProgressStep::WipCommit => SyncProgressStep::WipCommit,
            DriverProgressStep::RebaseStart => SyncProgressStep::RebaseStart,
            DriverProgressStep::ConflictDetected => SyncProgressStep::ConflictDetected,
            DriverProgressStep::LlmCall => SyncProgressStep::LlmCall,
            DriverProgressStep::RebaseContinue => SyncProgressStep::RebaseContinue,
            DriverProgressStep::WipUnwind => SyncProgressStep::WipUnwind,
            DriverProgressStep::Abort => SyncProgressStep::Abort,
        },
        status: match event.status {
            DriverProgressStatus::InProgress => SyncProgressStatus::InProgress,
            DriverProgressStatus::Done => SyncProgressStatus::Done,
            DriverProgressStatus::Failed => SyncProgressStatus::Failed,
        },
        message: event.message,
        context: event.context,
    }
}

fn to_wire_from_default(outcome: FromDefaultOutcome) -> SyncFromDefaultResult {
    match outcome {
        FromDefaultOutcome::AlreadyCaughtUp => SyncFromDefaultResult::AlreadyCaughtUp,
        FromDefaultOutcome::Synced { commits_applied } => SyncFromDefaultResult::Synced { commits_applied },
        FromDefaultOutcome::ConflictAt { commits_applied } => SyncFromDefaultResult::ConflictAt { commits_applied },
    }
}

fn to_wire_to_default(outcome: ToDefaultOutcome) -> SyncToDefaultResult {
    match outcome {
        ToDefaultOutcome::Refused(reason) => SyncToDefaultResult::Refused { reason },
        ToDefaultOutcome::Pushed => SyncToDefaultResult::Pushed,
    }
}

fn to_wire_resolution(resolution: loom_sync::ConflictResolution) -> ConflictResolutionEntry {
    ConflictResolutionEntry {
        commit_hash: resolution.commit_hash,
        commit_subject: resolution.commit_subject,
        summary: resolution.summary,
        files: resolution.files,
    }
}

/// Maps every [`loom_core::Error`] kind onto an HTTP status, for callers at
/// the (out-of-scope) HTTP layer to surface.
fn error_response(err: loom_core::Error) -> Response {
    let status = match &err {
        loom_core::Error::NotFound { .. } => 404,
        loom_core::Error::Validation(_) => 400,
        loom_core::Error::Conflict(_) => 409,
        loom_core::Error::Unsafe(_) => 409,
        loom_core::Error::Transient(_) => 503,
        loom_core::Error::Invariant(_) => 500,
        loom_core::Error::Cancelled => 499,
    };
    Response::Error { status, message: err.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let response = error_response(loom_core::Error::not_found("workspace", "repo-001"));
        match response {
            Response::Error { status, .. } => assert_eq!(status, 404),
            _ => panic!("expected Error response"),
        }
    }

    #[test]
    fn unsafe_maps_to_409() {
        let reasons = loom_core::SafetyReasons { modified_files: 1, untracked_files: 0, unpushed_commits: 0 };
        let response = error_response(loom_core::Error::Unsafe(reasons));
        match response {
            Response::Error { status, .. } => assert_eq!(status, 409),
            _ => panic!("expected Error response"),
        }
    }
}
