//! Daemon startup/shutdown lifecycle.
//!
//! Lock-before-truncate via `fs2::FileExt::try_lock_exclusive`, write the
//! PID and version files, remove a stale socket, then bind last.
//! `loom-storage`'s `StateStore` persists directly on every mutation, so
//! there is no WAL to flush and no snapshot to take on shutdown.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use loom_core::{Config, ConfigError};
use loom_storage::{StateStore, StoreError};
use loom_workspace::SessionManager;
use thiserror::Error;

use crate::env;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine a state directory (HOME is unset)")]
    NoStateDir,

    #[error("another loomd instance holds the lock at {0}")]
    LockFailed(PathBuf),

    #[error("failed to bind the control socket at {path}: {source}")]
    BindFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolved filesystem layout for one daemon instance.
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub pid_path: PathBuf,
    pub version_path: PathBuf,
    pub state_path: PathBuf,
    pub log_path: PathBuf,
}

impl Paths {
    pub fn resolve() -> Result<Self, LifecycleError> {
        let state_dir = env::state_dir()?;
        Ok(Self {
            socket_path: state_dir.join("loom.sock"),
            lock_path: state_dir.join("loom.lock"),
            pid_path: state_dir.join("loom.pid"),
            version_path: state_dir.join("loom.version"),
            state_path: state_dir.join("state.json"),
            log_path: state_dir.join("loom.log"),
            state_dir,
        })
    }
}

/// Resources that must outlive the daemon's run loop. `lock_file` is held
/// only for its `Drop`-triggered unlock; nothing reads it after startup.
pub struct DaemonState {
    pub paths: Paths,
    pub config: Config,
    pub store: StateStore,
    #[allow(dead_code)]
    lock_file: File,
}

/// Runs the full startup sequence, tearing down anything already created
/// if a later step fails. A `LockFailed` error is never cleaned up after —
/// another live instance owns those files, so removing them would corrupt
/// its state.
pub fn startup(config_path: &Path) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config_path) {
        Ok(state) => Ok(state),
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure();
            Err(e)
        }
    }
}

fn startup_inner(config_path: &Path) -> Result<DaemonState, LifecycleError> {
    let paths = Paths::resolve()?;
    fs::create_dir_all(&paths.state_dir)
        .map_err(|source| LifecycleError::Io { path: paths.state_dir.clone(), source })?;

    // Lock before truncating anything, so a second instance fails here
    // rather than racing the first on the PID/version files below.
    let lock_file = File::create(&paths.lock_path)
        .map_err(|source| LifecycleError::Io { path: paths.lock_path.clone(), source })?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(paths.lock_path.clone()))?;

    fs::write(&paths.pid_path, std::process::id().to_string())
        .map_err(|source| LifecycleError::Io { path: paths.pid_path.clone(), source })?;
    fs::write(&paths.version_path, env::PROTOCOL_VERSION)
        .map_err(|source| LifecycleError::Io { path: paths.version_path.clone(), source })?;

    let config = Config::load_or_default(config_path)?;
    let store = StateStore::load(&paths.state_path)?;

    // Remove a stale socket from an unclean prior shutdown. Binding
    // happens in the listener, after every other step has succeeded.
    if paths.socket_path.exists() {
        fs::remove_file(&paths.socket_path)
            .map_err(|source| LifecycleError::Io { path: paths.socket_path.clone(), source })?;
    }

    Ok(DaemonState { paths, config, store, lock_file })
}

fn cleanup_on_failure() {
    if let Ok(paths) = Paths::resolve() {
        let _ = fs::remove_file(&paths.pid_path);
        let _ = fs::remove_file(&paths.version_path);
    }
}

/// Walks the persisted inventory against on-disk/tmux reality before the
/// daemon serves its first request: a workspace whose directory is gone, or
/// a session whose tmux pane is gone, is dropped from the state store rather
/// than left to linger until the periodic reconciler's first tick.
pub async fn reconcile_on_startup(store: &StateStore, session_manager: &SessionManager) {
    for ws in store.list_workspaces() {
        if !ws.path.exists() {
            tracing::warn!(workspace = %ws.id, path = %ws.path.display(), "workspace directory missing at startup, dropping from state");
            let _ = store.remove_workspace(ws.id.as_str());
        }
    }

    for session in store.list_sessions() {
        if !session_manager.is_running(&session.mux_session_name).await {
            tracing::warn!(session = %session.id, mux_session_name = %session.mux_session_name, "session not running at startup, dropping from state");
            let _ = store.remove_session(&session.id);
        }
    }
}

impl DaemonState {
    /// Graceful shutdown: remove the socket, PID, and version
    /// files. Takes `&self` rather than consuming it so callers can move
    /// other fields (e.g. `store`) out of `DaemonState` first; the lock is
    /// released once `self` is finally dropped.
    pub fn shutdown(&self) {
        let _ = fs::remove_file(&self.paths.socket_path);
        let _ = fs::remove_file(&self.paths.pid_path);
        let _ = fs::remove_file(&self.paths.version_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_state_dir<T>(f: impl FnOnce(&Path) -> T) -> T {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("LOOM_STATE_DIR", dir.path());
        let out = f(dir.path());
        std::env::remove_var("LOOM_STATE_DIR");
        out
    }

    #[test]
    #[serial]
    fn startup_creates_pid_and_version_files() {
        with_state_dir(|dir| {
            let config_path = dir.join("loom.toml");
            let state = startup(&config_path).unwrap();
            assert!(state.paths.pid_path.exists());
            assert!(state.paths.version_path.exists());
            state.shutdown();
        });
    }

    #[test]
    #[serial]
    fn second_startup_fails_to_acquire_lock() {
        with_state_dir(|dir| {
            let config_path = dir.join("loom.toml");
            let first = startup(&config_path).unwrap();
            let second = startup(&config_path);
            assert!(matches!(second, Err(LifecycleError::LockFailed(_))));
            first.shutdown();
        });
    }

    #[test]
    #[serial]
    fn shutdown_removes_socket_pid_and_version_files() {
        with_state_dir(|dir| {
            let config_path = dir.join("loom.toml");
            let state = startup(&config_path).unwrap();
            let pid_path = state.paths.pid_path.clone();
            let version_path = state.paths.version_path.clone();
            state.shutdown();
            assert!(!pid_path.exists());
            assert!(!version_path.exists());
        });
    }

    #[tokio::test]
    async fn reconcile_on_startup_drops_workspace_with_missing_directory() {
        use loom_core::WorkspaceId;
        use loom_storage::Workspace;

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        store
            .add_workspace(Workspace {
                id: WorkspaceId::new("widget", 1),
                repo_url: "git@example.com:acme/widget.git".to_string(),
                branch: "main".to_string(),
                path: dir.path().join("gone"),
                status: Default::default(),
            })
            .unwrap();

        let store = std::sync::Arc::new(store);
        let session_manager = SessionManager::new(std::sync::Arc::clone(&store), Config::default());
        reconcile_on_startup(&store, &session_manager).await;

        assert!(store.list_workspaces().is_empty());
    }

    #[tokio::test]
    async fn reconcile_on_startup_drops_session_with_no_tmux_pane() {
        use loom_core::WorkspaceId;
        use loom_storage::Session;

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        store
            .add_session(Session {
                id: "sess-1".to_string(),
                workspace_id: WorkspaceId::new("widget", 1),
                target: "claude".to_string(),
                mux_session_name: "widget-001-does-not-exist".to_string(),
                nickname: None,
                created_at_ms: 0,
                last_output_at_ms: 0,
                last_classification: None,
            })
            .unwrap();

        let store = std::sync::Arc::new(store);
        let session_manager = SessionManager::new(std::sync::Arc::clone(&store), Config::default());
        reconcile_on_startup(&store, &session_manager).await;

        assert!(store.list_sessions().is_empty());
    }
}
