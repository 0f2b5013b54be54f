//! `loomd` — the control-plane daemon.
//!
//! Resolve paths, run `lifecycle::startup`, build the long-lived managers
//! around the loaded config/store, run the startup reconciliation pass
//! against those managers, spawn the background reconciler and filesystem
//! watcher, then bind and serve the control socket until asked to shut down.

mod env;
mod lifecycle;
mod listener;

use std::sync::Arc;
use std::time::Instant;

use loom_workspace::{SessionManager, WorkspaceManager};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::listener::{ListenCtx, Listener};

#[tokio::main]
async fn main() {
    let config_path = env::config_path();

    let state = match lifecycle::startup(&config_path) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("loomd: startup failed: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&state.paths.log_path);
    tracing::info!(socket = %state.paths.socket_path.display(), "loomd starting");

    let store = Arc::new(state.store);
    let workspace_manager = Arc::new(WorkspaceManager::new(Arc::clone(&store), state.config.clone()));
    let session_manager = Arc::new(SessionManager::new(Arc::clone(&store), state.config.clone()));

    lifecycle::reconcile_on_startup(&store, &session_manager).await;

    let background_cancel = CancellationToken::new();
    let reconciler_handle = tokio::spawn(loom_watch::reconciler::run(
        Arc::clone(&workspace_manager),
        config_path.clone(),
        background_cancel.clone(),
    ));

    let (changes_tx, _changes_rx) = broadcast::channel(256);
    let shutdown = Arc::new(Notify::new());
    let ctx = Arc::new(ListenCtx {
        workspace_manager,
        session_manager,
        config_path,
        start_time: Instant::now(),
        shutdown: Arc::clone(&shutdown),
        changes: changes_tx,
    });

    let unix_listener = match UnixListener::bind(&state.paths.socket_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("loomd: failed to bind control socket: {e}");
            background_cancel.cancel();
            state.shutdown();
            std::process::exit(1);
        }
    };

    let listener = Listener::new(unix_listener, Arc::clone(&ctx));
    let listener_handle = tokio::spawn(listener.run());

    shutdown.notified().await;
    tracing::info!("loomd shutting down");

    background_cancel.cancel();
    reconciler_handle.abort();
    listener_handle.abort();

    tokio::time::sleep(env::drain_timeout().min(std::time::Duration::from_millis(500))).await;

    state.shutdown();
}

fn init_logging(log_path: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("loom.log");
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("LOOM_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    guard
}
