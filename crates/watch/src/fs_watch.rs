//! Source-control metadata watcher.
//!
//! Watches, per workspace, the resolved control directory, its `refs/`
//! subtree recursively (including subdirectories created later), its
//! `logs/` subtree, and — for working-tree clones — the shared base's
//! `refs/`. Events are collapsed per workspace into at most one refresh per
//! debounce window, the same way a rapid burst of timer ticks gets collapsed
//! into a single rescheduled timer rather than firing once per tick.

use loom_core::WorkspaceId;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to create filesystem watcher: {0}")]
    Watcher(#[from] notify::Error),
}

/// Watches git control directories for many workspaces and emits a debounced
/// "refresh this workspace" signal on the returned receiver.
pub struct FsWatchSet {
    watcher: Option<RecommendedWatcher>,
    watched_roots: Arc<Mutex<HashMap<PathBuf, WorkspaceId>>>,
    timers: Arc<Mutex<HashMap<WorkspaceId, CancellationToken>>>,
}

impl FsWatchSet {
    /// Events are collapsed into at most one `changes` signal per workspace
    /// per `debounce` window. Pass `enabled = false` to build a watcher whose
    /// `watch`/`unwatch` calls are no-ops (spec: "the watcher is optional and
    /// can be disabled entirely by configuration").
    pub fn new(debounce: Duration, enabled: bool) -> Result<(Self, mpsc::Receiver<WorkspaceId>), WatchError> {
        let watched_roots: Arc<Mutex<HashMap<PathBuf, WorkspaceId>>> = Arc::new(Mutex::new(HashMap::new()));
        let (raw_tx, mut raw_rx) = mpsc::channel::<WorkspaceId>(1024);
        let (changes_tx, changes_rx) = mpsc::channel(256);

        let watcher = if enabled {
            let roots = watched_roots.clone();
            let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let Ok(event) = res else { return };
                let roots = roots.lock();
                for path in &event.paths {
                    if let Some(id) = id_for_path(&roots, path) {
                        let _ = raw_tx.try_send(id);
                    }
                }
            })?;
            Some(watcher)
        } else {
            None
        };

        let timers: Arc<Mutex<HashMap<WorkspaceId, CancellationToken>>> = Arc::new(Mutex::new(HashMap::new()));
        let timers_for_loop = timers.clone();
        tokio::spawn(async move {
            while let Some(id) = raw_rx.recv().await {
                let previous = {
                    let mut guard = timers_for_loop.lock();
                    guard.insert(id.clone(), CancellationToken::new())
                };
                if let Some(prev) = previous {
                    prev.cancel();
                }
                let token = timers_for_loop.lock().get(&id).cloned().expect("just inserted");
                let changes_tx = changes_tx.clone();
                let debounce_window = debounce;
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(debounce_window) => {
                            let _ = changes_tx.send(id).await;
                        }
                        _ = token.cancelled() => {}
                    }
                });
            }
        });

        Ok((Self { watcher, watched_roots, timers }, changes_rx))
    }

    /// Start watching `control_dir` (the resolved `.git`/worktree control
    /// directory) for `id`. Recurses into `refs/` and `logs/`, including
    /// subdirectories created after this call.
    pub fn watch(&mut self, id: &WorkspaceId, control_dir: &Path) -> Result<(), WatchError> {
        self.watched_roots.lock().insert(control_dir.to_path_buf(), id.clone());
        let Some(watcher) = self.watcher.as_mut() else { return Ok(()) };
        watcher.watch(control_dir, RecursiveMode::NonRecursive)?;
        for subdir in ["refs", "logs"] {
            let path = control_dir.join(subdir);
            if path.exists() {
                self.watched_roots.lock().insert(path.clone(), id.clone());
                watcher.watch(&path, RecursiveMode::Recursive)?;
            }
        }
        Ok(())
    }

    /// Additionally watch a shared base's `refs/` on behalf of `id` (for
    /// working-tree clones, whose own refs live partly in the shared base).
    pub fn watch_shared_base_refs(&mut self, id: &WorkspaceId, base_refs_dir: &Path) -> Result<(), WatchError> {
        self.watched_roots.lock().insert(base_refs_dir.to_path_buf(), id.clone());
        if let Some(watcher) = self.watcher.as_mut() {
            if base_refs_dir.exists() {
                watcher.watch(base_refs_dir, RecursiveMode::Recursive)?;
            }
        }
        Ok(())
    }

    /// Idempotent: stops watching `control_dir` and cancels any pending
    /// debounce timer for `id`.
    pub fn unwatch(&mut self, id: &WorkspaceId, control_dir: &Path) -> Result<(), WatchError> {
        self.watched_roots.lock().retain(|_, v| v != id);
        if let Some(watcher) = self.watcher.as_mut() {
            let _ = watcher.unwatch(control_dir);
        }
        if let Some(token) = self.timers.lock().remove(id) {
            token.cancel();
        }
        Ok(())
    }

    /// Cancels every pending timer. Idempotent.
    pub fn stop(&self) {
        let mut guard = self.timers.lock();
        for (_, token) in guard.drain() {
            token.cancel();
        }
    }
}

/// The workspace id registered for `path` or the nearest watched ancestor.
fn id_for_path(roots: &HashMap<PathBuf, WorkspaceId>, path: &Path) -> Option<WorkspaceId> {
    if let Some(id) = roots.get(path) {
        return Some(id.clone());
    }
    path.ancestors().find_map(|ancestor| roots.get(ancestor).cloned())
}
