//! Session Manager: tmux-backed interactive agent sessions.
//!
//! Full spawn/rename/dispose/capture/is-running surface over tmux. Every
//! tmux query is scoped to session ids this daemon's state store already
//! knows about, never to a bare `tmux list-sessions`.

use crate::error::{Result, WorkspaceError};
use loom_core::{Config, RunTarget, SessionId, Variant};
use loom_storage::{Session as StoredSession, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct SessionManager {
    store: Arc<StateStore>,
    config: Config,
    spawn_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(store: Arc<StateStore>, config: Config) -> Self {
        Self { store, config, spawn_lock: Mutex::new(()) }
    }

    fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.config.tmux_query_timeout_seconds)
    }

    fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.tmux_operation_timeout_seconds)
    }

    /// Spawn a session for `target` in `workspace`, seeding the environment
    /// from `variant`'s resolved secrets if given.
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        &self,
        workspace_id: &loom_core::WorkspaceId,
        workspace_path: &std::path::Path,
        target: &RunTarget,
        prompt: Option<&str>,
        requested_nickname: Option<&str>,
        variant: Option<&Variant>,
        now_ms: u64,
    ) -> Result<StoredSession> {
        target.check_prompt(prompt).map_err(loom_core::Error::Validation)?;

        let _guard = self.spawn_lock.lock().await;

        let nickname = self.allocate_nickname(workspace_id, requested_nickname);
        let mux_session_name = format!("{workspace_id}-{}", target.name);

        let mut secrets = Vec::new();
        if let Some(v) = variant {
            secrets = v
                .resolve_secrets(|key| std::env::var(key).ok())
                .map_err(loom_core::Error::Validation)?;
        }

        let command = render_command(&target.command_template, prompt);
        self.tmux_new_session(&mux_session_name, workspace_path, &command, &secrets).await?;

        let session = StoredSession {
            id: SessionId::new().to_string(),
            workspace_id: workspace_id.clone(),
            target: target.name.clone(),
            mux_session_name,
            nickname: Some(nickname),
            created_at_ms: now_ms,
            last_output_at_ms: now_ms,
            last_classification: None,
        };
        self.store.add_session(session.clone())?;
        Ok(session)
    }

    fn allocate_nickname(&self, workspace_id: &loom_core::WorkspaceId, requested: Option<&str>) -> String {
        let existing: std::collections::HashSet<String> = self
            .store
            .sessions_for_workspace(workspace_id)
            .into_iter()
            .filter_map(|s| s.nickname)
            .collect();

        let base = requested.unwrap_or("session").to_string();
        if !existing.contains(&base) {
            return base;
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{base} ({n})");
            if !existing.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    async fn tmux_new_session(
        &self,
        session_name: &str,
        workspace_path: &std::path::Path,
        command: &str,
        secrets: &[(String, String)],
    ) -> Result<()> {
        let mut cmd = tokio::process::Command::new("tmux");
        cmd.args([
            "new-session",
            "-d",
            "-s",
            session_name,
            "-c",
            &workspace_path.display().to_string(),
            "-x",
            &self.config.terminal.width.to_string(),
            "-y",
            &self.config.terminal.height.to_string(),
        ]);
        for (key, value) in secrets {
            cmd.env(key, value);
        }

        let output = loom_git::run_with_timeout(
            cmd,
            self.operation_timeout(),
            "tmux new-session",
            &tokio_util::sync::CancellationToken::new(),
        )
        .await
        .map_err(|e| loom_core::Error::Transient(e.to_string()))?;

        if !output.status.success() {
            return Err(WorkspaceError::Core(loom_core::Error::Transient(format!(
                "tmux new-session failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }

        let mut send = tokio::process::Command::new("tmux");
        send.args(["send-keys", "-t", session_name, command, "Enter"]);
        let output = loom_git::run_with_timeout(
            send,
            self.operation_timeout(),
            "tmux send-keys",
            &tokio_util::sync::CancellationToken::new(),
        )
        .await
        .map_err(|e| loom_core::Error::Transient(e.to_string()))?;

        if !output.status.success() {
            return Err(WorkspaceError::Core(loom_core::Error::Transient(format!(
                "tmux send-keys failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }

        Ok(())
    }

    /// `IsRunning`: a cheap, short-timeout multiplexer liveness query.
    pub async fn is_running(&self, mux_session_name: &str) -> bool {
        let mut cmd = tokio::process::Command::new("tmux");
        cmd.args(["has-session", "-t", mux_session_name]);
        match loom_git::run_with_timeout(
            cmd,
            self.query_timeout(),
            "tmux has-session",
            &tokio_util::sync::CancellationToken::new(),
        )
        .await
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    /// `CaptureLastLines(n)`: the last `n` lines of the session's scrollback.
    pub async fn capture_last_lines(&self, mux_session_name: &str, n: u32, with_color: bool) -> Result<String> {
        let start = format!("-{n}");
        let mut args = vec!["capture-pane", "-t", mux_session_name, "-p", "-S", &start];
        if with_color {
            args.push("-e");
        }
        let mut cmd = tokio::process::Command::new("tmux");
        cmd.args(&args);
        let output = loom_git::run_with_timeout(
            cmd,
            self.query_timeout(),
            "tmux capture-pane",
            &tokio_util::sync::CancellationToken::new(),
        )
        .await
        .map_err(|e| loom_core::Error::Transient(e.to_string()))?;

        if !output.status.success() {
            return Err(WorkspaceError::NotFound(mux_session_name.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Rename enforces nickname uniqueness per workspace.
    pub fn rename(&self, session_id: &str, new_nickname: &str) -> Result<()> {
        let session = self
            .store
            .get_session(session_id)
            .ok_or_else(|| WorkspaceError::NotFound(session_id.to_string()))?;

        let collision = self
            .store
            .sessions_for_workspace(&session.workspace_id)
            .into_iter()
            .any(|s| s.id != session.id && s.nickname.as_deref() == Some(new_nickname));
        if collision {
            return Err(WorkspaceError::Core(loom_core::Error::Conflict(format!(
                "nickname '{new_nickname}' already in use"
            ))));
        }

        self.store.update_session(session_id, |s| s.nickname = Some(new_nickname.to_string()))?;
        Ok(())
    }

    /// Dispose kills the multiplexer session, then removes the record.
    /// A session already absent from the multiplexer is treated as success.
    pub async fn dispose(&self, session_id: &str) -> Result<()> {
        let session = self
            .store
            .get_session(session_id)
            .ok_or_else(|| WorkspaceError::NotFound(session_id.to_string()))?;

        let mut cmd = tokio::process::Command::new("tmux");
        cmd.args(["kill-session", "-t", &session.mux_session_name]);
        let _ = loom_git::run_with_timeout(
            cmd,
            self.operation_timeout(),
            "tmux kill-session",
            &tokio_util::sync::CancellationToken::new(),
        )
        .await;

        self.store.remove_session(session_id)?;
        Ok(())
    }
}

/// Substitute `{prompt}` into a target's command template. A command target
/// (no `{prompt}` placeholder) ignores a `None` prompt.
fn render_command(template: &str, prompt: Option<&str>) -> String {
    match prompt {
        Some(p) => template.replace("{prompt}", &shell_escape(p)),
        None => template.to_string(),
    }
}

fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_command_substitutes_and_escapes_prompt() {
        let rendered = render_command("claude {prompt}", Some("fix it's bug"));
        assert_eq!(rendered, r#"claude 'fix it'\''s bug'"#);
    }

    #[test]
    fn render_command_without_prompt_is_unchanged() {
        assert_eq!(render_command("npm test", None), "npm test");
    }
}
