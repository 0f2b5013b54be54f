//! Daemon configuration.
//!
//! Loaded from a TOML file at startup. Missing fields take their
//! `Default` value rather than failing to load, matching the state store's
//! own schema-drift tolerance.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCodeManagement {
    Worktrees,
    Git,
}

impl Default for SourceCodeManagement {
    fn default() -> Self {
        SourceCodeManagement::Worktrees
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace_path: PathBuf,
    pub worktree_base_path: PathBuf,
    pub query_repo_path: PathBuf,

    pub source_code_management: SourceCodeManagement,

    pub git_status_watch_enabled: bool,
    pub git_status_watch_debounce_ms: u64,

    pub mtime_poll_interval_ms: u64,
    pub sessions_poll_interval_ms: u64,
    pub git_status_poll_interval_ms: u64,

    pub git_clone_timeout_seconds: u64,
    pub git_status_timeout_seconds: u64,
    pub tmux_query_timeout_seconds: u64,
    pub tmux_operation_timeout_seconds: u64,

    pub conflict_resolve_target: String,
    pub conflict_resolve_timeout_ms: u64,

    pub nudgenik_target: String,

    pub terminal: TerminalConfig,

    pub network_access: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub width: u16,
    pub height: u16,
    pub seed_lines: u32,
    pub bootstrap_lines: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { width: 120, height: 40, seed_lines: 200, bootstrap_lines: 40 }
    }
}

impl Default for Config {
    fn default() -> Self {
        let root = dirs_home_config();
        Self {
            workspace_path: root.join("workspaces"),
            worktree_base_path: root.join("repos"),
            query_repo_path: root.join("query"),
            source_code_management: SourceCodeManagement::default(),
            git_status_watch_enabled: true,
            git_status_watch_debounce_ms: 200,
            mtime_poll_interval_ms: 2_000,
            sessions_poll_interval_ms: 2_000,
            git_status_poll_interval_ms: 5_000,
            git_clone_timeout_seconds: 120,
            git_status_timeout_seconds: 15,
            tmux_query_timeout_seconds: 3,
            tmux_operation_timeout_seconds: 10,
            conflict_resolve_target: "claude".to_string(),
            conflict_resolve_timeout_ms: 120_000,
            nudgenik_target: "claude".to_string(),
            terminal: TerminalConfig::default(),
            network_access: true,
        }
    }
}

fn dirs_home_config() -> PathBuf {
    dirs::config_dir().map(|d| d.join("loom")).unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Load the config, falling back to defaults if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/loom.toml")).unwrap();
        assert_eq!(cfg.terminal.width, 120);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loom.toml");
        std::fs::write(&path, "git_status_watch_debounce_ms = 500\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.git_status_watch_debounce_ms, 500);
        assert_eq!(cfg.tmux_operation_timeout_seconds, 10);
    }
}
