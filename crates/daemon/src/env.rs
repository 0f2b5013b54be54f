//! Centralized environment variable access for the daemon binary.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Protocol version advertised in the `Hello` handshake.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the state directory: `LOOM_STATE_DIR` > `XDG_STATE_HOME/loom` >
/// `~/.local/state/loom`.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("LOOM_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("loom"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/loom"))
}

/// Resolve the config file path: `LOOM_CONFIG_PATH` > `~/.config/loom/loom.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("LOOM_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loom")
        .join("loom.toml")
}

/// Default IPC request timeout, applied around each `handle_request` call.
pub fn ipc_timeout() -> Duration {
    std::env::var("LOOM_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Graceful-shutdown drain timeout.
pub fn drain_timeout() -> Duration {
    std::env::var("LOOM_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}
