//! Subprocess execution with a deadline and a cancellation handle.
//!
//! Spawn, race against `tokio::time::timeout`, and rely on `kill_on_drop`
//! to SIGKILL the child when the timeout future is dropped. Additionally
//! races against a `CancellationToken` so in-flight git calls can be
//! cancelled early.

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label} timed out after {timeout:?}")]
    TimedOut { label: String, timeout: Duration },

    #[error("{label} was cancelled")]
    Cancelled { label: String },

    #[error("{label} failed to spawn: {source}")]
    Spawn { label: String, #[source] source: std::io::Error },

    #[error("{label} failed while waiting for output: {source}")]
    Wait { label: String, #[source] source: std::io::Error },
}

/// Run `cmd` to completion, capturing stdout/stderr, enforcing `timeout` and
/// honoring `cancel`. `label` identifies the call in error messages and logs.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
    cancel: &CancellationToken,
) -> Result<Output, SubprocessError> {
    cmd.kill_on_drop(true);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());

    let child = cmd.spawn().map_err(|source| SubprocessError::Spawn {
        label: label.to_string(),
        source,
    })?;

    tokio::select! {
        result = tokio::time::timeout(timeout, child.wait_with_output()) => {
            match result {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(source)) => {
                    Err(SubprocessError::Wait { label: label.to_string(), source })
                }
                Err(_elapsed) => {
                    tracing::warn!(label, ?timeout, "subprocess timed out");
                    Err(SubprocessError::TimedOut { label: label.to_string(), timeout })
                }
            }
        }
        _ = cancel.cancelled() => {
            tracing::debug!(label, "subprocess cancelled");
            Err(SubprocessError::Cancelled { label: label.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_output() {
        let cmd = Command::new("true");
        let output =
            run_with_timeout(cmd, Duration::from_secs(5), "true", &CancellationToken::new())
                .await
                .unwrap();
        assert!(output.status.success());
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_with_timeout(cmd, Duration::from_millis(50), "sleep", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SubprocessError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn cancellation_token_cancels_in_flight_command() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let token = CancellationToken::new();
        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token_clone.cancel();
        });
        let err = run_with_timeout(cmd, Duration::from_secs(5), "sleep", &token).await.unwrap_err();
        assert!(matches!(err, SubprocessError::Cancelled { .. }));
    }
}
