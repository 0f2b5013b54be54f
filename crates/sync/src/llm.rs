//! One-shot LLM invocation.
//!
//! Reuses `loom_git::run_with_timeout` directly rather than duplicating it:
//! the conflict resolver never talks to a model API directly, it shells out
//! to whatever one-shot CLI target is configured
//! (`conflict_resolve_target`), the same way every other external process
//! in this codebase is invoked.

use async_trait::async_trait;
use loom_git::{run_with_timeout, SubprocessError};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    #[error("{target} exited with a failure status: {stderr}")]
    NonZeroExit { target: String, stderr: String },

    #[error("response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response rejected: {0}")]
    SchemaMismatch(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// `cwd` is the workspace directory the one-shot invocation runs in —
    /// the conflict-resolution target is an agentic CLI that edits the
    /// conflicted files in place before reporting back, not a bare chat
    /// completion, so it must see the real working tree.
    async fn complete(
        &self,
        prompt: &str,
        cwd: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError>;
}

/// Invokes `target` as a one-shot CLI process (`<target> -p <prompt>`) with
/// its working directory set to the conflicted workspace, reading its
/// stdout as the complete response.
pub struct CliLlmClient {
    pub target: String,
}

impl CliLlmClient {
    pub fn new(target: impl Into<String>) -> Self {
        Self { target: target.into() }
    }
}

#[async_trait]
impl LlmClient for CliLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        cwd: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let mut cmd = Command::new(&self.target);
        cmd.arg("-p").arg(prompt).current_dir(cwd);
        let output = run_with_timeout(cmd, timeout, "llm one-shot", cancel).await?;
        if !output.status.success() {
            return Err(LlmError::NonZeroExit {
                target: self.target.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticClient(&'static str);

    #[async_trait]
    impl LlmClient for StaticClient {
        async fn complete(&self, _: &str, _: &Path, _: Duration, _: &CancellationToken) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn stub_client_returns_configured_text() {
        let client = StaticClient("{}");
        let out = client
            .complete("prompt", Path::new("/tmp"), Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "{}");
    }
}
