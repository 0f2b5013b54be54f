//! The Linear-Sync / Conflict-Resolver driver.
//!
//! An LLM resolves a rebase conflict presented as a one-shot prompt and the
//! validated response maps to staged files: present structured context,
//! validate the structured resolution against ground truth before acting
//! on it.

use crate::llm::{LlmClient, LlmError};
use crate::progress::{ProgressEvent, ProgressSink, ProgressStatus, ProgressStep};
use crate::response::{build_prompt, parse_response, FileAction};
use loom_git::GitRepo;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Git(#[from] loom_git::GitError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromDefaultOutcome {
    AlreadyCaughtUp,
    Synced { commits_applied: usize },
    ConflictAt { commits_applied: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToDefaultOutcome {
    Refused(String),
    Pushed,
}

/// Per-commit record of a conflict the LLM resolved, accumulated across the
/// conflict loop.
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    pub commit_hash: String,
    pub commit_subject: String,
    pub summary: String,
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ResolveConflictOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub resolutions: Vec<ConflictResolution>,
}

/// One Linear-Sync driver bound to a single working copy. Callers are
/// responsible for holding the per-repo-URL lock for the duration
/// of any mutating call — the driver itself does not lock.
pub struct SyncDriver<'a> {
    repo: &'a GitRepo,
    namespace: &'a str,
    cancel: CancellationToken,
}

impl<'a> SyncDriver<'a> {
    pub fn new(repo: &'a GitRepo, namespace: &'a str, cancel: CancellationToken) -> Self {
        Self { repo, namespace, cancel }
    }

    /// Replays `HEAD..origin/<default>` onto `HEAD` one commit at a time,
    /// oldest first, stopping at the first conflict.
    pub async fn sync_from_default(
        &self,
        default_branch: &str,
        timeout: Duration,
        progress: ProgressSink<'_>,
    ) -> Result<FromDefaultOutcome> {
        progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::InProgress, "fetching origin"));
        self.repo.fetch(timeout).await?;

        let origin_ref = format!("origin/{default_branch}");
        if self.repo.is_ancestor(&origin_ref, "HEAD", timeout).await? {
            progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::Done, "already caught up"));
            return Ok(FromDefaultOutcome::AlreadyCaughtUp);
        }

        let commits = self.repo.commits_between("HEAD", &origin_ref, timeout).await?;
        progress(
            ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::Done, "behind default branch")
                .with_context("commit_count", commits.len().to_string()),
        );

        let wip_created = self.wip_commit(timeout, progress).await?;

        let mut commits_applied = 0usize;
        for hash in &commits {
            progress(
                ProgressEvent::new(ProgressStep::RebaseStart, ProgressStatus::InProgress, "rebasing onto commit")
                    .with_context("commit", hash.clone()),
            );
            let output = self.repo.rebase_onto(hash, timeout).await?;
            if output.status.success() {
                commits_applied += 1;
                progress(ProgressEvent::new(ProgressStep::RebaseStart, ProgressStatus::Done, "applied"));
                continue;
            }

            progress(ProgressEvent::new(
                ProgressStep::RebaseStart,
                ProgressStatus::Failed,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
            self.abort_and_unwind(wip_created, timeout, progress).await;
            return Ok(FromDefaultOutcome::ConflictAt { commits_applied });
        }

        self.unwind_wip(wip_created, timeout, progress).await?;
        Ok(FromDefaultOutcome::Synced { commits_applied })
    }

    /// Pushes local commits to the default branch, directly if already on it,
    /// or via set-upstream-push-then-ff-merge when on a feature branch.
    pub async fn sync_to_default(
        &self,
        default_branch: &str,
        timeout: Duration,
        progress: ProgressSink<'_>,
    ) -> Result<ToDefaultOutcome> {
        progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::InProgress, "fetching origin"));
        self.repo.fetch(timeout).await?;

        let origin_ref = format!("origin/{default_branch}");
        if !self.repo.is_ancestor(&origin_ref, "HEAD", timeout).await? {
            let message = "origin/<default> is not an ancestor of HEAD".to_string();
            progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::Failed, message.clone()));
            return Ok(ToDefaultOutcome::Refused(message));
        }

        let status = self.repo.status_porcelain(timeout).await?;
        if !status.trim().is_empty() {
            let message = "workspace has uncommitted or untracked changes".to_string();
            progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::Failed, message.clone()));
            return Ok(ToDefaultOutcome::Refused(message));
        }

        let (ahead, behind) = self.repo.rev_list_left_right(default_branch, timeout).await?;
        if behind > 0 {
            let message = "workspace is behind the default branch".to_string();
            progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::Failed, message.clone()));
            return Ok(ToDefaultOutcome::Refused(message));
        }
        if ahead == 0 {
            let message = "no commits ahead of the default branch".to_string();
            progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::Failed, message.clone()));
            return Ok(ToDefaultOutcome::Refused(message));
        }
        progress(
            ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::Done, "ahead of default branch")
                .with_context("ahead", ahead.to_string()),
        );

        let current_branch = self.repo.symbolic_ref_head(timeout).await?;
        if current_branch.as_deref() == Some(default_branch) {
            self.repo.push(None, timeout).await?;
        } else {
            self.repo.push_set_upstream(&format!("HEAD:{default_branch}"), timeout).await?;
            self.repo.merge_ff_only(&origin_ref, timeout).await?;
        }
        Ok(ToDefaultOutcome::Pushed)
    }

    /// Rebases the oldest pending commit onto `origin/<default>`, invoking
    /// the LLM one-shot on every conflict until the rebase drains or a
    /// failure forces a full unwind.
    pub async fn resolve_conflict(
        &self,
        default_branch: &str,
        workspace_path: &Path,
        llm: &dyn LlmClient,
        llm_timeout: Duration,
        git_timeout: Duration,
        progress: ProgressSink<'_>,
    ) -> Result<ResolveConflictOutcome> {
        progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::InProgress, "fetching origin"));
        self.repo.fetch(git_timeout).await?;

        let origin_ref = format!("origin/{default_branch}");
        let default_hash = self.repo.branch_tip(default_branch, git_timeout).await?.unwrap_or_default();
        let commits = self.repo.commits_between("HEAD", &origin_ref, git_timeout).await?;
        if commits.is_empty() {
            progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::Done, "already caught up"));
            return Ok(ResolveConflictOutcome {
                success: true,
                message: Some("already caught up".to_string()),
                resolutions: vec![],
            });
        }
        let oldest = commits[0].clone();
        progress(ProgressEvent::new(ProgressStep::CheckBehind, ProgressStatus::Done, "picked oldest pending commit"));

        let wip_created = self.wip_commit(git_timeout, progress).await?;

        progress(
            ProgressEvent::new(ProgressStep::RebaseStart, ProgressStatus::InProgress, "rebasing oldest commit")
                .with_context("commit", oldest.clone()),
        );
        let initial = self.repo.rebase_onto(&oldest, git_timeout).await?;
        if initial.status.success() {
            progress(ProgressEvent::new(ProgressStep::RebaseStart, ProgressStatus::Done, "clean rebase, no conflicts"));
            self.unwind_wip(wip_created, git_timeout, progress).await?;
            return Ok(ResolveConflictOutcome { success: true, message: None, resolutions: vec![] });
        }

        if !self.repo.rebase_in_progress().await {
            let message = String::from_utf8_lossy(&initial.stderr).trim().to_string();
            progress(ProgressEvent::new(ProgressStep::RebaseStart, ProgressStatus::Failed, message.clone()));
            self.abort_and_unwind(wip_created, git_timeout, progress).await;
            return Ok(ResolveConflictOutcome { success: false, message: Some(message), resolutions: vec![] });
        }
        progress(ProgressEvent::new(ProgressStep::RebaseStart, ProgressStatus::Failed, "conflict on first commit"));

        let mut resolutions = Vec::new();

        loop {
            if !self.repo.rebase_in_progress().await {
                break;
            }

            let unmerged = self.repo.unmerged_paths(git_timeout).await?;
            if unmerged.is_empty() {
                progress(ProgressEvent::new(
                    ProgressStep::RebaseContinue,
                    ProgressStatus::InProgress,
                    "no remaining conflicts, continuing rebase",
                ));
                let cont = self.repo.rebase_continue(git_timeout).await?;
                if !cont.status.success() {
                    let message = String::from_utf8_lossy(&cont.stderr).trim().to_string();
                    progress(ProgressEvent::new(ProgressStep::RebaseContinue, ProgressStatus::Failed, message.clone()));
                    self.abort_and_unwind(wip_created, git_timeout, progress).await;
                    return Ok(ResolveConflictOutcome { success: false, message: Some(message), resolutions });
                }
                progress(ProgressEvent::new(ProgressStep::RebaseContinue, ProgressStatus::Done, "continued"));
                continue;
            }

            progress(
                ProgressEvent::new(ProgressStep::ConflictDetected, ProgressStatus::Done, "conflict detected")
                    .with_context("files", unmerged.join(",")),
            );

            let (commit_hash, commit_subject) = self.repo.rebase_head_commit(git_timeout).await?;
            let mut sorted_files = unmerged.clone();
            sorted_files.sort();
            let prompt = build_prompt(workspace_path, &default_hash, &commit_hash, &commit_subject, &sorted_files);

            progress(ProgressEvent::new(ProgressStep::LlmCall, ProgressStatus::InProgress, "calling LLM one-shot"));
            let raw = match llm.complete(&prompt, workspace_path, llm_timeout, &self.cancel).await {
                Ok(text) => text,
                Err(e) => {
                    progress(ProgressEvent::new(ProgressStep::LlmCall, ProgressStatus::Failed, e.to_string()));
                    self.abort_and_unwind(wip_created, git_timeout, progress).await;
                    return Ok(ResolveConflictOutcome { success: false, message: Some(e.to_string()), resolutions });
                }
            };

            let resp = match parse_response(&raw) {
                Ok(r) => r,
                Err(e) => {
                    progress(ProgressEvent::new(ProgressStep::LlmCall, ProgressStatus::Failed, e.to_string()));
                    self.abort_and_unwind(wip_created, git_timeout, progress).await;
                    return Ok(ResolveConflictOutcome { success: false, message: Some(e.to_string()), resolutions });
                }
            };
            progress(ProgressEvent::new(ProgressStep::LlmCall, ProgressStatus::Done, "received response"));

            if !resp.all_resolved || resp.confidence != "high" {
                let message = format!(
                    "response rejected: all_resolved={}, confidence={}",
                    resp.all_resolved, resp.confidence
                );
                progress(ProgressEvent::new(ProgressStep::ConflictDetected, ProgressStatus::Failed, message.clone()));
                self.abort_and_unwind(wip_created, git_timeout, progress).await;
                return Ok(ResolveConflictOutcome { success: false, message: Some(message), resolutions });
            }

            let (modified, deleted) = match validate_against_disk(workspace_path, &unmerged, &resp.files).await {
                Ok(pair) => pair,
                Err(message) => {
                    progress(ProgressEvent::new(ProgressStep::ConflictDetected, ProgressStatus::Failed, message.clone()));
                    self.abort_and_unwind(wip_created, git_timeout, progress).await;
                    return Ok(ResolveConflictOutcome { success: false, message: Some(message), resolutions });
                }
            };

            self.repo.add_paths(&modified, git_timeout).await?;
            self.repo.rm_ignore_unmatch(&deleted, git_timeout).await?;

            let files = resp.files.iter().map(|(path, res)| (path.clone(), res.description.clone())).collect();
            resolutions.push(ConflictResolution { commit_hash, commit_subject, summary: resp.summary.clone(), files });

            progress(ProgressEvent::new(
                ProgressStep::RebaseContinue,
                ProgressStatus::InProgress,
                "continuing rebase after staging resolution",
            ));
            let cont = self.repo.rebase_continue(git_timeout).await?;
            if !cont.status.success() {
                let message = String::from_utf8_lossy(&cont.stderr).trim().to_string();
                progress(ProgressEvent::new(ProgressStep::RebaseContinue, ProgressStatus::Failed, message.clone()));
                self.abort_and_unwind(wip_created, git_timeout, progress).await;
                return Ok(ResolveConflictOutcome { success: false, message: Some(message), resolutions });
            }
            progress(ProgressEvent::new(ProgressStep::RebaseContinue, ProgressStatus::Done, "continued"));
        }

        self.unwind_wip(wip_created, git_timeout, progress).await?;
        Ok(ResolveConflictOutcome { success: true, message: None, resolutions })
    }

    async fn wip_commit(&self, timeout: Duration, progress: ProgressSink<'_>) -> Result<bool> {
        progress(ProgressEvent::new(ProgressStep::WipCommit, ProgressStatus::InProgress, "saving local changes"));
        let created = self.repo.commit_all(&format!("WIP: {}", self.namespace), timeout).await?;
        let message = if created { "WIP commit created" } else { "nothing to save" };
        progress(ProgressEvent::new(ProgressStep::WipCommit, ProgressStatus::Done, message));
        Ok(created)
    }

    async fn unwind_wip(&self, wip_created: bool, timeout: Duration, progress: ProgressSink<'_>) -> Result<()> {
        if wip_created {
            progress(ProgressEvent::new(ProgressStep::WipUnwind, ProgressStatus::InProgress, "restoring saved changes"));
            self.repo.reset_mixed_head_minus_one(timeout).await?;
            progress(ProgressEvent::new(ProgressStep::WipUnwind, ProgressStatus::Done, "changes restored"));
        }
        Ok(())
    }

    async fn abort_and_unwind(&self, wip_created: bool, timeout: Duration, progress: ProgressSink<'_>) {
        progress(ProgressEvent::new(ProgressStep::Abort, ProgressStatus::InProgress, "aborting rebase"));
        let _ = self.repo.rebase_abort(timeout).await;
        if wip_created {
            let _ = self.repo.reset_mixed_head_minus_one(timeout).await;
        }
        progress(ProgressEvent::new(ProgressStep::Abort, ProgressStatus::Done, "rebase aborted"));
    }
}

/// Validates the LLM's claimed resolution against on-disk truth for every
/// unmerged path, returning `(modified, deleted)` path lists to stage or
/// an error message on the first violation.
async fn validate_against_disk(
    workspace_path: &Path,
    unmerged: &[String],
    files: &BTreeMap<String, crate::response::FileResolution>,
) -> std::result::Result<(Vec<String>, Vec<String>), String> {
    let mut modified = Vec::new();
    let mut deleted = Vec::new();

    for path in unmerged {
        let Some(resolution) = files.get(path) else {
            return Err(format!("response did not mention unmerged path {path}"));
        };
        if Path::new(path).is_absolute() || path.split('/').any(|segment| segment == "..") {
            return Err(format!("response named an unsafe path: {path}"));
        }
        let full = workspace_path.join(path);
        match resolution.action {
            FileAction::Modified => {
                let content = tokio::fs::read_to_string(&full)
                    .await
                    .map_err(|e| format!("failed to read {path} after resolution: {e}"))?;
                if content.contains("<<<<<<<") || content.contains(">>>>>>>") {
                    return Err(format!("{path} still contains a conflict marker"));
                }
                modified.push(path.clone());
            }
            FileAction::Deleted => {
                if full.exists() {
                    return Err(format!("response claimed {path} was deleted but it still exists on disk"));
                }
                deleted.push(path.clone());
            }
        }
    }

    for path in files.keys() {
        if !unmerged.contains(path) {
            tracing::warn!(path = %path, "llm response mentioned a path outside the unmerged set, ignoring");
        }
    }

    Ok((modified, deleted))
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
