//! `UpdateGitStatus`: assemble a [`GitStatus`] snapshot.

use crate::repo::{GitRepo, Result};
use loom_core::{GitStatus, SafetyReasons};
use std::time::Duration;

/// Dirty if porcelain output is non-empty; ahead/behind from
/// `rev-list --left-right --count`; line/file counts from `diff --numstat`.
/// Ahead/behind are left at zero if `default_branch` has no remote-tracking
/// ref (e.g. the repo was never pushed, or detection failed).
pub async fn update_git_status(repo: &GitRepo, default_branch: &str, timeout: Duration) -> Result<GitStatus> {
    let porcelain = repo.status_porcelain(timeout).await?;
    let dirty = !porcelain.trim().is_empty();

    let (ahead, behind) = if repo.remote_branch_exists(default_branch, timeout).await? {
        repo.rev_list_left_right(default_branch, timeout).await?
    } else {
        (0, 0)
    };

    let (lines_added, lines_removed, files_changed) = repo.diff_numstat(timeout).await?;

    Ok(GitStatus { dirty, ahead, behind, lines_added, lines_removed, files_changed })
}

/// Safe to dispose iff porcelain output is empty and nothing is ahead of
/// upstream. The `SafetyReasons` breakdown enumerates modified (tracked,
/// changed) vs. untracked (`??`) porcelain entries and the ahead count.
pub async fn git_safety(repo: &GitRepo, default_branch: &str, timeout: Duration) -> Result<SafetyReasons> {
    let porcelain = repo.status_porcelain(timeout).await?;
    let mut modified_files = 0u32;
    let mut untracked_files = 0u32;
    for line in porcelain.lines() {
        if line.starts_with("??") {
            untracked_files += 1;
        } else if !line.trim().is_empty() {
            modified_files += 1;
        }
    }

    let unpushed_commits = if repo.remote_branch_exists(default_branch, timeout).await? {
        repo.rev_list_left_right(default_branch, timeout).await?.0
    } else {
        0
    };

    Ok(SafetyReasons { modified_files, untracked_files, unpushed_commits })
}
