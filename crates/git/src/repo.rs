//! A thin async wrapper over the `git` CLI.

use crate::subprocess::{run_with_timeout, SubprocessError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum GitError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    #[error("git {label} failed (exit {code:?}): {stderr}")]
    CommandFailed { label: String, code: Option<i32>, stderr: String },

    #[error("unexpected git output for {label}: {detail}")]
    UnexpectedOutput { label: String, detail: String },
}

pub type Result<T> = std::result::Result<T, GitError>;

/// One git invocation context: a working directory, a deadline, and a
/// cancellation handle shared across a logical operation.
#[derive(Clone)]
pub struct GitRepo {
    dir: PathBuf,
    cancel: CancellationToken,
}

impl GitRepo {
    pub fn new(dir: impl Into<PathBuf>, cancel: CancellationToken) -> Self {
        Self { dir: dir.into(), cancel }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.dir).env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
        cmd
    }

    async fn run(&self, args: &[&str], timeout: Duration, label: &str) -> Result<std::process::Output> {
        let cmd = self.command(args);
        Ok(run_with_timeout(cmd, timeout, label, &self.cancel).await?)
    }

    async fn run_ok(&self, args: &[&str], timeout: Duration, label: &str) -> Result<String> {
        let output = self.run(args, timeout, label).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                label: label.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    // ---- Clone / fetch ----

    /// Clone `url` into `dest`, bare or regular. A bare mirror additionally
    /// gets a refspec so `fetch` populates `refs/remotes/origin/*` (a vanilla
    /// `--bare` clone does not configure one).
    pub async fn clone_repo(
        url: &str,
        dest: &Path,
        bare: bool,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<GitRepo> {
        let dest_str = dest.display().to_string();
        let mut args = vec!["clone"];
        if bare {
            args.push("--bare");
        }
        args.push(url);
        args.push(&dest_str);

        let mut cmd = Command::new("git");
        cmd.args(&args).env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
        let output = run_with_timeout(cmd, timeout, "git clone", cancel).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                label: "git clone".to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let repo = GitRepo::new(dest, cancel.clone());
        if bare {
            repo.run_ok(
                &[
                    "config",
                    "remote.origin.fetch",
                    "+refs/heads/*:refs/remotes/origin/*",
                ],
                timeout,
                "git config refspec",
            )
            .await?;
        }
        Ok(repo)
    }

    pub async fn fetch(&self, timeout: Duration) -> Result<()> {
        self.run_ok(&["fetch", "origin"], timeout, "git fetch").await?;
        Ok(())
    }

    // ---- Checkout / reset / branch ----

    pub async fn checkout_reset_to_ref(&self, git_ref: &str, timeout: Duration) -> Result<()> {
        self.run_ok(&["reset", "--hard", git_ref], timeout, "git reset --hard").await?;
        Ok(())
    }

    pub async fn discard_local_changes(&self, timeout: Duration) -> Result<()> {
        self.run_ok(&["checkout", "--", "."], timeout, "git checkout -- .").await.ok();
        self.run_ok(&["clean", "-fd"], timeout, "git clean -fd").await?;
        Ok(())
    }

    pub async fn create_branch_from_ref(
        &self,
        branch: &str,
        start_point: &str,
        timeout: Duration,
    ) -> Result<()> {
        self.run_ok(&["branch", branch, start_point], timeout, "git branch").await?;
        Ok(())
    }

    pub async fn checkout_branch(&self, branch: &str, timeout: Duration) -> Result<()> {
        self.run_ok(&["checkout", branch], timeout, "git checkout").await?;
        Ok(())
    }

    pub async fn delete_branch(&self, branch: &str, timeout: Duration) -> Result<()> {
        self.run_ok(&["branch", "-D", branch], timeout, "git branch -D").await?;
        Ok(())
    }

    pub async fn branch_exists(&self, branch: &str, timeout: Duration) -> Result<bool> {
        let output = self
            .run(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")], timeout, "git rev-parse")
            .await?;
        Ok(output.status.success())
    }

    pub async fn remote_branch_exists(&self, branch: &str, timeout: Duration) -> Result<bool> {
        let output = self
            .run(
                &["rev-parse", "--verify", "--quiet", &format!("refs/remotes/origin/{branch}")],
                timeout,
                "git rev-parse",
            )
            .await?;
        Ok(output.status.success())
    }

    /// Tip commit of `refs/remotes/origin/<branch>` if it exists, else the
    /// local `refs/heads/<branch>` tip, else `None`.
    pub async fn branch_tip(&self, branch: &str, timeout: Duration) -> Result<Option<String>> {
        for ref_name in [format!("refs/remotes/origin/{branch}"), format!("refs/heads/{branch}")] {
            let output = self.run(&["rev-parse", "--verify", "--quiet", &ref_name], timeout, "git rev-parse").await?;
            if output.status.success() {
                return Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()));
            }
        }
        Ok(None)
    }

    // ---- Worktrees ----

    pub async fn worktree_add(
        &self,
        path: &Path,
        branch: &str,
        start_point: &str,
        timeout: Duration,
    ) -> Result<()> {
        let path_str = path.display().to_string();
        self.run_ok(
            &["worktree", "add", "-b", branch, &path_str, start_point],
            timeout,
            "git worktree add",
        )
        .await?;
        Ok(())
    }

    pub async fn worktree_remove(&self, path: &Path, timeout: Duration) -> Result<()> {
        let path_str = path.display().to_string();
        self.run_ok(&["worktree", "remove", "--force", &path_str], timeout, "git worktree remove").await?;
        Ok(())
    }

    pub async fn worktree_prune(&self, timeout: Duration) -> Result<()> {
        self.run_ok(&["worktree", "prune"], timeout, "git worktree prune").await?;
        Ok(())
    }

    /// Parsed `git worktree list --porcelain`: `(path, branch)` pairs.
    pub async fn list_worktrees(&self, timeout: Duration) -> Result<Vec<(PathBuf, Option<String>)>> {
        let raw = self.run_ok(&["worktree", "list", "--porcelain"], timeout, "git worktree list").await?;
        let mut result = Vec::new();
        let mut current_path: Option<PathBuf> = None;
        let mut current_branch: Option<String> = None;
        for line in raw.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                if let Some(p) = current_path.take() {
                    result.push((p, current_branch.take()));
                }
                current_path = Some(PathBuf::from(path));
            } else if let Some(branch_ref) = line.strip_prefix("branch ") {
                current_branch = branch_ref.strip_prefix("refs/heads/").map(str::to_string);
            } else if line.is_empty() {
                if let Some(p) = current_path.take() {
                    result.push((p, current_branch.take()));
                }
            }
        }
        if let Some(p) = current_path.take() {
            result.push((p, current_branch.take()));
        }
        Ok(result)
    }

    // ---- Status ----

    /// `git status --porcelain` output; empty means clean.
    pub async fn status_porcelain(&self, timeout: Duration) -> Result<String> {
        self.run_ok(&["status", "--porcelain"], timeout, "git status --porcelain").await
    }

    /// `(ahead, behind)` from `rev-list --left-right --count HEAD...origin/<default>`.
    pub async fn rev_list_left_right(&self, default_branch: &str, timeout: Duration) -> Result<(u32, u32)> {
        let spec = format!("HEAD...origin/{default_branch}");
        let raw = self.run_ok(&["rev-list", "--left-right", "--count", &spec], timeout, "git rev-list").await?;
        let mut parts = raw.split_whitespace();
        let ahead = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| GitError::UnexpectedOutput {
            label: "git rev-list".to_string(),
            detail: raw.clone(),
        })?;
        let behind = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| GitError::UnexpectedOutput {
            label: "git rev-list".to_string(),
            detail: raw.clone(),
        })?;
        Ok((ahead, behind))
    }

    /// `(lines_added, lines_removed, files_changed)` from `diff --numstat HEAD`.
    pub async fn diff_numstat(&self, timeout: Duration) -> Result<(u32, u32, u32)> {
        let raw = self.run_ok(&["diff", "--numstat", "HEAD"], timeout, "git diff --numstat").await?;
        let mut added = 0u32;
        let mut removed = 0u32;
        let mut files = 0u32;
        for line in raw.lines() {
            let mut cols = line.split_whitespace();
            let a = cols.next().unwrap_or("0");
            let r = cols.next().unwrap_or("0");
            added += a.parse::<u32>().unwrap_or(0);
            removed += r.parse::<u32>().unwrap_or(0);
            files += 1;
        }
        Ok((added, removed, files))
    }

    pub async fn merge_base(&self, a: &str, b: &str, timeout: Duration) -> Result<String> {
        let raw = self.run_ok(&["merge-base", a, b], timeout, "git merge-base").await?;
        Ok(raw.trim().to_string())
    }

    /// Whether `ancestor` is an ancestor of (or equal to) `descendant`.
    pub async fn is_ancestor(&self, ancestor: &str, descendant: &str, timeout: Duration) -> Result<bool> {
        let output = self
            .run(&["merge-base", "--is-ancestor", ancestor, descendant], timeout, "git merge-base --is-ancestor")
            .await?;
        Ok(output.status.success())
    }

    /// `symbolic-ref refs/remotes/origin/HEAD`, stripped to a bare branch name.
    pub async fn symbolic_ref_origin_head(&self, timeout: Duration) -> Result<Option<String>> {
        let output = self
            .run(&["symbolic-ref", "refs/remotes/origin/HEAD"], timeout, "git symbolic-ref origin/HEAD")
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(raw.strip_prefix("refs/remotes/origin/").map(str::to_string))
    }

    pub async fn symbolic_ref_head(&self, timeout: Duration) -> Result<Option<String>> {
        let output = self.run(&["symbolic-ref", "HEAD"], timeout, "git symbolic-ref HEAD").await?;
        if !output.status.success() {
            return Ok(None);
        }
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(raw.strip_prefix("refs/heads/").map(str::to_string))
    }

    // ---- Rebase ----

    pub async fn rebase_onto(&self, commit: &str, timeout: Duration) -> Result<std::process::Output> {
        Ok(self.run(&["rebase", commit], timeout, "git rebase").await?)
    }

    /// `rebase --continue` with an editor that accepts the default message
    /// unattended, since this daemon never has a terminal attached to rebase.
    pub async fn rebase_continue(&self, timeout: Duration) -> Result<std::process::Output> {
        let mut cmd = self.command(&["rebase", "--continue"]);
        cmd.env("GIT_EDITOR", "true");
        Ok(run_with_timeout(cmd, timeout, "git rebase --continue", &self.cancel).await?)
    }

    pub async fn rebase_abort(&self, timeout: Duration) -> Result<()> {
        self.run(&["rebase", "--abort"], timeout, "git rebase --abort").await?;
        Ok(())
    }

    pub async fn rebase_in_progress(&self) -> bool {
        self.dir.join(".git").join("rebase-merge").exists()
            || self.dir.join(".git").join("rebase-apply").exists()
    }

    /// Hash and subject of `REBASE_HEAD`, the commit currently being replayed.
    pub async fn rebase_head_commit(&self, timeout: Duration) -> Result<(String, String)> {
        let hash = self.run_ok(&["rev-parse", "REBASE_HEAD"], timeout, "git rev-parse REBASE_HEAD").await?;
        let hash = hash.trim().to_string();
        let subject = self.run_ok(&["log", "-1", "--format=%s", &hash], timeout, "git log").await?;
        Ok((hash, subject.trim().to_string()))
    }

    /// Paths with unmerged entries (`diff --name-only --diff-filter=U`).
    pub async fn unmerged_paths(&self, timeout: Duration) -> Result<Vec<String>> {
        let raw =
            self.run_ok(&["diff", "--name-only", "--diff-filter=U"], timeout, "git diff --diff-filter=U").await?;
        Ok(raw.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    pub async fn add_paths(&self, paths: &[String], timeout: Duration) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_ok(&args, timeout, "git add").await?;
        Ok(())
    }

    pub async fn rm_ignore_unmatch(&self, paths: &[String], timeout: Duration) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["rm", "--ignore-unmatch", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_ok(&args, timeout, "git rm").await?;
        Ok(())
    }

    // ---- WIP commit / log ----

    pub async fn commit_all(&self, message: &str, timeout: Duration) -> Result<bool> {
        self.run_ok(&["add", "-A"], timeout, "git add -A").await?;
        let output = self.run(&["commit", "-m", message], timeout, "git commit").await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("nothing to commit") {
            return Ok(false);
        }
        Err(GitError::CommandFailed {
            label: "git commit".to_string(),
            code: output.status.code(),
            stderr: stderr.trim().to_string(),
        })
    }

    pub async fn reset_mixed_head_minus_one(&self, timeout: Duration) -> Result<()> {
        self.run_ok(&["reset", "--mixed", "HEAD~1"], timeout, "git reset --mixed").await?;
        Ok(())
    }

    /// Commits in `base..tip`, oldest first.
    pub async fn commits_between(&self, base: &str, tip: &str, timeout: Duration) -> Result<Vec<String>> {
        let spec = format!("{base}..{tip}");
        let raw = self.run_ok(&["rev-list", "--reverse", &spec], timeout, "git rev-list --reverse").await?;
        Ok(raw.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    pub async fn push(&self, refspec: Option<&str>, timeout: Duration) -> Result<()> {
        let mut args = vec!["push", "origin"];
        if let Some(r) = refspec {
            args.push(r);
        }
        self.run_ok(&args, timeout, "git push").await?;
        Ok(())
    }

    pub async fn push_set_upstream(&self, refspec: &str, timeout: Duration) -> Result<()> {
        self.run_ok(&["push", "-u", "origin", refspec], timeout, "git push -u").await?;
        Ok(())
    }

    pub async fn merge_ff_only(&self, git_ref: &str, timeout: Duration) -> Result<()> {
        self.run_ok(&["merge", "--ff-only", git_ref], timeout, "git merge --ff-only").await?;
        Ok(())
    }

    // ---- Diff (file-by-file) ----

    /// `(path, added, removed)` for every tracked file changed against HEAD,
    /// from `diff --numstat HEAD`.
    pub async fn diff_numstat_per_file(&self, timeout: Duration) -> Result<Vec<(String, u32, u32)>> {
        let raw = self.run_ok(&["diff", "--numstat", "HEAD"], timeout, "git diff --numstat").await?;
        let mut rows = Vec::new();
        for line in raw.lines() {
            let mut cols = line.splitn(3, '\t');
            let added = cols.next().unwrap_or("0");
            let removed = cols.next().unwrap_or("0");
            let path = cols.next().unwrap_or("").to_string();
            if path.is_empty() {
                continue;
            }
            rows.push((path, added.parse().unwrap_or(0), removed.parse().unwrap_or(0)));
        }
        Ok(rows)
    }

    /// Unified diff text for one tracked file against HEAD.
    pub async fn diff_patch_for_file(&self, path: &str, timeout: Duration) -> Result<String> {
        self.run_ok(&["diff", "HEAD", "--", path], timeout, "git diff HEAD -- <path>").await
    }

    // ---- Overlay / ignore ----

    /// Whether `relative_path` is ignored by source control (`check-ignore -q`).
    pub async fn is_ignored(&self, relative_path: &str, timeout: Duration) -> Result<bool> {
        let output =
            self.run(&["check-ignore", "-q", relative_path], timeout, "git check-ignore").await?;
        Ok(output.status.success())
    }

    // ---- Init (local: workspaces) ----

    pub async fn init_with_initial_commit(&self, branch: &str, timeout: Duration) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| GitError::Subprocess(SubprocessError::Wait { label: "mkdir".into(), source }))?;
        self.run_ok(&["init", "-b", branch], timeout, "git init").await?;
        self.run_ok(&["commit", "--allow-empty", "-m", "initial commit"], timeout, "git commit --allow-empty")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;
