//! `GetDiff`: file-by-file diff against HEAD, including untracked files.

use crate::repo::{GitRepo, Result};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDiffStatus {
    Modified,
    Added,
    Deleted,
    Renamed,
    Untracked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub status: FileDiffStatus,
    pub additions: u32,
    pub deletions: u32,
    /// Empty for untracked files, which have no prior content to diff against.
    pub patch: String,
}

/// Combines `status --porcelain` (for classification, including untracked
/// entries `diff --numstat` never reports) with `diff --numstat`/`diff`
/// (for tracked-file line counts and patch text).
pub async fn diff_against_head(repo: &GitRepo, timeout: Duration) -> Result<Vec<FileDiff>> {
    let porcelain = repo.status_porcelain(timeout).await?;
    let numstat: HashMap<String, (u32, u32)> = repo
        .diff_numstat_per_file(timeout)
        .await?
        .into_iter()
        .map(|(path, added, removed)| (path, (added, removed)))
        .collect();

    let mut diffs = Vec::new();
    for line in porcelain.lines() {
        if line.len() < 3 {
            continue;
        }
        let code = &line[..2];
        let rest = line[3..].trim();

        if code == "??" {
            diffs.push(FileDiff {
                path: rest.to_string(),
                status: FileDiffStatus::Untracked,
                additions: 0,
                deletions: 0,
                patch: String::new(),
            });
            continue;
        }

        // Renames read "old -> new"; numstat/patch keys off the new path.
        let path = rest.split_once(" -> ").map(|(_, new)| new).unwrap_or(rest).to_string();
        let status = classify(code);
        let (additions, deletions) = numstat.get(&path).copied().unwrap_or((0, 0));
        let patch = repo.diff_patch_for_file(&path, timeout).await.unwrap_or_default();

        diffs.push(FileDiff { path, status, additions, deletions, patch });
    }

    Ok(diffs)
}

fn classify(code: &str) -> FileDiffStatus {
    if code.contains('A') {
        FileDiffStatus::Added
    } else if code.contains('D') {
        FileDiffStatus::Deleted
    } else if code.contains('R') {
        FileDiffStatus::Renamed
    } else {
        FileDiffStatus::Modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn reports_untracked_and_modified_files() {
        let dir = tempdir().unwrap();
        let repo = GitRepo::new(dir.path(), CancellationToken::new());
        repo.init_with_initial_commit("main", Duration::from_secs(5)).await.unwrap();

        tokio::fs::write(dir.path().join("tracked.txt"), "hello").await.unwrap();
        repo.add_paths(&["tracked.txt".to_string()], Duration::from_secs(5)).await.unwrap();
        repo.commit_all("add tracked", Duration::from_secs(5)).await.unwrap();
        tokio::fs::write(dir.path().join("tracked.txt"), "hello world").await.unwrap();
        tokio::fs::write(dir.path().join("new.txt"), "untracked").await.unwrap();

        let diffs = diff_against_head(&repo, Duration::from_secs(5)).await.unwrap();
        let untracked = diffs.iter().find(|d| d.path == "new.txt").unwrap();
        assert_eq!(untracked.status, FileDiffStatus::Untracked);
        assert!(untracked.patch.is_empty());

        let modified = diffs.iter().find(|d| d.path == "tracked.txt").unwrap();
        assert_eq!(modified.status, FileDiffStatus::Modified);
        assert!(modified.additions >= 1);
        assert!(!modified.patch.is_empty());
    }
}
