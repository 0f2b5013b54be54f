//! Overlay Service: inject non-tracked files after materialization.

use loom_git::repo::GitRepo;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `~/.config/loom/overlays/<repoName>/` mirrored into a freshly materialized
/// workspace. Plain files whose destination-relative path is **not** ignored
/// by source control are skipped with a warning — an overlay must never
/// introduce committable state.
pub async fn apply_overlay(
    repo_name: &str,
    workspace_path: &Path,
    timeout: Duration,
) -> crate::error::Result<()> {
    let overlay_root = overlay_dir(repo_name);
    if !overlay_root.exists() {
        return Ok(());
    }

    let repo = GitRepo::new(workspace_path, CancellationToken::new());
    walk(&overlay_root, &overlay_root, workspace_path, &repo, timeout).await
}

/// `~/.config/loom/overlays/` — the root [`apply_overlay`] mirrors per-repo
/// overlay content from.
pub fn overlays_root() -> std::path::PathBuf {
    std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".config")
        .join("loom")
        .join("overlays")
}

fn overlay_dir(repo_name: &str) -> std::path::PathBuf {
    overlays_root().join(repo_name)
}

/// One entry per subdirectory of [`overlays_root`], with a recursive file
/// count.
pub async fn list_overlays() -> std::io::Result<Vec<(String, u32)>> {
    let root = overlays_root();
    let mut out = Vec::new();
    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let repo_name = entry.file_name().to_string_lossy().to_string();
        let count = count_files(&entry.path()).await?;
        out.push((repo_name, count));
    }
    Ok(out)
}

fn count_files(
    dir: &Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<u32>> + Send + '_>> {
    Box::pin(async move {
        let mut count = 0u32;
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                count += count_files(&entry.path()).await?;
            } else {
                count += 1;
            }
        }
        Ok(count)
    })
}

fn walk<'a>(
    base: &'a Path,
    dir: &'a Path,
    workspace_path: &'a Path,
    repo: &'a GitRepo,
    timeout: Duration,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = crate::error::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            loom_core::Error::Transient(format!("reading overlay dir {}: {e}", dir.display()))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| loom_core::Error::Transient(format!("reading overlay entry: {e}")))?
        {
            let source = entry.path();
            let relative = source.strip_prefix(base).expect("entry is under base by construction");
            let dest = workspace_path.join(relative);
            let relative_str = relative.to_string_lossy().to_string();

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| loom_core::Error::Transient(format!("stat overlay entry: {e}")))?;

            if file_type.is_dir() {
                tokio::fs::create_dir_all(&dest).await.map_err(|e| {
                    loom_core::Error::Transient(format!("creating overlay dir {}: {e}", dest.display()))
                })?;
                walk(base, &source, workspace_path, repo, timeout).await?;
                continue;
            }

            if file_type.is_symlink() {
                let target = tokio::fs::read_link(&source).await.map_err(|e| {
                    loom_core::Error::Transient(format!("reading overlay symlink {}: {e}", source.display()))
                })?;
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await.ok();
                }
                #[cfg(unix)]
                tokio::fs::symlink(&target, &dest).await.map_err(|e| {
                    loom_core::Error::Transient(format!("linking overlay {}: {e}", dest.display()))
                })?;
                continue;
            }

            let ignored = repo.is_ignored(&relative_str, timeout).await.unwrap_or(false);
            if !ignored {
                tracing::warn!(path = %relative_str, "overlay file is not git-ignored, skipping");
                continue;
            }

            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            tokio::fs::copy(&source, &dest).await.map_err(|e| {
                loom_core::Error::Transient(format!("copying overlay file {}: {e}", dest.display()))
            })?;

            if let Ok(metadata) = tokio::fs::metadata(&source).await {
                let _ = tokio::fs::set_permissions(&dest, metadata.permissions()).await;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[tokio::test]
    async fn non_ignored_file_is_skipped() {
        let repo_dir = tempdir().unwrap();
        let repo = GitRepo::new(repo_dir.path(), CancellationToken::new());
        repo.init_with_initial_commit("main", Duration::from_secs(5)).await.unwrap();

        let overlay_dir = tempdir().unwrap();
        tokio::fs::write(overlay_dir.path().join("untracked.txt"), "hi").await.unwrap();

        walk(
            overlay_dir.path(),
            overlay_dir.path(),
            repo_dir.path(),
            &repo,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(!repo_dir.path().join("untracked.txt").exists());
    }

    #[tokio::test]
    async fn ignored_file_is_copied() {
        let repo_dir = tempdir().unwrap();
        let repo = GitRepo::new(repo_dir.path(), CancellationToken::new());
        repo.init_with_initial_commit("main", Duration::from_secs(5)).await.unwrap();
        tokio::fs::write(repo_dir.path().join(".gitignore"), "secrets.env\n").await.unwrap();

        let overlay_dir = tempdir().unwrap();
        tokio::fs::write(overlay_dir.path().join("secrets.env"), "TOKEN=abc").await.unwrap();

        walk(
            overlay_dir.path(),
            overlay_dir.path(),
            repo_dir.path(),
            &repo,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let contents = tokio::fs::read_to_string(repo_dir.path().join("secrets.env")).await.unwrap();
        assert_eq!(contents, "TOKEN=abc");
    }

    #[tokio::test]
    async fn count_files_recurses_into_subdirectories() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "x").await.unwrap();
        tokio::fs::create_dir_all(dir.path().join("nested")).await.unwrap();
        tokio::fs::write(dir.path().join("nested").join("b.txt"), "y").await.unwrap();

        let count = count_files(dir.path()).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    #[serial]
    async fn missing_overlays_root_yields_empty_list() {
        std::env::set_var("HOME", "/nonexistent-loom-overlay-test-root");
        let overlays = list_overlays().await.unwrap();
        assert!(overlays.is_empty());
    }
}
