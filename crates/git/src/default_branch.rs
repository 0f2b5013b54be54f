//! Default-branch detection.

use crate::repo::{GitRepo, Result};
use loom_core::BranchLookup;
use std::time::Duration;

const FALLBACK_CANDIDATES: &[&str] = &["main", "master", "develop"];

/// Probe, in order: `symbolic-ref refs/remotes/origin/HEAD`, `symbolic-ref
/// HEAD`, then the fallback candidates (first one that resolves to a local
/// or remote-tracking branch). A repo that resolves none of these caches as
/// `Unknown` so we don't retry the same slow failure on every call.
pub async fn detect_default_branch(repo: &GitRepo, timeout: Duration) -> Result<BranchLookup> {
    if let Some(branch) = repo.symbolic_ref_origin_head(timeout).await? {
        return Ok(BranchLookup::Known(branch));
    }
    if let Some(branch) = repo.symbolic_ref_head(timeout).await? {
        return Ok(BranchLookup::Known(branch));
    }
    for candidate in FALLBACK_CANDIDATES {
        if repo.remote_branch_exists(candidate, timeout).await?
            || repo.branch_exists(candidate, timeout).await?
        {
            return Ok(BranchLookup::Known((*candidate).to_string()));
        }
    }
    Ok(BranchLookup::Unknown)
}
