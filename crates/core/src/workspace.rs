//! Workspace identifier, status snapshot, and the default-branch cache.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a workspace: `<repo-name>-NNN`.
///
/// Unlike [`crate::SessionId`], this is not nanoid-backed: the numeric
/// suffix is a meaningful value (the lowest unused positive integer for its
/// repo URL, per the workspace-id invariant) rather than an opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub String);

impl WorkspaceId {
    pub fn new(repo_name: &str, suffix: u32) -> Self {
        Self(format!("{repo_name}-{suffix:03}"))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric suffix, if this id parses as `<repo>-NNN`.
    pub fn suffix(&self) -> Option<u32> {
        self.0.rsplit_once('-').and_then(|(_, n)| n.parse().ok())
    }

    /// The repo-name prefix, if this id parses as `<repo>-NNN`.
    pub fn repo_name(&self) -> Option<&str> {
        self.0.rsplit_once('-').map(|(repo, _)| repo)
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for WorkspaceId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for WorkspaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for WorkspaceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Snapshot of a working copy's source-control status, as last observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    pub dirty: bool,
    pub ahead: u32,
    pub behind: u32,
    pub lines_added: u32,
    pub lines_removed: u32,
    pub files_changed: u32,
}

/// The default-branch cache's value for one repo URL.
///
/// A tagged enum rather than a bare `Option<String>` or the literal string
/// `"unknown"` — encoding "we tried and failed" as data prevents ever
/// accidentally treating the sentinel as a real branch name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchLookup {
    Known(String),
    Unknown,
}

impl BranchLookup {
    pub fn as_branch(&self) -> Option<&str> {
        match self {
            BranchLookup::Known(b) => Some(b.as_str()),
            BranchLookup::Unknown => None,
        }
    }
}

/// Why a [`crate::Error::Unsafe`] dispose/sync was refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyReasons {
    pub modified_files: u32,
    pub untracked_files: u32,
    pub unpushed_commits: u32,
}

impl SafetyReasons {
    pub fn is_safe(&self) -> bool {
        self.modified_files == 0 && self.untracked_files == 0 && self.unpushed_commits == 0
    }
}

impl fmt::Display for SafetyReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.modified_files > 0 {
            parts.push(format!("{} modified file(s)", self.modified_files));
        }
        if self.untracked_files > 0 {
            parts.push(format!("{} untracked file(s)", self.untracked_files));
        }
        if self.unpushed_commits > 0 {
            parts.push(format!("{} unpushed commit(s)", self.unpushed_commits));
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffix_and_repo_name() {
        let id = WorkspaceId::new("myrepo", 7);
        assert_eq!(id.as_str(), "myrepo-007");
        assert_eq!(id.suffix(), Some(7));
        assert_eq!(id.repo_name(), Some("myrepo"));
    }

    #[test]
    fn safety_reasons_message_enumerates_counts() {
        let reasons = SafetyReasons { modified_files: 1, untracked_files: 0, unpushed_commits: 2 };
        assert_eq!(reasons.to_string(), "1 modified file(s), 2 unpushed commit(s)");
        assert!(!reasons.is_safe());
    }

    #[test]
    fn empty_reasons_is_safe() {
        assert!(SafetyReasons::default().is_safe());
    }
}
