//! Local error type, converting into [`loom_core::Error`] at the daemon/listener boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Core(#[from] loom_core::Error),

    #[error(transparent)]
    Git(#[from] loom_git::repo::GitError),

    #[error(transparent)]
    Store(#[from] loom_storage::StoreError),

    #[error("workspace '{0}' not found")]
    NotFound(String),

    #[error("workspace '{0}' has active sessions")]
    HasActiveSessions(String),

    #[error("unsafe to dispose workspace '{0}': {1}")]
    Unsafe(String, loom_core::SafetyReasons),
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;

impl From<WorkspaceError> for loom_core::Error {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::Core(e) => e,
            WorkspaceError::Git(e) => loom_core::Error::Transient(e.to_string()),
            WorkspaceError::Store(e) => loom_core::Error::Invariant(e.to_string()),
            WorkspaceError::NotFound(id) => loom_core::Error::not_found("workspace", id),
            WorkspaceError::HasActiveSessions(id) => {
                loom_core::Error::Conflict(format!("workspace '{id}' has active sessions"))
            }
            WorkspaceError::Unsafe(_, reasons) => loom_core::Error::Unsafe(reasons),
        }
    }
}
