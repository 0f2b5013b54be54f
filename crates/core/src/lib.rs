//! Shared domain types for the workspace & session lifecycle engine:
//! ids, error kinds, branch validation, run targets, and configuration.

pub mod branch;
pub mod config;
pub mod error;
pub mod id;
pub mod target;
pub mod workspace;

pub use branch::validate_branch_name;
pub use config::{Config, ConfigError, SourceCodeManagement, TerminalConfig};
pub use error::{Error, Result};
pub use id::{SessionId, WorktreeBaseId};
pub use target::{QuickLaunch, RunTarget, TargetKind, TargetSource, Variant};
pub use workspace::{BranchLookup, GitStatus, SafetyReasons, WorkspaceId};
