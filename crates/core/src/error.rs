//! Shared error kinds.
//!
//! Every crate's local error type converts into this one at the
//! listener/daemon boundary, composing per-crate errors into one
//! top-level error at the connection handler.

use crate::workspace::SafetyReasons;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsafe to proceed: {0}")]
    Unsafe(SafetyReasons),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invariant violated while unwinding: {0}")]
    Invariant(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound { kind, id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
