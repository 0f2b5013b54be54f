//! Typed progress stream for the Linear-Sync driver.
//!
//! The driver emits these synchronously as it works: a progress step a
//! synchronous callback renders, since a sync operation is a single request
//! rather than a long-lived job with its own subscriber set.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    CheckBehind,
    WipCommit,
    RebaseStart,
    ConflictDetected,
    LlmCall,
    RebaseContinue,
    WipUnwind,
    Abort,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub step: ProgressStep,
    pub status: ProgressStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ProgressEvent {
    pub fn new(step: ProgressStep, status: ProgressStatus, message: impl Into<String>) -> Self {
        Self { step, status, message: message.into(), context: BTreeMap::new() }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// A synchronous progress sink. Boxed as `dyn` rather than generic so the
/// driver's methods (which recurse through an async conflict loop) don't
/// need to be generic over the callback type.
pub type ProgressSink<'a> = &'a mut dyn FnMut(ProgressEvent);
