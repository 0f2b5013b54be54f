//! The Linear-Sync / Conflict-Resolver: an iterative rebase
//! driver that replays commits one at a time and, on conflict, hands the
//! conflicted files to a one-shot LLM invocation, validates its reported
//! resolution against on-disk truth, stages it, and continues or aborts
//! with full unwind.

pub mod driver;
pub mod llm;
pub mod progress;
pub mod response;

pub use driver::{
    ConflictResolution, FromDefaultOutcome, ResolveConflictOutcome, SyncDriver, SyncError, ToDefaultOutcome,
};
pub use llm::{CliLlmClient, LlmClient, LlmError};
pub use progress::{ProgressEvent, ProgressSink, ProgressStatus, ProgressStep};
pub use response::{build_prompt, parse_response, ConflictResolutionResponse, FileAction, FileResolution};
