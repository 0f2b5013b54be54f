//! Request/response DTOs and length-prefixed JSON framing for the control
//! socket: one `Request`/`Response` variant per route, framed as a 4-byte
//! big-endian length prefix followed by the JSON payload.

mod request;
mod response;
mod types;
mod wire;

pub use request::Request;
pub use response::Response;
pub use types::{
    ConfigPatch, ConflictResolutionEntry, DiffEntry, DiffFileStatus, OverlaySummary, ScanReport,
    SessionResult, SessionSummary, SpawnTargets, SyncFromDefaultResult, SyncProgressEntry,
    SyncProgressStatus, SyncProgressStep, SyncToDefaultResult, WorkspaceGroup, WorkspaceSummary,
};
pub use wire::{
    decode, encode, read_message, read_request, write_message, write_response, ProtocolError,
    PROTOCOL_VERSION,
};
