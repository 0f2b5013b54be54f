//! The process-wide inventory of workspaces, sessions, and shared bare
//! repositories, with durable JSON persistence.

pub mod helpers;
pub mod store;
pub mod types;

pub use store::{StateStore, StoreError};
pub use types::{Inventory, QueryMirror, Session, WorktreeBase, Workspace};
