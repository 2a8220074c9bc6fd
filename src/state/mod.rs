//! State management module.
//!
//! This module persists the observed state of every declared instance
//! between runs, and guards a run with an advisory lock.

mod store;
mod local;
mod lock;
mod types;

pub use store::StateStore;
pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use types::{
    HistoryEntry, HistoryOperation, ResourceRecord, STATE_VERSION, WorkspaceState, address,
};
