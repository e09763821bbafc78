//! Local player session
//!
//! Owns the local identity and drives join, leave, rename and skin changes
//! against the presence store. One manager per running client, created by the
//! application entry point and passed by reference to whatever needs it.

pub mod heartbeat;
pub mod manager;
pub mod state;

pub use manager::{ResumeOutcome, SessionConfig, SessionManager};
pub use state::{ActivePlayer, SessionState};

use crate::handle::HandleViolation;
use crate::store::StoreError;

/// Session errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("please enter a handle")]
    EmptyHandle,
    #[error("{0}")]
    Validation(#[from] HandleViolation),
    #[error("handle already taken: {0}")]
    Conflict(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no active session")]
    NotActive,
    #[error("already joined")]
    AlreadyActive,
}
