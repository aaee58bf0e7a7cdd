//! External collaborators the scheduler depends on
//!
//! This module provides:
//! - ActionClient trait for the remote "post comment" call, plus the error taxonomy
//! - DataStore trait for user cooldowns and action statistics
//! - Responder trait for replying to the requester
//! - In-memory and mock implementations for tests and dry runs

pub mod action;
pub mod respond;
pub mod store;

pub use action::{
    ActionClient, ActionError, ActionErrorKind, DryRunActionClient, MockActionClient, PenaltyScope, RecordedCall,
};
pub use respond::{LogResponder, RecordingResponder, Responder};
pub use store::{DataStore, MemoryDataStore};
