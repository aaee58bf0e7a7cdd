//! Error types for botqueue
//!
//! Centralized error handling using thiserror. Request rejections are not
//! errors; see [`crate::domain::Rejection`].

use thiserror::Error;

/// All error types that can occur in botqueue
#[derive(Debug, Error)]
pub enum BotqueueError {
    /// Request failed basic validation before scheduling
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No active request for the given target
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    /// Data store (cooldowns, statistics) error
    #[error("Store error: {0}")]
    Store(String),
}

/// Result type alias for botqueue operations
pub type Result<T> = std::result::Result<T, BotqueueError>;
