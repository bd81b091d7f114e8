// error.rs - Error types for the goal subsystem.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during goal operations.
#[derive(Debug, Error)]
pub enum GoalError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize goal data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A persisted goal record could not be parsed.
    #[error("corrupt goal record at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// The backing store refused the operation.
    #[error("goal store unavailable: {0}")]
    StoreUnavailable(String),

    /// The requested goal was not found.
    #[error("goal not found: {0}")]
    NotFound(Uuid),

    /// Invalid status or phase transition.
    #[error("invalid transition from {from} to {to} for goal {goal_id}")]
    InvalidTransition {
        goal_id: Uuid,
        from: String,
        to: String,
    },
}

impl GoalError {
    /// Whether this error came from the persistence layer rather than from
    /// a rejected operation.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            GoalError::IoError { .. }
                | GoalError::SerializationError(_)
                | GoalError::Corrupt { .. }
                | GoalError::StoreUnavailable(_)
        )
    }
}
