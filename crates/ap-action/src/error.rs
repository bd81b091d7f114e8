// error.rs - Error types for the action lifecycle.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised when mutating an [`Action`](crate::Action).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The action already reached a terminal state and is immutable.
    #[error("action {action_id} is {status} and can no longer change")]
    Terminal { action_id: Uuid, status: String },

    /// The requested transition would skip or reverse a lifecycle step.
    #[error("invalid transition from {from} to {to} for action {action_id}")]
    InvalidTransition {
        action_id: Uuid,
        from: String,
        to: String,
    },
}
