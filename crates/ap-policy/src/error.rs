// error.rs - Error types for the approval subsystem.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The action is not waiting for approval.
    #[error("action {0} is not pending approval")]
    NotPending(Uuid),

    /// The action is already in the pending queue.
    #[error("action {0} is already queued for approval")]
    AlreadyQueued(Uuid),

    /// Policy said the action runs automatically, so it may not be queued.
    #[error("action {0} is auto-approved and cannot be queued")]
    AutoApproved(Uuid),
}
