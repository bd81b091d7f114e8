//! # ap-action
//!
//! The unit of work the Autopilot engine proposes, approves and executes.
//!
//! An [`Action`] moves through a one-directional lifecycle:
//!
//! ```text
//! Proposed → Approved → Running → Completed
//!          ↘ Rejected          ↘ Failed
//! ```
//!
//! `Rejected`, `Completed` and `Failed` are terminal. Any attempt to move an
//! action out of a terminal state is refused with [`ActionError::Terminal`].

pub mod action;
pub mod error;

pub use action::{Action, ActionStatus, ActionType, ExecutionPlan, ProposedAction};
pub use error::ActionError;
