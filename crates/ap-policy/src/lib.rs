//! # ap-policy
//!
//! Decides which actions run on their own and which wait for a human.
//!
//! The rule is a single set lookup: an action whose type is in the
//! auto-approve set runs immediately, everything else goes to the
//! [`ApprovalQueue`] until an external approver resolves it.
//!
//! ## Key invariants
//!
//! - **Frozen decision**: `requires_approval` is computed once, when the
//!   action is created; later policy changes do not re-classify it.
//! - **Auto-approved never queued**: the queue only ever holds actions the
//!   policy said need approval.

pub mod approval;
pub mod error;
pub mod queue;

pub use approval::{ApprovalDecision, ApprovalPolicy, default_auto_approve};
pub use error::PolicyError;
pub use queue::{ApprovalQueue, PendingApproval};
