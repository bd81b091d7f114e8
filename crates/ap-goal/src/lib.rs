//! # ap-goal
//!
//! Goal lifecycle management for the Autopilot engine.
//!
//! A [`Goal`] is the user-facing objective the engine organizes work around.
//! The [`GoalManager`] owns the goal set: it decides which goal the next
//! cycle works on and is the only thing allowed to move progress.
//!
//! ## Key components
//!
//! - [`Goal`] - objective with priority, status, phase and progress
//! - [`GoalManager`] - selection, progress tracking, persistence flushing
//! - [`GoalStore`] - persistence boundary ([`GoalFileStore`], [`MemoryGoalStore`])
//! - [`GoalListener`] - receives `goal-progress` notifications

pub mod error;
pub mod goal;
pub mod manager;
pub mod store;

pub use error::GoalError;
pub use goal::{Goal, GoalCategory, GoalPhase, GoalStatus};
pub use manager::{GoalListener, GoalManager, GoalProgress};
pub use store::{GoalFileStore, GoalStore, MemoryGoalStore};
