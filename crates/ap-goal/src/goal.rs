// goal.rs - Goal: a user-facing objective with priority and progress.
//
// Status lifecycle:
//   Pending → Active → Completed
//   Pending | Active → Abandoned
// Phase only moves forward: Discovery → Execution → Review.
// Progress is clamped to [0, 1] and only decreases through `reset_progress`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GoalError;

/// Life area a goal belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GoalCategory {
    Finance,
    Health,
    Career,
    Learning,
    Personal,
    Social,
    #[serde(other)]
    Other,
}

impl fmt::Display for GoalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GoalCategory::Finance => "finance",
            GoalCategory::Health => "health",
            GoalCategory::Career => "career",
            GoalCategory::Learning => "learning",
            GoalCategory::Personal => "personal",
            GoalCategory::Social => "social",
            GoalCategory::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    Active,
    Completed,
    Abandoned,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalStatus::Pending => write!(f, "pending"),
            GoalStatus::Active => write!(f, "active"),
            GoalStatus::Completed => write!(f, "completed"),
            GoalStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl GoalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Abandoned)
    }

    pub fn can_transition_to(&self, next: GoalStatus) -> bool {
        matches!(
            (self, next),
            (GoalStatus::Pending, GoalStatus::Active)
                | (GoalStatus::Pending, GoalStatus::Completed)
                | (GoalStatus::Active, GoalStatus::Completed)
                | (GoalStatus::Pending, GoalStatus::Abandoned)
                | (GoalStatus::Active, GoalStatus::Abandoned)
        )
    }
}

/// Where the goal sits in its own work cycle.
///
/// Declared in order so `PartialOrd` gives us "later phase" comparisons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GoalPhase {
    Discovery,
    Execution,
    Review,
}

impl fmt::Display for GoalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalPhase::Discovery => write!(f, "discovery"),
            GoalPhase::Execution => write!(f, "execution"),
            GoalPhase::Review => write!(f, "review"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub category: GoalCategory,

    /// Higher is more urgent.
    pub priority: i32,

    pub status: GoalStatus,

    /// Fraction complete, always within [0, 1].
    pub progress: f64,

    pub phase: GoalPhase,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl Goal {
    /// Create a new pending goal in the discovery phase.
    pub fn new(title: impl Into<String>, category: GoalCategory, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            category,
            priority,
            status: GoalStatus::Pending,
            progress: 0.0,
            phase: GoalPhase::Discovery,
            created_at: now,
            updated_at: now,
            due_date: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Override the creation time (used when importing goals and in tests
    /// that depend on tie-breaking order).
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn transition(&mut self, next: GoalStatus) -> Result<(), GoalError> {
        if !self.status.can_transition_to(next) {
            return Err(GoalError::InvalidTransition {
                goal_id: self.id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Add `delta` to progress, clamped to [0, 1]. Negative deltas are
    /// ignored; use [`Goal::reset_progress`] to move backwards.
    ///
    /// Returns the previous value.
    pub fn advance(&mut self, delta: f64) -> f64 {
        let previous = self.progress;
        let delta = if delta.is_finite() { delta.max(0.0) } else { 0.0 };
        self.progress = (previous + delta).clamp(0.0, 1.0);
        self.updated_at = Utc::now();
        previous
    }

    pub fn reset_progress(&mut self) {
        self.progress = 0.0;
        self.updated_at = Utc::now();
    }

    pub fn set_phase(&mut self, phase: GoalPhase) -> Result<(), GoalError> {
        if phase < self.phase {
            return Err(GoalError::InvalidTransition {
                goal_id: self.id,
                from: self.phase.to_string(),
                to: phase.to_string(),
            });
        }
        self.phase = phase;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_goal_is_pending_discovery() {
        let goal = Goal::new("Run a marathon", GoalCategory::Health, 7);
        assert_eq!(goal.status, GoalStatus::Pending);
        assert_eq!(goal.phase, GoalPhase::Discovery);
        assert_eq!(goal.progress, 0.0);
    }

    #[test]
    fn advance_clamps_and_ignores_negative() {
        let mut goal = Goal::new("Save", GoalCategory::Finance, 1);
        goal.advance(0.7);
        goal.advance(0.7);
        assert_eq!(goal.progress, 1.0);
        goal.advance(-0.5);
        assert_eq!(goal.progress, 1.0);
        goal.reset_progress();
        assert_eq!(goal.progress, 0.0);
    }

    #[test]
    fn terminal_status_cannot_change() {
        let mut goal = Goal::new("Learn Rust", GoalCategory::Learning, 3);
        goal.transition(GoalStatus::Abandoned).unwrap();
        let result = goal.transition(GoalStatus::Active);
        assert!(matches!(result, Err(GoalError::InvalidTransition { .. })));
    }

    #[test]
    fn phase_moves_forward_only() {
        let mut goal = Goal::new("Ship", GoalCategory::Career, 2);
        goal.set_phase(GoalPhase::Review).unwrap();
        assert!(goal.set_phase(GoalPhase::Execution).is_err());
        assert_eq!(goal.phase, GoalPhase::Review);
    }

    #[test]
    fn unknown_category_deserializes_as_other() {
        let goal = Goal::new("x", GoalCategory::Personal, 1);
        let json = serde_json::to_string(&goal)
            .unwrap()
            .replace("\"personal\"", "\"spiritual\"");
        let restored: Goal = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.category, GoalCategory::Other);
    }
}
