// handoff.rs - Short-lived context carried from one cycle to the next.

use ap_action::Action;
use ap_goal::Goal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot written at the end of each executing phase and read once at the
/// start of the next selection. Past `expires_at` it is treated as absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl HandoffContext {
    pub fn new(goal: Option<&Goal>, last_action: Option<&Action>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            goal_id: goal.map(|g| g.id),
            goal_title: goal.map(|g| g.title.clone()),
            last_action_id: last_action.map(|a| a.id),
            last_action_summary: last_action.map(Action::summary),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The handoff if it is still valid at `now`.
    pub fn valid_at(handoff: Option<&HandoffContext>, now: DateTime<Utc>) -> Option<&HandoffContext> {
        handoff.filter(|h| !h.is_expired(now))
    }
}
