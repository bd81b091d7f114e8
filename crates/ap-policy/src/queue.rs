// queue.rs - Pending-approval queue.
//
// Holds references to actions the policy refused to auto-approve. The queue
// never blocks anything: the engine keeps cycling while entries wait here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ap_action::Action;

use crate::error::PolicyError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingApproval {
    pub action_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<Uuid>,
    pub title: String,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalQueue {
    entries: Vec<PendingApproval>,
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action that needs approval.
    pub fn enqueue(&mut self, action: &Action, now: DateTime<Utc>) -> Result<(), PolicyError> {
        if !action.requires_approval {
            return Err(PolicyError::AutoApproved(action.id));
        }
        if self.contains(action.id) {
            return Err(PolicyError::AlreadyQueued(action.id));
        }
        self.entries.push(PendingApproval {
            action_id: action.id,
            goal_id: action.goal_id,
            title: action.title.clone(),
            priority: action.priority,
            enqueued_at: now,
        });
        Ok(())
    }

    pub fn contains(&self, action_id: Uuid) -> bool {
        self.entries.iter().any(|e| e.action_id == action_id)
    }

    pub fn remove(&mut self, action_id: Uuid) -> Result<PendingApproval, PolicyError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.action_id == action_id)
            .ok_or(PolicyError::NotPending(action_id))?;
        Ok(self.entries.remove(index))
    }

    /// Entries in approval order: highest priority first, oldest first on ties.
    pub fn by_priority(&self) -> Vec<PendingApproval> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
        });
        entries
    }

    /// Remove and return everything, in approval order.
    pub fn drain_by_priority(&mut self) -> Vec<PendingApproval> {
        let entries = self.by_priority();
        self.entries.clear();
        entries
    }

    pub fn ids_for_goal(&self, goal_id: Uuid) -> Vec<Uuid> {
        self.entries
            .iter()
            .filter(|e| e.goal_id == Some(goal_id))
            .map(|e| e.action_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingApproval> {
        self.entries.iter()
    }
}
