// action.rs - Action: one unit of proposed or executed work.
//
// The status machine is strictly forward:
//   Proposed → Approved → Running → Completed | Failed
//   Proposed → Rejected
// Terminal states (Rejected, Completed, Failed) never change again.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ActionError;

/// Machine-readable classification of an action.
///
/// This is the only field the approval policy looks at. Proposers may send
/// types we don't know about; those are kept verbatim in `Other` so they can
/// still be listed in the auto-approve set by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Research,
    Analyze,
    Plan,
    Execute,
    Communicate,
    Monitor,
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Research => "research",
            ActionType::Analyze => "analyze",
            ActionType::Plan => "plan",
            ActionType::Execute => "execute",
            ActionType::Communicate => "communicate",
            ActionType::Monitor => "monitor",
            ActionType::Other(name) => name,
        }
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "research" => ActionType::Research,
            "analyze" | "analyse" | "analysis" => ActionType::Analyze,
            "plan" | "planning" => ActionType::Plan,
            "execute" | "execution" => ActionType::Execute,
            "communicate" | "communication" => ActionType::Communicate,
            "monitor" | "monitoring" => ActionType::Monitor,
            other => ActionType::Other(other.to_string()),
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        ActionType::from(value.as_str())
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for ActionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ActionType::from(s))
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActionStatus {
    /// Returned by the proposer, not yet approved.
    Proposed,
    /// Cleared to run, either by policy or by a human.
    Approved,
    /// Declined by a human (or cascaded from an abandoned goal).
    Rejected { reason: String },
    /// Handed to a backend.
    Running,
    /// The backend stream ended with `end`.
    Completed,
    /// The backend stream ended with `error`, or no backend could run it.
    Failed,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Proposed => write!(f, "proposed"),
            ActionStatus::Approved => write!(f, "approved"),
            ActionStatus::Rejected { .. } => write!(f, "rejected"),
            ActionStatus::Running => write!(f, "running"),
            ActionStatus::Completed => write!(f, "completed"),
            ActionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Rejected { .. } | ActionStatus::Completed | ActionStatus::Failed
        )
    }

    /// Check whether moving from this state to `next` follows the chain
    /// without skipping or reversing a step.
    pub fn can_transition_to(&self, next: &ActionStatus) -> bool {
        matches!(
            (self, next),
            (ActionStatus::Proposed, ActionStatus::Approved)
                | (ActionStatus::Proposed, ActionStatus::Rejected { .. })
                | (ActionStatus::Approved, ActionStatus::Running)
                | (ActionStatus::Running, ActionStatus::Completed)
                | (ActionStatus::Running, ActionStatus::Failed)
        )
    }
}

/// How an action should be run: which backend (if pinned) and what to send it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionPlan {
    /// Backend the action was dispatched to. Empty until execution starts
    /// unless the proposer pinned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<String>,

    /// The instruction handed to the backend.
    pub prompt: String,

    /// Extra backend parameters, forwarded untouched.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// A candidate action as returned by the proposer, before policy is applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedAction {
    pub title: String,

    #[serde(rename = "type")]
    pub action_type: ActionType,

    /// Why the proposer thinks this is worth doing.
    #[serde(default, alias = "rationale")]
    pub description: String,

    #[serde(default)]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<Uuid>,

    /// Explicit backend prompt. Falls back to title + description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<String>,

    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ProposedAction {
    pub fn new(title: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            title: title.into(),
            action_type,
            description: String::new(),
            priority: 0,
            goal_id: None,
            prompt: None,
            backend_id: None,
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_goal(mut self, goal_id: Uuid) -> Self {
        self.goal_id = Some(goal_id);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Identity used to recognise the same proposal across cycles.
    pub fn fingerprint(&self) -> String {
        fingerprint(self.goal_id, &self.action_type, &self.title)
    }
}

/// An action tracked by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<Uuid>,

    pub title: String,

    #[serde(rename = "type")]
    pub action_type: ActionType,

    pub description: String,

    /// Higher runs first.
    pub priority: i32,

    /// Decided by policy when the action is created, never recomputed.
    pub requires_approval: bool,

    pub plan: ExecutionPlan,

    pub status: ActionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub proposed_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Action {
    /// Materialize a proposal. `requires_approval` comes from the approval
    /// policy and is frozen from here on.
    pub fn from_proposal(
        proposal: ProposedAction,
        requires_approval: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let prompt = proposal.prompt.unwrap_or_else(|| {
            if proposal.description.is_empty() {
                proposal.title.clone()
            } else {
                format!("{}\n\n{}", proposal.title, proposal.description)
            }
        });
        Self {
            id: Uuid::new_v4(),
            goal_id: proposal.goal_id,
            title: proposal.title,
            action_type: proposal.action_type,
            description: proposal.description,
            priority: proposal.priority,
            requires_approval,
            plan: ExecutionPlan {
                backend_id: proposal.backend_id,
                prompt,
                parameters: proposal.parameters,
            },
            status: ActionStatus::Proposed,
            result: None,
            error: None,
            proposed_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `next`, refusing anything that leaves a terminal state or
    /// skips a step.
    pub fn transition(&mut self, next: ActionStatus) -> Result<(), ActionError> {
        if self.status.is_terminal() {
            return Err(ActionError::Terminal {
                action_id: self.id,
                status: self.status.to_string(),
            });
        }
        if !self.status.can_transition_to(&next) {
            return Err(ActionError::InvalidTransition {
                action_id: self.id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn approve(&mut self) -> Result<(), ActionError> {
        self.transition(ActionStatus::Approved)
    }

    pub fn reject(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), ActionError> {
        self.transition(ActionStatus::Rejected {
            reason: reason.into(),
        })?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn start(&mut self, backend_id: impl Into<String>, now: DateTime<Utc>) -> Result<(), ActionError> {
        self.transition(ActionStatus::Running)?;
        self.plan.backend_id = Some(backend_id.into());
        self.started_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, result: impl Into<String>, now: DateTime<Utc>) -> Result<(), ActionError> {
        self.transition(ActionStatus::Completed)?;
        self.result = Some(result.into());
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), ActionError> {
        self.transition(ActionStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn is_pending_approval(&self) -> bool {
        self.status == ActionStatus::Proposed && self.requires_approval
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(self.goal_id, &self.action_type, &self.title)
    }

    /// One-line description used in handoff snapshots and log messages.
    pub fn summary(&self) -> String {
        match (&self.status, &self.error) {
            (ActionStatus::Failed, Some(err)) => {
                format!("[{}] {} (failed: {})", self.action_type, self.title, err)
            }
            _ => format!("[{}] {} ({})", self.action_type, self.title, self.status),
        }
    }
}

fn fingerprint(goal_id: Option<Uuid>, action_type: &ActionType, title: &str) -> String {
    let normalized = title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let goal = goal_id.map(|id| id.to_string()).unwrap_or_default();
    format!("{}|{}|{}", goal, action_type, normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn research_action() -> Action {
        Action::from_proposal(
            ProposedAction::new("Research X", ActionType::Research).with_priority(5),
            false,
            Utc::now(),
        )
    }

    #[test]
    fn new_action_starts_proposed() {
        let action = research_action();
        assert_eq!(action.status, ActionStatus::Proposed);
        assert_eq!(action.plan.prompt, "Research X");
        assert!(action.started_at.is_none());
    }

    #[test]
    fn full_forward_chain_succeeds() {
        let mut action = research_action();
        let now = Utc::now();
        action.approve().unwrap();
        action.start("agentic", now).unwrap();
        action.complete("done", now).unwrap();
        assert_eq!(action.status, ActionStatus::Completed);
        assert_eq!(action.result.as_deref(), Some("done"));
        assert_eq!(action.plan.backend_id.as_deref(), Some("agentic"));
    }

    #[test]
    fn cannot_skip_approval() {
        let mut action = research_action();
        let result = action.start("agentic", Utc::now());
        assert!(matches!(result, Err(ActionError::InvalidTransition { .. })));
        assert_eq!(action.status, ActionStatus::Proposed);
    }

    #[test]
    fn terminal_states_are_immutable() {
        let now = Utc::now();

        let mut rejected = research_action();
        rejected.reject("no", now).unwrap();
        assert!(matches!(
            rejected.approve(),
            Err(ActionError::Terminal { .. })
        ));

        let mut failed = research_action();
        failed.approve().unwrap();
        failed.start("plain", now).unwrap();
        failed.fail("boom", now).unwrap();
        assert!(matches!(
            failed.complete("late", now),
            Err(ActionError::Terminal { .. })
        ));
        assert!(failed.result.is_none());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn unknown_type_is_preserved() {
        let parsed: ActionType = "Negotiate".parse().unwrap();
        assert_eq!(parsed, ActionType::Other("negotiate".to_string()));
        assert_eq!(parsed.to_string(), "negotiate");
    }

    #[test]
    fn proposal_accepts_rationale_alias() {
        let json = r#"{"title":"Send Email","type":"execute","rationale":"follow up","priority":3}"#;
        let proposal: ProposedAction = serde_json::from_str(json).unwrap();
        assert_eq!(proposal.action_type, ActionType::Execute);
        assert_eq!(proposal.description, "follow up");
        assert_eq!(proposal.priority, 3);
    }

    #[test]
    fn fingerprint_ignores_case_and_spacing() {
        let a = ProposedAction::new("Send  Email", ActionType::Execute);
        let b = ProposedAction::new("send email", ActionType::Execute);
        let c = ProposedAction::new("send email", ActionType::Research);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let json = serde_json::to_string(&ActionStatus::Rejected {
            reason: "not now".into(),
        })
        .unwrap();
        assert!(json.contains("\"state\":\"rejected\""));
    }
}
