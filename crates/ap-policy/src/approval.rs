// approval.rs - Approval policy evaluation.
//
// Every proposal passes through `evaluate()`:
//
// 1. Is the action type in the auto-approve set? → AutoApprove
// 2. Otherwise → RequireApproval
//
// Types unknown to the engine are matched by name, so a proposer that
// invents "monitor-feed" can still be auto-approved by listing it.

use std::collections::BTreeSet;

use ap_action::{ActionType, ProposedAction};
use serde::{Deserialize, Serialize};

/// Action types that run without confirmation out of the box.
pub fn default_auto_approve() -> Vec<ActionType> {
    vec![ActionType::Research, ActionType::Analyze, ActionType::Plan]
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Run as soon as the executor is free.
    AutoApprove,
    /// Park in the pending queue until a human decides.
    RequireApproval { reason: String },
}

impl ApprovalDecision {
    pub fn requires_approval(&self) -> bool {
        matches!(self, ApprovalDecision::RequireApproval { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalPolicy {
    auto_approve: BTreeSet<ActionType>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::new(default_auto_approve())
    }
}

impl ApprovalPolicy {
    pub fn new(auto_approve: impl IntoIterator<Item = ActionType>) -> Self {
        Self {
            auto_approve: auto_approve.into_iter().collect(),
        }
    }

    /// A policy that sends everything to the approval queue.
    pub fn manual_only() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn auto_approve_types(&self) -> impl Iterator<Item = &ActionType> {
        self.auto_approve.iter()
    }

    pub fn set_auto_approve_types(&mut self, types: impl IntoIterator<Item = ActionType>) {
        self.auto_approve = types.into_iter().collect();
        tracing::info!(
            types = ?self.auto_approve.iter().map(ActionType::as_str).collect::<Vec<_>>(),
            "auto-approve set updated"
        );
    }

    pub fn requires_approval(&self, action_type: &ActionType) -> bool {
        !self.auto_approve.contains(action_type)
    }

    pub fn evaluate(&self, proposal: &ProposedAction) -> ApprovalDecision {
        if self.requires_approval(&proposal.action_type) {
            ApprovalDecision::RequireApproval {
                reason: format!(
                    "action type '{}' is not in the auto-approve set",
                    proposal.action_type
                ),
            }
        } else {
            ApprovalDecision::AutoApprove
        }
    }
}
