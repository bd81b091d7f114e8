// state.rs - Controller-owned engine state and the status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::RestLevel;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    #[default]
    Idle,
    Selecting,
    Proposing,
    Executing,
    Resting,
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineMode::Idle => "idle",
            EngineMode::Selecting => "selecting",
            EngineMode::Proposing => "proposing",
            EngineMode::Executing => "executing",
            EngineMode::Resting => "resting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineState {
    pub mode: EngineMode,
    pub current_action_id: Option<Uuid>,
    /// Goal selected by the cycle in progress (or the last one).
    pub current_goal_id: Option<Uuid>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub next_cycle_at: Option<DateTime<Utc>>,
    pub rest_level: RestLevel,
    pub cycle_interval_ms: u64,
}

/// Point-in-time view for observers and the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineStatus {
    #[serde(flatten)]
    pub state: EngineState,
    pub running: bool,
    pub initialized: bool,
    pub pending_approvals: usize,
    pub active_goals: usize,
    pub available_backends: Vec<String>,
    pub last_error: Option<String>,
}

/// What one cycle did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub goal_id: Option<Uuid>,
    /// True when the cycle landed in quiet hours and did no work.
    pub quiet_hours: bool,
    pub proposed: Vec<Uuid>,
    pub queued: Vec<Uuid>,
    pub completed: Vec<Uuid>,
    pub failed: Vec<Uuid>,
    pub provider_error: Option<String>,
    pub rest_level: RestLevel,
    pub delay_ms: u64,
    pub next_cycle_at: DateTime<Utc>,
}

impl CycleReport {
    pub fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delay_ms)
    }
}
