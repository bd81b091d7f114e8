// events.rs - Observer events and their dispatch.
//
// Events are fire-and-forget: observers return nothing and cannot stop the
// controller. They are always emitted after the controller has released
// its state lock, so an observer may call back into the controller.

use std::sync::Arc;

use ap_goal::GoalProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EngineEvent {
    ActionStarted {
        action_id: Uuid,
        goal_id: Option<Uuid>,
        title: String,
        backend_id: String,
        timestamp: DateTime<Utc>,
    },
    ActionCompleted {
        action_id: Uuid,
        goal_id: Option<Uuid>,
        title: String,
        result: String,
        timestamp: DateTime<Utc>,
    },
    ActionFailed {
        action_id: Uuid,
        goal_id: Option<Uuid>,
        title: String,
        error: String,
        rate_limited: bool,
        timestamp: DateTime<Utc>,
    },
    /// The set of proposed or pending actions changed.
    ProposalsUpdated {
        /// Ids created by this round of proposals.
        proposed: Vec<Uuid>,
        auto_approved: usize,
        pending_approval: usize,
        timestamp: DateTime<Utc>,
    },
    GoalProgress(GoalProgress),
}

impl EngineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::ActionStarted { .. } => "action-started",
            EngineEvent::ActionCompleted { .. } => "action-completed",
            EngineEvent::ActionFailed { .. } => "action-failed",
            EngineEvent::ProposalsUpdated { .. } => "proposals-updated",
            EngineEvent::GoalProgress(_) => "goal-progress",
        }
    }
}

pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

impl<F> EngineObserver for F
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent) {
        self(event)
    }
}

#[derive(Default, Clone)]
pub struct EventDispatcher {
    observers: Vec<Arc<dyn EngineObserver>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn dispatch(&self, event: &EngineEvent) {
        tracing::trace!(event = event.event_type(), "dispatching engine event");
        for observer in &self.observers {
            observer.on_event(event);
        }
    }

    pub fn dispatch_all(&self, events: Vec<EngineEvent>) {
        for event in &events {
            self.dispatch(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn event_tag_matches_event_type() {
        let event = EngineEvent::ProposalsUpdated {
            proposed: vec![],
            auto_approved: 0,
            pending_approval: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.event_type());
    }

    #[test]
    fn goal_progress_payload_is_flattened() {
        let event = EngineEvent::GoalProgress(GoalProgress {
            goal_id: Uuid::new_v4(),
            title: "G1".into(),
            previous: 0.0,
            progress: 0.1,
            completed: false,
            timestamp: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "goal-progress");
        assert_eq!(json["title"], "G1");
    }

    #[test]
    fn every_observer_receives_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            dispatcher.add_observer(Arc::new(move |e: &EngineEvent| {
                seen.lock().unwrap().push(e.event_type());
            }));
        }
        dispatcher.dispatch_all(vec![
            EngineEvent::ActionStarted {
                action_id: Uuid::new_v4(),
                goal_id: None,
                title: "t".into(),
                backend_id: "b".into(),
                timestamp: Utc::now(),
            },
            EngineEvent::ActionFailed {
                action_id: Uuid::new_v4(),
                goal_id: None,
                title: "t".into(),
                error: "boom".into(),
                rate_limited: false,
                timestamp: Utc::now(),
            },
        ]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["action-started", "action-started", "action-failed", "action-failed"]
        );
    }
}
