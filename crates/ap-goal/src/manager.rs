// manager.rs - GoalManager: owns the goal set and decides what to work on.
//
// Mutations happen in memory and mark the goal dirty. `flush()` writes dirty
// goals to the store; anything that fails to save stays dirty and is retried
// on the next flush. Only `initialize()` treats a store failure as fatal.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GoalError;
use crate::goal::{Goal, GoalPhase, GoalStatus};
use crate::store::GoalStore;

/// Payload of a `goal-progress` notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalProgress {
    pub goal_id: Uuid,
    pub title: String,
    pub previous: f64,
    pub progress: f64,
    /// True when this update pushed the goal to 1.0 and completed it.
    pub completed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Receives progress notifications. Listeners must not block.
pub trait GoalListener: Send + Sync {
    fn on_progress(&self, update: &GoalProgress);
}

impl<F> GoalListener for F
where
    F: Fn(&GoalProgress) + Send + Sync,
{
    fn on_progress(&self, update: &GoalProgress) {
        self(update)
    }
}

pub struct GoalManager {
    store: Box<dyn GoalStore>,
    goals: Vec<Goal>,
    dirty: HashSet<Uuid>,
    deleted: HashSet<Uuid>,
    listeners: Vec<Box<dyn GoalListener>>,
}

impl GoalManager {
    pub fn new(store: Box<dyn GoalStore>) -> Self {
        Self {
            store,
            goals: Vec::new(),
            dirty: HashSet::new(),
            deleted: HashSet::new(),
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn GoalListener>) {
        self.listeners.push(listener);
    }

    /// Load persisted goals, replacing whatever is in memory.
    ///
    /// Fails if the store is unreadable or holds a corrupt record.
    pub fn initialize(&mut self) -> Result<usize, GoalError> {
        let goals = self.store.load_all()?;
        tracing::info!(count = goals.len(), "loaded goals");
        self.goals = goals;
        self.dirty.clear();
        self.deleted.clear();
        Ok(self.goals.len())
    }

    /// Add a goal. With `auto_activate` a pending goal becomes active at once.
    pub fn add_goal(&mut self, mut goal: Goal, auto_activate: bool) -> Result<Uuid, GoalError> {
        if auto_activate && goal.status == GoalStatus::Pending {
            goal.transition(GoalStatus::Active)?;
        }
        let id = goal.id;
        tracing::info!(goal_id = %id, title = %goal.title, priority = goal.priority, "goal added");
        self.goals.retain(|g| g.id != id);
        self.goals.push(goal);
        self.deleted.remove(&id);
        self.dirty.insert(id);
        Ok(id)
    }

    pub fn get_goal(&self, goal_id: Uuid) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == goal_id)
    }

    pub fn all_goals(&self) -> &[Goal] {
        &self.goals
    }

    /// Goals that are neither completed nor abandoned.
    pub fn get_active_goals(&self) -> Vec<&Goal> {
        self.goals.iter().filter(|g| !g.is_terminal()).collect()
    }

    /// Highest-priority non-terminal goal; ties go to the earliest `created_at`.
    pub fn select_next_goal(&self) -> Option<&Goal> {
        self.goals
            .iter()
            .filter(|g| !g.is_terminal())
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
    }

    /// Mark a pending goal as actively worked on. No-op if already active.
    pub fn activate(&mut self, goal_id: Uuid) -> Result<(), GoalError> {
        let goal = self.goal_mut(goal_id)?;
        if goal.status == GoalStatus::Pending {
            goal.transition(GoalStatus::Active)?;
            self.dirty.insert(goal_id);
        }
        Ok(())
    }

    /// Add `delta` to a goal's progress, clamped to [0, 1], and notify
    /// listeners. Reaching 1.0 completes the goal.
    pub fn update_progress(&mut self, goal_id: Uuid, delta: f64) -> Result<GoalProgress, GoalError> {
        let goal = self.goal_mut(goal_id)?;
        if goal.is_terminal() {
            return Err(GoalError::InvalidTransition {
                goal_id,
                from: goal.status.to_string(),
                to: "progress".to_string(),
            });
        }

        let previous = goal.advance(delta);
        let mut completed = false;
        if goal.progress >= 1.0 {
            goal.transition(GoalStatus::Completed)?;
            completed = true;
        }

        let update = GoalProgress {
            goal_id,
            title: goal.title.clone(),
            previous,
            progress: goal.progress,
            completed,
            timestamp: goal.updated_at,
        };
        tracing::debug!(goal_id = %goal_id, previous, progress = update.progress, "goal progress");
        self.dirty.insert(goal_id);
        self.notify(&update);
        Ok(update)
    }

    /// Explicitly reset progress to zero, the only way progress goes down.
    pub fn reset_progress(&mut self, goal_id: Uuid) -> Result<(), GoalError> {
        let goal = self.goal_mut(goal_id)?;
        goal.reset_progress();
        self.dirty.insert(goal_id);
        Ok(())
    }

    pub fn set_phase(&mut self, goal_id: Uuid, phase: GoalPhase) -> Result<(), GoalError> {
        self.goal_mut(goal_id)?.set_phase(phase)?;
        self.dirty.insert(goal_id);
        Ok(())
    }

    pub fn complete_goal(&mut self, goal_id: Uuid) -> Result<(), GoalError> {
        self.goal_mut(goal_id)?.transition(GoalStatus::Completed)?;
        self.dirty.insert(goal_id);
        Ok(())
    }

    pub fn abandon_goal(&mut self, goal_id: Uuid) -> Result<(), GoalError> {
        self.goal_mut(goal_id)?.transition(GoalStatus::Abandoned)?;
        tracing::info!(goal_id = %goal_id, "goal abandoned");
        self.dirty.insert(goal_id);
        Ok(())
    }

    /// Remove a goal entirely. The store record is deleted on the next flush.
    pub fn delete_goal(&mut self, goal_id: Uuid) -> Result<Goal, GoalError> {
        let index = self
            .goals
            .iter()
            .position(|g| g.id == goal_id)
            .ok_or(GoalError::NotFound(goal_id))?;
        let goal = self.goals.remove(index);
        self.dirty.remove(&goal_id);
        self.deleted.insert(goal_id);
        Ok(goal)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.dirty.is_empty() || !self.deleted.is_empty()
    }

    /// Persist dirty goals and pending deletions. On failure the remaining
    /// work stays queued and the first error is returned.
    pub fn flush(&mut self) -> Result<usize, GoalError> {
        let mut written = 0;
        let mut first_error = None;

        let deleted: Vec<Uuid> = self.deleted.iter().copied().collect();
        for goal_id in deleted {
            match self.store.delete(goal_id) {
                Ok(_) => {
                    self.deleted.remove(&goal_id);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let dirty: Vec<Uuid> = self.dirty.iter().copied().collect();
        for goal_id in dirty {
            let Some(goal) = self.goals.iter().find(|g| g.id == goal_id) else {
                self.dirty.remove(&goal_id);
                continue;
            };
            match self.store.save(goal) {
                Ok(()) => {
                    self.dirty.remove(&goal_id);
                    written += 1;
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    fn goal_mut(&mut self, goal_id: Uuid) -> Result<&mut Goal, GoalError> {
        self.goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .ok_or(GoalError::NotFound(goal_id))
    }

    fn notify(&self, update: &GoalProgress) {
        for listener in &self.listeners {
            listener.on_progress(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::GoalCategory;
    use crate::store::MemoryGoalStore;
    use chrono::Duration;
    use std::sync::{Arc, Mutex};

    fn manager() -> GoalManager {
        GoalManager::new(Box::new(MemoryGoalStore::new()))
    }

    #[test]
    fn selects_highest_priority() {
        let mut mgr = manager();
        let g1 = mgr
            .add_goal(Goal::new("G1", GoalCategory::Finance, 8), false)
            .unwrap();
        mgr.add_goal(Goal::new("G2", GoalCategory::Health, 5), false)
            .unwrap();

        assert_eq!(mgr.select_next_goal().unwrap().id, g1);
    }

    #[test]
    fn ties_go_to_earliest_created() {
        let mut mgr = manager();
        let base = Utc::now();
        mgr.add_goal(
            Goal::new("later", GoalCategory::Career, 5).created_at(base + Duration::minutes(5)),
            false,
        )
        .unwrap();
        let earlier = mgr
            .add_goal(
                Goal::new("earlier", GoalCategory::Career, 5).created_at(base),
                false,
            )
            .unwrap();

        assert_eq!(mgr.select_next_goal().unwrap().id, earlier);
    }

    #[test]
    fn terminal_goals_are_never_selected() {
        let mut mgr = manager();
        let top = mgr
            .add_goal(Goal::new("done", GoalCategory::Personal, 10), false)
            .unwrap();
        mgr.complete_goal(top).unwrap();
        assert!(mgr.select_next_goal().is_none());

        let low = mgr
            .add_goal(Goal::new("low", GoalCategory::Personal, 1), false)
            .unwrap();
        assert_eq!(mgr.select_next_goal().unwrap().id, low);
        assert_eq!(mgr.get_active_goals().len(), 1);
    }

    #[test]
    fn progress_completes_goal_and_notifies() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut mgr = manager();
        mgr.add_listener(Box::new(move |update: &GoalProgress| {
            sink.lock().unwrap().push(update.clone());
        }));
        let id = mgr
            .add_goal(Goal::new("G", GoalCategory::Learning, 1), true)
            .unwrap();

        mgr.update_progress(id, 0.6).unwrap();
        let last = mgr.update_progress(id, 0.6).unwrap();

        assert!(last.completed);
        assert_eq!(last.progress, 1.0);
        assert_eq!(mgr.get_goal(id).unwrap().status, GoalStatus::Completed);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn progress_on_unknown_goal_is_not_found() {
        let mut mgr = manager();
        let result = mgr.update_progress(Uuid::new_v4(), 0.1);
        assert!(matches!(result, Err(GoalError::NotFound(_))));
    }

    #[test]
    fn failed_flush_is_retried() {
        let store = Arc::new(MemoryGoalStore::new());
        struct Shared(Arc<MemoryGoalStore>);
        impl GoalStore for Shared {
            fn load_all(&self) -> Result<Vec<Goal>, GoalError> {
                self.0.load_all()
            }
            fn save(&self, goal: &Goal) -> Result<(), GoalError> {
                self.0.save(goal)
            }
            fn delete(&self, goal_id: Uuid) -> Result<bool, GoalError> {
                self.0.delete(goal_id)
            }
        }

        let mut mgr = GoalManager::new(Box::new(Shared(Arc::clone(&store))));
        let id = mgr
            .add_goal(Goal::new("G", GoalCategory::Social, 1), false)
            .unwrap();

        store.set_fail_saves(true);
        assert!(mgr.flush().is_err());
        assert!(mgr.has_unsaved_changes());

        store.set_fail_saves(false);
        assert_eq!(mgr.flush().unwrap(), 1);
        assert!(!mgr.has_unsaved_changes());
        assert!(store.get(id).is_some());
    }

    #[test]
    fn initialize_loads_from_store() {
        let goal = Goal::new("stored", GoalCategory::Health, 3);
        let id = goal.id;
        let mut mgr = GoalManager::new(Box::new(MemoryGoalStore::with_goals([goal])));
        assert_eq!(mgr.initialize().unwrap(), 1);
        assert!(mgr.get_goal(id).is_some());
    }

    #[test]
    fn deleted_goal_is_removed_from_store_on_flush() {
        let goal = Goal::new("gone", GoalCategory::Health, 3);
        let id = goal.id;
        let mut mgr = GoalManager::new(Box::new(MemoryGoalStore::with_goals([goal])));
        mgr.initialize().unwrap();
        mgr.delete_goal(id).unwrap();
        mgr.flush().unwrap();
        mgr.initialize().unwrap();
        assert!(mgr.get_goal(id).is_none());
    }
}
