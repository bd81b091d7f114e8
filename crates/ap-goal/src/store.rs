// store.rs - Persistence boundary for goals.
//
// The engine only defines the shape of a goal record. `GoalFileStore` keeps
// one JSON file per goal (`<store_dir>/<goal_id>.json`) so the set is easy to
// inspect by hand; `MemoryGoalStore` backs tests and ephemeral runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use crate::error::GoalError;
use crate::goal::Goal;

/// Load/save pair supplied by the application.
pub trait GoalStore: Send + Sync {
    /// Load every persisted goal. A record that cannot be parsed is an error,
    /// never silently skipped.
    fn load_all(&self) -> Result<Vec<Goal>, GoalError>;

    /// Create or overwrite one goal.
    fn save(&self, goal: &Goal) -> Result<(), GoalError>;

    /// Remove a goal. Returns `false` if it was not stored.
    fn delete(&self, goal_id: Uuid) -> Result<bool, GoalError>;
}

/// JSON-file-per-goal store.
pub struct GoalFileStore {
    store_dir: PathBuf,
}

impl GoalFileStore {
    /// Create a store backed by the given directory, creating it if needed.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, GoalError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| GoalError::IoError {
            path: store_dir.display().to_string(),
            source,
        })?;
        Ok(Self { store_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.store_dir
    }

    fn goal_file(&self, goal_id: Uuid) -> PathBuf {
        self.store_dir.join(format!("{}.json", goal_id))
    }
}

impl GoalStore for GoalFileStore {
    fn load_all(&self) -> Result<Vec<Goal>, GoalError> {
        let mut goals = Vec::new();

        let entries = fs::read_dir(&self.store_dir).map_err(|source| GoalError::IoError {
            path: self.store_dir.display().to_string(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| GoalError::IoError {
                path: self.store_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }

            let json = fs::read_to_string(&path).map_err(|source| GoalError::IoError {
                path: path.display().to_string(),
                source,
            })?;
            let goal: Goal = serde_json::from_str(&json).map_err(|e| GoalError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            goals.push(goal);
        }

        goals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(goals)
    }

    fn save(&self, goal: &Goal) -> Result<(), GoalError> {
        let path = self.goal_file(goal.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(goal)?;
        // Write then rename so a crash mid-write never leaves a truncated record.
        fs::write(&tmp, json).map_err(|source| GoalError::IoError {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| GoalError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    fn delete(&self, goal_id: Uuid) -> Result<bool, GoalError> {
        let path = self.goal_file(goal_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| GoalError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(true)
    }
}

/// In-memory store. Saves can be made to fail on demand to exercise retry paths.
#[derive(Default)]
pub struct MemoryGoalStore {
    goals: Mutex<HashMap<Uuid, Goal>>,
    fail_saves: AtomicBool,
}

impl MemoryGoalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_goals(goals: impl IntoIterator<Item = Goal>) -> Self {
        let store = Self::new();
        {
            let mut map = store.goals.lock().unwrap_or_else(PoisonError::into_inner);
            for goal in goals {
                map.insert(goal.id, goal);
            }
        }
        store
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, goal_id: Uuid) -> Option<Goal> {
        self.goals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&goal_id)
            .cloned()
    }
}

impl GoalStore for MemoryGoalStore {
    fn load_all(&self) -> Result<Vec<Goal>, GoalError> {
        let mut goals: Vec<Goal> = self
            .goals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        goals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(goals)
    }

    fn save(&self, goal: &Goal) -> Result<(), GoalError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(GoalError::StoreUnavailable("memory store set to fail".into()));
        }
        self.goals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(goal.id, goal.clone());
        Ok(())
    }

    fn delete(&self, goal_id: Uuid) -> Result<bool, GoalError> {
        Ok(self
            .goals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&goal_id)
            .is_some())
    }
}
