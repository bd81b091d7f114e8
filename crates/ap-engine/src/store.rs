// store.rs - Persistence boundary for controller-owned state.
//
// Goals persist through `ap_goal::GoalStore`. Everything else the controller
// owns (actions, handoff, rejection memory) travels as one `EngineSnapshot`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use ap_action::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::handoff::HandoffContext;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffContext>,
    /// Fingerprints of rejected actions, oldest first; matching proposals
    /// are dropped.
    #[serde(default)]
    pub rejected_fingerprints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

pub trait StateStore: Send {
    /// Load the last saved snapshot. Nothing saved yet is an empty snapshot,
    /// not an error.
    fn load(&self) -> Result<EngineSnapshot, StoreError>;

    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), StoreError>;
}

/// Single pretty-printed JSON file, replaced atomically on every save.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<EngineSnapshot, StoreError> {
        if !self.path.exists() {
            return Ok(EngineSnapshot::default());
        }
        let json = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<Option<EngineSnapshot>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: EngineSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// The last successfully saved snapshot.
    pub fn saved(&self) -> Option<EngineSnapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<EngineSnapshot, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail loads".into()));
        }
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail saves".into()));
        }
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }
}

/// Lets the caller keep a handle on the store the controller owns.
impl<T: StateStore + Sync> StateStore for std::sync::Arc<T> {
    fn load(&self) -> Result<EngineSnapshot, StoreError> {
        (**self).load()
    }

    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), StoreError> {
        (**self).save(snapshot)
    }
}
