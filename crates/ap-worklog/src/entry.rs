// entry.rs - Work log entry data model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Informational transition (mode change, cycle start).
    Info,
    /// Something began (action dispatched).
    Running,
    /// Something finished well.
    Success,
    /// Waiting on a human.
    Pending,
    /// Deliberately not done (quiet hours, rejected).
    Skipped,
    Warning,
    Failed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryStatus::Info => "info",
            EntryStatus::Running => "running",
            EntryStatus::Success => "success",
            EntryStatus::Pending => "pending",
            EntryStatus::Skipped => "skipped",
            EntryStatus::Warning => "warning",
            EntryStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One immutable line of the work log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkEntry {
    pub id: Uuid,
    /// Component that produced the entry, e.g. "controller", "executor".
    pub source: String,
    pub message: String,
    pub status: EntryStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl WorkEntry {
    pub fn new(source: impl Into<String>, message: impl Into<String>, status: EntryStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            message: message.into(),
            status,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_metadata_is_omitted() {
        let entry = WorkEntry::new("controller", "cycle started", EntryStatus::Info);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("metadata"));
        assert!(json.contains("\"status\":\"info\""));
    }
}
