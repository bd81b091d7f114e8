//! File-backed context providers.

use std::path::PathBuf;
use std::sync::Arc;

use ap_engine::{ContextProvider, ContextRegistry};
use serde_json::Value;

use crate::config::ContextSource;

/// Reads a file fresh on every snapshot. JSON content is passed through as
/// JSON, anything else as a string. An unreadable file yields `null`.
pub struct FileContextProvider {
    path: PathBuf,
}

impl FileContextProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ContextProvider for FileContextProvider {
    fn snapshot(&self) -> Value {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or(Value::String(content)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "context file unreadable");
                Value::Null
            }
        }
    }
}

/// Build the registry from `[[context]]` entries. Entries that collide with
/// the controller's own keys are skipped.
pub fn registry_from(sources: &[ContextSource]) -> ContextRegistry {
    let mut registry = ContextRegistry::new();
    for source in sources {
        let provider = Arc::new(FileContextProvider::new(&source.path));
        if !registry.register(&source.name, provider) {
            tracing::warn!(name = %source.name, "context name is reserved, skipping");
        }
    }
    registry
}
