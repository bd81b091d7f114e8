// context.rs - Context providers aggregated into the proposer's input.
//
// A provider is any `() -> JSON` callback registered under a name. Values
// are opaque: the engine forwards them to the proposer untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Context handed to the proposer: provider name -> opaque JSON value.
pub type ProposerContext = Map<String, Value>;

/// Keys the controller fills in itself.
pub const GOAL_KEY: &str = "goal";
pub const HANDOFF_KEY: &str = "handoff";

pub trait ContextProvider: Send + Sync {
    fn snapshot(&self) -> Value;
}

impl<F> ContextProvider for F
where
    F: Fn() -> Value + Send + Sync,
{
    fn snapshot(&self) -> Value {
        self()
    }
}

#[derive(Default, Clone)]
pub struct ContextRegistry {
    providers: BTreeMap<String, Arc<dyn ContextProvider>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `name`, replacing any previous one.
    /// Returns false for the reserved `goal` and `handoff` names.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn ContextProvider>) -> bool {
        let name = name.into();
        if name == GOAL_KEY || name == HANDOFF_KEY {
            tracing::warn!(provider = %name, "context provider name is reserved, ignoring");
            return false;
        }
        self.providers.insert(name, provider);
        true
    }

    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn ContextProvider>) -> Self {
        self.register(name, provider);
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Call every provider once and merge the results.
    pub fn collect(&self) -> ProposerContext {
        self.providers
            .iter()
            .map(|(name, provider)| (name.clone(), provider.snapshot()))
            .collect()
    }
}
