// error.rs - Error types for the autonomy engine.

use std::path::PathBuf;

use ap_action::ActionError;
use ap_executor::is_rate_limit_message;
use ap_goal::GoalError;
use ap_policy::PolicyError;
use thiserror::Error;
use uuid::Uuid;

/// Failure of the reasoning provider. Never fatal to the loop.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("proposer timed out: {0}")]
    Timeout(String),

    /// The provider signalled quota exhaustion.
    #[error("proposer rate limited: {0}")]
    RateLimited(String),

    #[error("proposer upstream error: {0}")]
    Upstream(String),

    #[error("proposer returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether this failure should push the engine into the long rate-limit rest.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ProviderError::RateLimited(_) => true,
            ProviderError::Upstream(message) => is_rate_limit_message(message),
            ProviderError::Timeout(_) | ProviderError::InvalidResponse(_) => false,
        }
    }
}

/// Persistence failure. Fatal during `initialize()`, logged and retried after.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt engine state at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Goals(#[from] GoalError),
}

/// Configuration value the engine refuses to run with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least {min} ms, got {ms}")]
    RestTooShort {
        field: &'static str,
        ms: u64,
        min: u64,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("engine has not been initialized")]
    NotInitialized,

    #[error("action not found: {0}")]
    ActionNotFound(Uuid),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Goal(#[from] GoalError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_rate_limit_text_is_detected() {
        assert!(ProviderError::RateLimited("quota".into()).is_rate_limited());
        assert!(ProviderError::Upstream("HTTP 429 Too Many Requests".into()).is_rate_limited());
        assert!(!ProviderError::Upstream("connection reset".into()).is_rate_limited());
        assert!(!ProviderError::Timeout("30s".into()).is_rate_limited());
    }
}
