// error.rs - Error types for backend selection and execution.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// No registered backend reported itself available.
    #[error("no execution backend available (registered: {registered})")]
    NoBackendAvailable { registered: String },

    /// A backend could not be constructed from its configuration.
    #[error("backend '{backend_id}' misconfigured: {reason}")]
    Misconfigured { backend_id: String, reason: String },

    /// HTTP client construction failed.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}
