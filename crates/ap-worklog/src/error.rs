// error.rs - Error types for the work log.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkLogError {
    /// Failed to open or create the log file.
    #[error("failed to open work log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write an entry.
    #[error("failed to append entry: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Malformed JSON in the log file.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The hash chain is broken: an entry was inserted, removed or edited.
    #[error("integrity check failed at line {line}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },
}
