//! Error types for GourdWatch.

use thiserror::Error;

/// Unified error type for all GourdWatch crates.
#[derive(Debug, Error)]
pub enum GourdWatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Malformed record {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GourdWatchError {
    /// Whether the failed operation may succeed on a later tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Io(_))
    }

    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GourdWatchError>;
