//! Error types for regress-memory

use thiserror::Error;

/// Result type alias for regress-memory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in regress-memory
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid caller input (empty error text, non-positive n_results, ...).
    /// Recoverable by the caller.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Operation referenced a memory id that does not exist (or is outside
    /// the active pool, for operations that only accept active memories).
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O or schema failure on a write path. Fatal for the call; the
    /// enclosing transaction guarantees no partial state was left behind.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The underlying database reported sustained lock contention. The call
    /// already retried with backoff; callers may retry the whole operation.
    #[error("Storage busy: {0}")]
    Busy(String),

    /// Optional vector backend missing or failed. Never surfaced from
    /// retrieval; the cascade absorbs it and degrades to lexical matching.
    #[error("Vector backend unavailable: {0}")]
    Backend(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether retrying the same call may succeed without any state change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}
