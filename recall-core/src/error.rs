//! Error types for the memory engine.
//!
//! Caller-facing operations (`write`/`read`/`forget`) surface these errors
//! synchronously. Maintenance failures are logged and retried internally and
//! never reach a `write` caller.

use crate::record::RecordId;
use thiserror::Error;

/// Main error type for memory-engine operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// No record exists with the given id.
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    /// A maintenance batch was empty.
    #[error("Summarization batch is empty")]
    EmptyBatch,

    /// A maintenance batch mixed records from different sessions.
    #[error("Summarization batch spans sessions: expected {expected}, found {found}")]
    CrossSessionBatch {
        /// Session of the first record in the batch.
        expected: String,
        /// Offending session encountered later in the batch.
        found: String,
    },

    /// The store or summarizer failed transiently during a maintenance
    /// cycle. The cycle was aborted without partial effects.
    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    /// The durability collaborator is unreachable. Writes fail fast.
    #[error("Persistence backend unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Operation attempted after the engine was closed.
    #[error("Engine is closed")]
    Closed,

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

impl MemoryError {
    /// Create a new SummarizationFailed error.
    pub fn summarization(message: impl Into<String>) -> Self {
        Self::SummarizationFailed(message.into())
    }

    /// Create a new PersistenceUnavailable error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceUnavailable(message.into())
    }

    /// Create a new CrossSessionBatch error.
    pub fn cross_session(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::CrossSessionBatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Check if the error is transient and worth retrying with backoff.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SummarizationFailed(_) | Self::PersistenceUnavailable(_)
        )
    }

    /// Check if the error is a programmer error in a maintenance
    /// invocation. These abort the cycle; the next cycle makes a fresh
    /// selection instead of retrying the same batch.
    pub fn is_batch_error(&self) -> bool {
        matches!(self, Self::EmptyBatch | Self::CrossSessionBatch { .. })
    }
}

impl From<std::io::Error> for MemoryError {
    fn from(e: std::io::Error) -> Self {
        Self::PersistenceUnavailable(e.to_string())
    }
}
