//! Error types for the memory subsystem.
//!
//! There is no "not found" variant. Lookups return `Option`, removals
//! return `bool`, hydration skips unknown IDs.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the store, the index, and the search layer.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A vector's length disagrees with the index configuration.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A serialized index buffer could not be decoded.
    #[error("invalid index format: {0}")]
    InvalidFormat(String),

    /// Index or search parameters were rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// File system or SQLite failure while reading or writing the store.
    #[error("storage failure: {context}")]
    StorageFailure {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backing file is not a store this binary can read.
    #[error("corrupt store at {}: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    /// Tag list could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MemoryError {
    /// Wrap a lower-level failure with a description of what was being attempted.
    pub fn storage(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StorageFailure {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage("sqlite operation failed", err)
    }
}

/// Result type for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
