//! Error types for persistence

use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Value could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backing store failed
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// IO error (file-backed stores)
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, StorageError>;
