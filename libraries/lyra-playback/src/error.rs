//! Error types for playback management

use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Queue is empty
    #[error("Queue is empty")]
    QueueEmpty,

    /// No song is cached locally and offline mode requires one
    #[error("No songs available offline")]
    NoSongsOffline,

    /// Index out of bounds
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// The media element reported a failure
    #[error("Media error: {0}")]
    Media(String),

    /// Audio graph error
    #[error(transparent)]
    Audio(#[from] lyra_audio::AudioError),

    /// Persistence error
    #[error(transparent)]
    Storage(#[from] lyra_storage::StorageError),

    /// Repository error
    #[error(transparent)]
    Repository(#[from] lyra_core::error::RepositoryError),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
