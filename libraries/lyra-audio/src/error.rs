//! Error types for the audio graph

use thiserror::Error;

/// Audio graph errors
#[derive(Debug, Error)]
pub enum AudioError {
    /// A value curve is in flight on this parameter; it cannot be
    /// cancelled or superseded, only escaped by node replacement
    #[error("Parameter automation in flight; replace the node instead")]
    AutomationLocked,

    /// The processing context could not be created
    #[error("Audio context creation failed: {0}")]
    ContextCreation(String),

    /// A source node already exists for this slot; the platform allows
    /// exactly one per media element lifetime
    #[error("Source node already created for slot {0}")]
    SourceAlreadyCreated(usize),

    /// A graph stage required by the operation has not been built
    #[error("Graph stage missing: {0}")]
    StageMissing(&'static str),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for audio graph operations
pub type Result<T> = std::result::Result<T, AudioError>;
