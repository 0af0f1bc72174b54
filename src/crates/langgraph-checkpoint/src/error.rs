//! Errors returned by checkpoint savers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckpointError>;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// Backend failure, carrying the failed step and the driver message
    #[error("Storage error: {0}")]
    Storage(String),

    /// Caller supplied an incomplete or malformed config
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// A stored blob carries a type tag the serializer cannot decode
    #[error("Unknown serialization type: {0}")]
    UnknownType(String),

    /// The saver was closed
    #[error("Checkpoint saver is closed")]
    Closed,

    #[error("{0}")]
    Custom(String),
}

impl CheckpointError {
    /// Whether this error is a caller-contract violation rather than a storage failure
    pub fn is_invalid(&self) -> bool {
        matches!(self, CheckpointError::Invalid(_))
    }
}
