//! Error types for stream subscriptions.

use crate::types::PartitionId;
use thiserror::Error;

/// Main error type for subscription operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Partition discovery failed: {0}")]
    Discovery(#[source] BackendError),

    #[error("Partition {partition} failed: {source}")]
    Partition {
        partition: PartitionId,
        #[source]
        source: BackendError,
    },

    #[error("Subscription cancelled")]
    Cancelled,

    #[error("Subscription disposed")]
    Disposed,

    #[error("Subscription terminated by an earlier failure")]
    Terminated,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn poller thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl StreamError {
    /// True for conditions that end the sequence cleanly rather than by failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StreamError::Cancelled | StreamError::Disposed)
    }
}

/// Errors reported by a partition backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("Backend error: {0}")]
    Other(String),
}

/// Failure to decode a single record payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CodecError(pub String);

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CodecError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CodecError(e.to_string())
    }
}

/// Result type for subscription operations.
pub type Result<T> = std::result::Result<T, StreamError>;
