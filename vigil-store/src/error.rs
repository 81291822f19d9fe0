//! Store error types.

use thiserror::Error;
use vigil_domain::{PositionId, PositionKey};

/// Storage-layer errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The registry already holds an open position on this key
    #[error("position already open on {0}")]
    AlreadyOpen(PositionKey),

    /// Position not found
    #[error("position not found: {0}")]
    NotFound(PositionId),

    /// Backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
