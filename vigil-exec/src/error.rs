//! Execution layer error types.

use thiserror::Error;
use vigil_domain::PositionId;

/// Execution errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    /// Gateway rejected the amendment and retries are exhausted
    #[error("amendment {sequence} for {position_id} rejected after {attempts} attempts: {reason}")]
    AmendmentRejected {
        /// Position the amendment belonged to
        position_id: PositionId,
        /// Command sequence number
        sequence: u64,
        /// Attempts made (including the first)
        attempts: u32,
        /// Last gateway-reported reason
        reason: String,
    },

    /// Gateway transport/protocol failure
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Command journal bookkeeping failure
    #[error("command journal error: {0}")]
    Journal(String),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
