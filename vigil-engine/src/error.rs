//! Engine error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use vigil_domain::DomainError;

/// Engine-level errors.
///
/// `DataStale` is normal control flow: the orchestrator skips the tick
/// without any state change.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Snapshot is not newer than the last processed one
    #[error("stale snapshot: {snapshot} is not newer than {last_processed}")]
    DataStale {
        /// Rejected snapshot timestamp
        snapshot: DateTime<Utc>,
        /// Timestamp of the last processed snapshot
        last_processed: DateTime<Utc>,
    },

    /// Snapshot delivered to the wrong position
    #[error("snapshot for {snapshot_symbol} delivered to position on {position_symbol}")]
    SymbolMismatch {
        /// Symbol the position manages
        position_symbol: String,
        /// Symbol the snapshot describes
        snapshot_symbol: String,
    },

    /// Domain invariant violated while applying a decision
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
