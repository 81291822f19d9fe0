//! Daemon error types.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use vigil_domain::DomainError;
use vigil_engine::EngineError;
use vigil_exec::ExecError;
use vigil_store::StoreError;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Gateway size disagrees with internal state; the lifecycle unit
    /// halts and requires operator attention
    #[error("position {position_id} desynced: expected {expected}, gateway reports {reported}")]
    PositionDesync {
        /// Affected position
        position_id: Uuid,
        /// Internally tracked size
        expected: Decimal,
        /// Gateway-reported size
        reported: Decimal,
    },

    /// Position not found
    #[error("Position not found: {0}")]
    PositionNotFound(Uuid),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
