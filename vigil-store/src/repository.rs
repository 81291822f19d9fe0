//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the domain. The daemon
//! ships with the in-memory implementation; durable backends live behind
//! the same ports and belong to an external collaborator.

use async_trait::async_trait;

use vigil_domain::{ExitRecord, Position, PositionId, PositionKey, ReentryLock};

use crate::error::StoreError;

/// Registry of positions, keyed by (symbol, side).
///
/// The registry enforces the core invariant: at most one open position
/// per key. `register` fails when the key already holds an open position.
#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Register a freshly opened position on its key.
    async fn register(&self, position: &Position) -> Result<(), StoreError>;

    /// Save an updated position (must already be registered).
    async fn save(&self, position: &Position) -> Result<(), StoreError>;

    /// Find a position by ID.
    async fn find_by_id(&self, id: PositionId) -> Result<Option<Position>, StoreError>;

    /// Find the open position on a key, if any.
    async fn find_open_by_key(&self, key: &PositionKey) -> Result<Option<Position>, StoreError>;

    /// All open positions (restart recovery).
    async fn find_open(&self) -> Result<Vec<Position>, StoreError>;

    /// Release a key after close, removing the registry entry.
    async fn release(&self, id: PositionId) -> Result<(), StoreError>;
}

/// The re-entry lock table, keyed by (symbol, side).
///
/// Written exactly once per close; read before every proposal on the key.
#[async_trait]
pub trait ReentryLockRepository: Send + Sync {
    /// Record the lock for a close (replaces any prior lock on the key).
    async fn put(&self, lock: &ReentryLock) -> Result<(), StoreError>;

    /// The lock for a key, if one exists.
    async fn get(&self, key: &PositionKey) -> Result<Option<ReentryLock>, StoreError>;

    /// All locks (status surface).
    async fn all(&self) -> Result<Vec<ReentryLock>, StoreError>;
}

/// Append-only ledger of exit records (external persistence port).
#[async_trait]
pub trait ExitRecordRepository: Send + Sync {
    /// Append one record.
    async fn append(&self, record: &ExitRecord) -> Result<(), StoreError>;

    /// Records for one position.
    async fn find_by_position(&self, id: PositionId) -> Result<Vec<ExitRecord>, StoreError>;
}

/// Combined store interface.
pub trait Store: Send + Sync {
    /// Position registry
    fn positions(&self) -> &dyn PositionRepository;

    /// Re-entry lock table
    fn reentry_locks(&self) -> &dyn ReentryLockRepository;

    /// Exit-record ledger
    fn exit_records(&self) -> &dyn ExitRecordRepository;
}
