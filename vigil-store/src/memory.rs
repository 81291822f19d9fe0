//! In-memory store implementation
//!
//! Used by the daemon and tests without a database. Mutual exclusion is
//! per (symbol, side) key: the manager serializes registration, close,
//! and re-entry gating on one key while unrelated instruments proceed
//! unimpeded.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use vigil_domain::{ExitRecord, Position, PositionId, PositionKey, ReentryLock};

use crate::error::{StoreError, StoreResult};
use crate::repository::{ExitRecordRepository, PositionRepository, ReentryLockRepository, Store};

/// In-memory store with per-key entry locks.
#[derive(Default)]
pub struct MemoryStore {
    positions: PositionTable,
    reentry: ReentryTable,
    ledger: LedgerTable,
    key_locks: Mutex<HashMap<PositionKey, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry lock for a key.
    ///
    /// Callers hold the returned mutex across a register/close/gate
    /// critical section; each key has its own lock.
    pub async fn key_lock(&self, key: &PositionKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Number of registered positions.
    pub async fn position_count(&self) -> usize {
        self.positions.by_id.read().await.len()
    }
}

impl Store for MemoryStore {
    fn positions(&self) -> &dyn PositionRepository {
        &self.positions
    }

    fn reentry_locks(&self) -> &dyn ReentryLockRepository {
        &self.reentry
    }

    fn exit_records(&self) -> &dyn ExitRecordRepository {
        &self.ledger
    }
}

// =============================================================================
// Position registry
// =============================================================================

#[derive(Default)]
struct PositionTable {
    by_id: RwLock<HashMap<PositionId, Position>>,
    by_key: RwLock<HashMap<PositionKey, PositionId>>,
}

#[async_trait]
impl PositionRepository for PositionTable {
    async fn register(&self, position: &Position) -> StoreResult<()> {
        let key = position.key();
        let mut by_key = self.by_key.write().await;
        let mut by_id = self.by_id.write().await;

        if let Some(existing) = by_key.get(&key) {
            if by_id.get(existing).map(|p| !p.is_closed()).unwrap_or(false) {
                return Err(StoreError::AlreadyOpen(key));
            }
        }
        by_key.insert(key, position.id);
        by_id.insert(position.id, position.clone());
        Ok(())
    }

    async fn save(&self, position: &Position) -> StoreResult<()> {
        let mut by_id = self.by_id.write().await;
        if !by_id.contains_key(&position.id) {
            return Err(StoreError::NotFound(position.id));
        }
        by_id.insert(position.id, position.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: PositionId) -> StoreResult<Option<Position>> {
        Ok(self.by_id.read().await.get(&id).cloned())
    }

    async fn find_open_by_key(&self, key: &PositionKey) -> StoreResult<Option<Position>> {
        let by_key = self.by_key.read().await;
        let by_id = self.by_id.read().await;
        Ok(by_key
            .get(key)
            .and_then(|id| by_id.get(id))
            .filter(|p| !p.is_closed())
            .cloned())
    }

    async fn find_open(&self) -> StoreResult<Vec<Position>> {
        Ok(self
            .by_id
            .read()
            .await
            .values()
            .filter(|p| !p.is_closed())
            .cloned()
            .collect())
    }

    async fn release(&self, id: PositionId) -> StoreResult<()> {
        let mut by_id = self.by_id.write().await;
        let position = by_id.remove(&id).ok_or(StoreError::NotFound(id))?;
        let mut by_key = self.by_key.write().await;
        if by_key.get(&position.key()) == Some(&id) {
            by_key.remove(&position.key());
        }
        Ok(())
    }
}

// =============================================================================
// Re-entry lock table
// =============================================================================

#[derive(Default)]
struct ReentryTable {
    locks: RwLock<HashMap<PositionKey, ReentryLock>>,
}

#[async_trait]
impl ReentryLockRepository for ReentryTable {
    async fn put(&self, lock: &ReentryLock) -> StoreResult<()> {
        let key = PositionKey::new(lock.symbol.clone(), lock.side);
        self.locks.write().await.insert(key, lock.clone());
        Ok(())
    }

    async fn get(&self, key: &PositionKey) -> StoreResult<Option<ReentryLock>> {
        Ok(self.locks.read().await.get(key).cloned())
    }

    async fn all(&self) -> StoreResult<Vec<ReentryLock>> {
        Ok(self.locks.read().await.values().cloned().collect())
    }
}

// =============================================================================
// Exit-record ledger
// =============================================================================

#[derive(Default)]
struct LedgerTable {
    records: RwLock<Vec<ExitRecord>>,
}

#[async_trait]
impl ExitRecordRepository for LedgerTable {
    async fn append(&self, record: &ExitRecord) -> StoreResult<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn find_by_position(&self, id: PositionId) -> StoreResult<Vec<ExitRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.position_id == id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
