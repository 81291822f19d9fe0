//! Lifecycle Manager: owns the position registry and the units.
//!
//! - `on_fill` registers a position on its (symbol, side) key (at most
//!   one open position per key) and spawns its lifecycle unit
//! - `gate` consults the re-entry gatekeeper before the external signal
//!   engine may propose on a key
//! - `restore` re-spawns units for open positions after a restart
//!
//! All registry and lock-table access happens under the key's entry
//! lock, so unrelated instruments proceed unimpeded.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_domain::{
    CandidateEntry, EntryDraft, Position, PositionId, PositionKey, ReentryLock,
};
use vigil_engine::{Engine, ReentryBlock};
use vigil_exec::{Dispatcher, OrderGatewayPort};
use vigil_store::{MemoryStore, Store};

use crate::error::DaemonResult;
use crate::event_bus::EventBus;
use crate::lifecycle::LifecycleUnit;
use crate::notifier::Notifier;

/// Why the proposal gate denied a candidate entry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateDenied {
    /// The key already holds an open position
    #[error("position already open on this key")]
    PositionOpen,
    /// The re-entry gatekeeper blocked the candidate
    #[error(transparent)]
    Reentry(#[from] ReentryBlock),
}

struct UnitHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Manages lifecycle units and the shared registry/lock tables.
pub struct LifecycleManager<G: OrderGatewayPort + 'static> {
    engine: Engine,
    store: Arc<MemoryStore>,
    dispatcher: Arc<Dispatcher<G>>,
    bus: Arc<EventBus>,
    notifier: Arc<dyn Notifier>,
    units: Arc<RwLock<HashMap<PositionId, UnitHandle>>>,
}

impl<G: OrderGatewayPort + 'static> LifecycleManager<G> {
    /// Create a manager.
    pub fn new(
        engine: Engine,
        store: Arc<MemoryStore>,
        dispatcher: Arc<Dispatcher<G>>,
        bus: Arc<EventBus>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            engine,
            store,
            dispatcher,
            bus,
            notifier,
            units: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Handle an entry fill: register the position and start its unit.
    pub async fn on_fill(&self, draft: EntryDraft) -> DaemonResult<Position> {
        let key = PositionKey::new(draft.symbol.clone(), draft.side);
        let key_lock = self.store.key_lock(&key).await;
        let _guard = key_lock.lock().await;

        let position = Position::open(
            draft.symbol,
            draft.side,
            draft.price,
            draft.quantity,
            draft.initial_stop,
            draft.entry,
            Utc::now(),
        )?;

        self.store.positions().register(&position).await?;

        info!(
            position_id = %position.id,
            key = %key,
            entry_price = %position.entry_price,
            stop = %position.stop,
            "Position registered"
        );

        self.spawn_unit(position.clone()).await;
        Ok(position)
    }

    /// Gate a candidate entry on its key.
    ///
    /// An open position on the key denies outright; otherwise the
    /// re-entry lock (if one exists) is evaluated against cooldown,
    /// distance, and fresh-trigger conditions.
    pub async fn gate(
        &self,
        candidate: &CandidateEntry,
        volatility: Option<Decimal>,
    ) -> DaemonResult<Result<(), GateDenied>> {
        let key = PositionKey::new(candidate.symbol.clone(), candidate.side);
        let key_lock = self.store.key_lock(&key).await;
        let _guard = key_lock.lock().await;

        if self.store.positions().find_open_by_key(&key).await?.is_some() {
            return Ok(Err(GateDenied::PositionOpen));
        }

        match self.store.reentry_locks().get(&key).await? {
            None => Ok(Ok(())),
            Some(lock) => Ok(self
                .engine
                .gate_reentry(&lock, candidate, volatility, Utc::now())
                .map_err(GateDenied::Reentry)),
        }
    }

    /// Re-spawn lifecycle units for open positions (restart recovery).
    pub async fn restore(&self) -> DaemonResult<usize> {
        let open = self.store.positions().find_open().await?;
        let count = open.len();

        for position in open {
            info!(
                position_id = %position.id,
                key = %position.key(),
                "Resuming lifecycle unit"
            );
            self.spawn_unit(position).await;
        }

        if count > 0 {
            info!(count, "Restored open positions from store");
        } else {
            info!("No open positions to restore");
        }
        Ok(count)
    }

    async fn spawn_unit(&self, position: Position) {
        let position_id = position.id;
        let token = CancellationToken::new();
        let unit = LifecycleUnit::new(
            position,
            self.engine.clone(),
            self.store.clone(),
            self.dispatcher.clone(),
            self.bus.clone(),
            self.notifier.clone(),
            token.clone(),
        );
        let receiver = self.bus.subscribe();

        // Insert before spawning so a fast-exiting unit cannot race its
        // own cleanup.
        let mut units = self.units.write().await;
        let registry = Arc::clone(&self.units);
        let handle = tokio::spawn(async move {
            unit.run(receiver).await;
            registry.write().await.remove(&position_id);
        });
        units.insert(position_id, UnitHandle { token, handle });
    }

    /// Number of running lifecycle units.
    pub async fn unit_count(&self) -> usize {
        self.units.read().await.len()
    }

    /// Open positions, for the status surface.
    pub async fn open_positions(&self) -> DaemonResult<Vec<Position>> {
        Ok(self.store.positions().find_open().await?)
    }

    /// Re-entry locks, for the status surface.
    pub async fn reentry_locks(&self) -> DaemonResult<Vec<ReentryLock>> {
        Ok(self.store.reentry_locks().all().await?)
    }

    /// Cancel every unit and wait for them to stop.
    pub async fn shutdown(&self) {
        let handles: Vec<(PositionId, UnitHandle)> =
            self.units.write().await.drain().collect();

        for (position_id, unit) in handles {
            unit.token.cancel();
            if let Err(e) = unit.handle.await {
                warn!(%position_id, error = %e, "Unit join failed during shutdown");
            }
        }
    }
}
