//! Lifecycle Unit: one task per open position.
//!
//! Each tick: pull the latest snapshot from the bus, reject stale
//! envelopes, run the engine, and apply the decision: persist observed
//! state, send sequenced amendments with bounded retry, emit telemetry
//! and notifications. On a terminal resolution the unit flattens the
//! remainder (unless the venue is already flat), writes the re-entry
//! lock exactly once, appends the exit record, releases its registry
//! entry, and stops scheduling ticks.
//!
//! A venue size report that disagrees with internal state is a desync:
//! the unit runs a forced close-audit and halts.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vigil_domain::{
    Event, ExitReason, GuardState, MarketSnapshot, NotificationMessage, Position, Price, Quantity,
    ReentryLock,
};
use vigil_domain::ExitRecord;
use vigil_engine::{ControllerState, Engine, EngineError, StopKind};
use vigil_exec::{AmendAction, DispatchOutcome, Dispatcher, ExecError, OrderGatewayPort};
use vigil_store::{MemoryStore, Store};

use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{DaemonEvent, EventBus, EventReceiver};
use crate::notifier::Notifier;

/// One position's lifecycle task.
pub struct LifecycleUnit<G: OrderGatewayPort + 'static> {
    position: Position,
    engine: Engine,
    store: Arc<MemoryStore>,
    dispatcher: Arc<Dispatcher<G>>,
    bus: Arc<EventBus>,
    notifier: Arc<dyn Notifier>,
    state: ControllerState,
    token: CancellationToken,
}

impl<G: OrderGatewayPort + 'static> LifecycleUnit<G> {
    /// Create a unit for an open position.
    pub fn new(
        position: Position,
        engine: Engine,
        store: Arc<MemoryStore>,
        dispatcher: Arc<Dispatcher<G>>,
        bus: Arc<EventBus>,
        notifier: Arc<dyn Notifier>,
        token: CancellationToken,
    ) -> Self {
        Self {
            position,
            engine,
            store,
            dispatcher,
            bus,
            notifier,
            state: ControllerState::default(),
            token,
        }
    }

    /// Run until the position closes or the unit is cancelled.
    pub async fn run(mut self, mut events: EventReceiver) {
        info!(
            position_id = %self.position.id,
            symbol = %self.position.symbol.as_pair(),
            side = %self.position.side,
            "Lifecycle unit started"
        );

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    info!(position_id = %self.position.id, "Lifecycle unit cancelled");
                    break;
                }
                maybe = events.recv() => {
                    match maybe {
                        None => break,
                        Some(Err(lag_msg)) => {
                            warn!(position_id = %self.position.id, %lag_msg, "Unit receiver lagged");
                        }
                        Some(Ok(event)) => match self.handle_event(event).await {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(e) => {
                                error!(position_id = %self.position.id, error = %e, "Tick failed");
                                if matches!(e, DaemonError::PositionDesync { .. }) {
                                    // Fatal: operator attention required
                                    break;
                                }
                            }
                        },
                    }
                }
            }
        }

        info!(position_id = %self.position.id, "Lifecycle unit stopped");
    }

    /// Process one bus event. `Ok(true)` means the unit is done.
    async fn handle_event(&mut self, event: DaemonEvent) -> DaemonResult<bool> {
        match event {
            DaemonEvent::Snapshot(snapshot) if snapshot.symbol == self.position.symbol => {
                self.on_snapshot(snapshot).await
            }
            DaemonEvent::GatewayFlat { symbol, side }
                if symbol == self.position.symbol && side == self.position.side =>
            {
                info!(position_id = %self.position.id, "Gateway reports flat, halting");
                self.close(ExitReason::ExternallyFlat, self.mark_price(), false).await?;
                Ok(true)
            }
            DaemonEvent::Shutdown => Ok(true),
            _ => Ok(false),
        }
    }

    async fn on_snapshot(&mut self, snapshot: MarketSnapshot) -> DaemonResult<bool> {
        // The flat check runs before staleness: a zero-size report halts
        // the loop immediately, whatever the snapshot ordering says.
        if self.probe_gateway_size(&snapshot).await? {
            info!(position_id = %self.position.id, "Venue reports zero size, halting");
            self.close(ExitReason::ExternallyFlat, snapshot.price, false).await?;
            return Ok(true);
        }

        let decision = match self.engine.evaluate(
            &self.position,
            &snapshot,
            &self.state,
            false,
            Instant::now(),
        ) {
            Ok(decision) => decision,
            Err(EngineError::DataStale { snapshot, last_processed }) => {
                // Normal under replay/reconnect; no state change
                debug!(
                    position_id = %self.position.id,
                    %snapshot,
                    %last_processed,
                    "Stale snapshot skipped"
                );
                return Ok(false);
            }
            Err(e) => {
                warn!(position_id = %self.position.id, error = %e, "Snapshot rejected");
                return Ok(false);
            }
        };

        self.apply(decision, &snapshot).await
    }

    /// Compare the venue-reported size with internal state.
    ///
    /// Returns whether the venue sees the position flat. A non-zero
    /// mismatch runs the forced close-audit and surfaces as
    /// `PositionDesync`.
    async fn probe_gateway_size(&mut self, snapshot: &MarketSnapshot) -> DaemonResult<bool> {
        match self
            .dispatcher
            .position_size(&self.position.symbol, self.position.side)
            .await
        {
            Ok(Some(reported)) if reported.is_zero() => Ok(true),
            Ok(Some(reported)) if reported != self.position.quantity => {
                let expected = self.position.quantity.as_decimal();
                self.emit(&Event::Desynced {
                    position_id: self.position.id,
                    expected,
                    reported: reported.as_decimal(),
                    timestamp: snapshot.timestamp,
                })
                .await;
                // Venue state wins: flatten whatever remains and audit
                self.close(ExitReason::ExternallyFlat, snapshot.price, true).await?;
                Err(DaemonError::PositionDesync {
                    position_id: self.position.id,
                    expected,
                    reported: reported.as_decimal(),
                })
            }
            Ok(_) => Ok(false),
            Err(e) => {
                // Size probe failure is not a desync; continue on internal state
                warn!(position_id = %self.position.id, error = %e, "Size probe failed");
                Ok(false)
            }
        }
    }

    async fn apply(
        &mut self,
        decision: vigil_engine::TickDecision,
        snapshot: &MarketSnapshot,
    ) -> DaemonResult<bool> {
        self.position = decision.position;

        for event in &decision.events {
            self.emit(event).await;
        }

        if let Some(reason) = decision.exit {
            let send_close = reason != ExitReason::ExternallyFlat;
            self.close(reason, snapshot.price, send_close).await?;
            return Ok(true);
        }

        if let Some(proposal) = decision.stop {
            self.commit_stop(proposal, snapshot).await?;
        }

        if let Some(ladder) = decision.ladder {
            self.commit_ladder(ladder, snapshot).await?;
        }

        self.store.positions().save(&self.position).await?;
        Ok(false)
    }

    async fn commit_stop(
        &mut self,
        proposal: vigil_engine::StopProposal,
        snapshot: &MarketSnapshot,
    ) -> DaemonResult<()> {
        let action = AmendAction::SetStop { stop: proposal.stop };
        match self.dispatcher.dispatch(self.position.id, action).await {
            Ok(DispatchOutcome::Applied(_)) => {
                let previous = self.position.stop;
                self.position.commit_stop(proposal.stop, snapshot.timestamp)?;
                self.state.ratchet.last_commit = Some(Instant::now());

                if let StopKind::Milestone(milestone) = proposal.kind {
                    self.position.advance_milestone(milestone, snapshot.timestamp)?;
                    self.emit(&Event::MilestoneAdvanced {
                        position_id: self.position.id,
                        milestone,
                        mfe_r: self.position.mfe_r(),
                        stop: proposal.stop,
                        timestamp: snapshot.timestamp,
                    })
                    .await;
                }

                self.emit(&Event::StopCommitted {
                    position_id: self.position.id,
                    previous,
                    current: proposal.stop,
                    trigger_price: snapshot.price,
                    timestamp: snapshot.timestamp,
                })
                .await;
                Ok(())
            }
            Ok(DispatchOutcome::DuplicateSuppressed(_)) => Ok(()),
            Err(ExecError::AmendmentRejected { sequence, attempts, reason, .. }) => {
                // Fatal for this tick only: committed stop unchanged
                self.emit(&Event::AmendmentFailed {
                    position_id: self.position.id,
                    sequence,
                    attempts,
                    error: reason,
                    timestamp: snapshot.timestamp,
                })
                .await;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit_ladder(
        &mut self,
        ladder: Vec<Price>,
        snapshot: &MarketSnapshot,
    ) -> DaemonResult<()> {
        let action = AmendAction::SetTargets { targets: ladder.clone() };
        match self.dispatcher.dispatch(self.position.id, action).await {
            Ok(DispatchOutcome::Applied(_)) => {
                let previous = self.position.targets.clone();
                self.position.commit_targets(ladder.clone(), snapshot.timestamp)?;
                self.state.ladder.last_amend = Some(Instant::now());
                self.emit(&Event::LadderCommitted {
                    position_id: self.position.id,
                    previous,
                    current: ladder,
                    timestamp: snapshot.timestamp,
                })
                .await;
                Ok(())
            }
            Ok(DispatchOutcome::DuplicateSuppressed(_)) => Ok(()),
            Err(ExecError::AmendmentRejected { sequence, attempts, reason, .. }) => {
                self.emit(&Event::AmendmentFailed {
                    position_id: self.position.id,
                    sequence,
                    attempts,
                    error: reason,
                    timestamp: snapshot.timestamp,
                })
                .await;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Terminal path: flatten, audit, release.
    async fn close(
        &mut self,
        reason: ExitReason,
        exit_price: Price,
        send_close: bool,
    ) -> DaemonResult<()> {
        let now = Utc::now();
        self.position.begin_close(reason, now)?;

        if send_close {
            match self.dispatcher.dispatch(self.position.id, AmendAction::Close).await {
                Ok(_) => {}
                Err(e) => {
                    // The audit still proceeds; the remainder is flat on the
                    // venue or requires the operator either way
                    error!(position_id = %self.position.id, error = %e, "Close command failed");
                }
            }
        }
        // In-flight amendments are cancelled best-effort
        self.dispatcher.cancel_all(self.position.id).await;

        self.position.finish_close(exit_price, now)?;

        // Per-key critical section: the lock write, the ledger append,
        // and the registry release happen under the key's entry lock.
        let key = self.position.key();
        let key_lock = self.store.key_lock(&key).await;
        let _guard = key_lock.lock().await;

        self.store
            .reentry_locks()
            .put(&ReentryLock {
                symbol: self.position.symbol.clone(),
                side: self.position.side,
                exit_price,
                exited_at: now,
                exit_reason: reason,
            })
            .await?;

        if let Some(record) = ExitRecord::from_closed(&self.position) {
            self.store.exit_records().append(&record).await?;

            self.notifier
                .notify(NotificationMessage::ExitSummary {
                    symbol: self.position.symbol.clone(),
                    side: self.position.side,
                    reason: reason.as_str().to_string(),
                    entry_price: self.position.entry_price,
                    exit_price,
                    realized_r: record.realized_r,
                })
                .await;
        }

        self.store.positions().release(self.position.id).await?;
        self.dispatcher.release(self.position.id);

        self.emit(&Event::Closed {
            position_id: self.position.id,
            reason,
            entry_price: self.position.entry_price,
            exit_price,
            max_favorable: self.position.max_favorable,
            max_adverse: self.position.max_adverse,
            timestamp: now,
        })
        .await;

        self.bus.send(DaemonEvent::PositionClosed {
            position_id: self.position.id,
            reason,
        });

        info!(
            position_id = %self.position.id,
            reason = %reason,
            exit_price = %exit_price,
            "Position closed"
        );
        Ok(())
    }

    /// Telemetry fan-out plus the notification mapping for the
    /// user-facing transitions.
    async fn emit(&self, event: &Event) {
        debug!(
            position_id = %event.position_id(),
            event_type = event.event_type(),
            "Telemetry event"
        );
        self.bus.send(DaemonEvent::Telemetry(event.clone()));

        match event {
            Event::RegimeChanged { current, .. } => {
                self.notifier
                    .notify(NotificationMessage::RegimeLabel {
                        symbol: self.position.symbol.clone(),
                        side: self.position.side,
                        regime: *current,
                    })
                    .await;
            }
            Event::GuardChanged { current, .. } => {
                let reason = match current {
                    GuardState::Warn { reason, .. } => Some(reason.as_str().to_string()),
                    GuardState::Exit { reason } => Some(reason.as_str().to_string()),
                    GuardState::Ok => None,
                };
                self.notifier
                    .notify(NotificationMessage::GuardWarning {
                        symbol: self.position.symbol.clone(),
                        side: self.position.side,
                        state: current.label().to_string(),
                        reason,
                    })
                    .await;
            }
            _ => {}
        }
    }

    /// Best price mark available without a snapshot (flat notices).
    fn mark_price(&self) -> Price {
        self.position.stop
    }

    /// The venue-side quantity the unit believes it manages.
    pub fn quantity(&self) -> Quantity {
        self.position.quantity
    }
}
