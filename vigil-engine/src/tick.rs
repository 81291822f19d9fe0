//! Per-Tick Evaluation
//!
//! `Engine::evaluate` is the one entry point the orchestrator calls per
//! snapshot. It validates the envelope (symbol, timestamp ordering),
//! updates the position's observed state (excursions, target hits,
//! regime, guard), resolves a terminal decision if one applies, and
//! otherwise collects at most one stop proposal and one ladder proposal.
//!
//! Pure and deterministic: no I/O, all clocks passed in.

use tokio::time::Instant;

use vigil_domain::{
    DomainError, EngineConfig, Event, ExitReason, MarketSnapshot, Position, Price, Regime,
};

use crate::error::{EngineError, EngineResult};
use crate::ladder::{self, LadderState};
use crate::ratchet::{self, RatchetState, StopProposal};
use crate::regime;
use crate::resolver::{self, ExitContext};
use crate::{guard, reentry};

/// Controller bookkeeping owned by the lifecycle unit.
#[derive(Debug, Default)]
pub struct ControllerState {
    /// Stop ratchet commit clock
    pub ratchet: RatchetState,
    /// Ladder amendment clock
    pub ladder: LadderState,
}

/// The convergent decision for one tick.
#[derive(Debug)]
pub struct TickDecision {
    /// Position with observed state applied (excursions, targets hit,
    /// regime, guard, tick ordering). Stop/ladder commits happen after
    /// the gateway acknowledges the amendment.
    pub position: Position,
    /// At most one stop proposal
    pub stop: Option<StopProposal>,
    /// At most one ladder proposal
    pub ladder: Option<Vec<Price>>,
    /// Terminal resolution, if any; suppresses the proposals above
    pub exit: Option<ExitReason>,
    /// Observed-state events to emit
    pub events: Vec<Event>,
}

/// Pure decision engine: one validated configuration per run.
#[derive(Debug, Clone)]
pub struct Engine {
    cfg: EngineConfig,
}

impl Engine {
    /// Create an engine from a validated configuration.
    pub fn new(cfg: EngineConfig) -> Result<Self, DomainError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// The injected configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Evaluate one snapshot for one position.
    ///
    /// # Errors
    ///
    /// `DataStale` when the snapshot is not strictly newer than the last
    /// processed one (replaying an identical snapshot therefore produces
    /// zero commands); `SymbolMismatch` when the envelope was routed to
    /// the wrong position.
    pub fn evaluate(
        &self,
        position: &Position,
        snapshot: &MarketSnapshot,
        state: &ControllerState,
        externally_flat: bool,
        now: Instant,
    ) -> EngineResult<TickDecision> {
        if snapshot.symbol != position.symbol {
            return Err(EngineError::SymbolMismatch {
                position_symbol: position.symbol.as_pair(),
                snapshot_symbol: snapshot.symbol.as_pair(),
            });
        }
        if snapshot.timestamp <= position.last_tick_at {
            return Err(EngineError::DataStale {
                snapshot: snapshot.timestamp,
                last_processed: position.last_tick_at,
            });
        }

        let mut p = position.clone();
        let mut events = Vec::new();
        let ts = snapshot.timestamp;
        p.last_tick_at = ts;
        p.record_excursion(snapshot.price, ts);

        // Target hits, in ladder order
        while p.targets_hit < p.targets.len() {
            let next = p.targets[p.targets_hit];
            if !p
                .side
                .crossed_favorable(snapshot.price.as_decimal(), next.as_decimal())
            {
                break;
            }
            p.targets_hit += 1;
            if p.targets_hit == 1 {
                p.first_target_at = Some(ts);
            }
            events.push(Event::TargetHit {
                position_id: p.id,
                index: p.targets_hit,
                price: next,
                timestamp: ts,
            });
        }

        // Regime classification with hysteresis
        let prev_regime = p.regime;
        let current_regime = regime::classify(snapshot, prev_regime, &self.cfg.regime);
        if current_regime != prev_regime {
            events.push(Event::RegimeChanged {
                position_id: p.id,
                previous: prev_regime,
                current: current_regime,
                timestamp: ts,
            });
        }
        p.regime = current_regime;
        p.saw_runner |= current_regime == Regime::Runner;

        // Guard runs only until the first target is reached
        if p.targets_hit == 0 {
            let next_guard = guard::evaluate(&p.entry, snapshot, p.guard, p.regime, &self.cfg);
            if next_guard != p.guard {
                events.push(Event::GuardChanged {
                    position_id: p.id,
                    previous: p.guard,
                    current: next_guard,
                    timestamp: ts,
                });
            }
            p.guard = next_guard;
        }

        let exit = resolver::resolve(
            &p,
            snapshot,
            &ExitContext { externally_flat, prev_regime },
            &self.cfg,
        );

        let (stop, ladder) = if exit.is_some() {
            (None, None)
        } else {
            (
                ratchet::propose(&p, snapshot, &state.ratchet, &self.cfg, now),
                ladder::propose(&p, snapshot, p.regime, &state.ladder, &self.cfg, now),
            )
        };

        Ok(TickDecision { position: p, stop, ladder, exit, events })
    }

    /// Gate a candidate entry against the last close on its key.
    ///
    /// Thin forwarding wrapper so callers hold a single engine handle.
    pub fn gate_reentry(
        &self,
        lock: &vigil_domain::ReentryLock,
        candidate: &vigil_domain::CandidateEntry,
        volatility: Option<rust_decimal::Decimal>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), reentry::ReentryBlock> {
        reentry::allow(lock, candidate, volatility, &self.cfg.reentry, now)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use vigil_domain::{GuardState, Side};
    use vigil_testkit::{t0, test_config, test_position, SnapshotBuilder};

    fn engine() -> Engine {
        Engine::new(test_config()).unwrap()
    }

    fn open_long_with_ladder() -> Position {
        let mut p = test_position("SOLUSDT", Side::Long, dec!(200), dec!(199));
        p.commit_targets(
            vec![
                Price::new(dec!(201)).unwrap(),
                Price::new(dec!(202)).unwrap(),
                Price::new(dec!(203)).unwrap(),
            ],
            t0(),
        )
        .unwrap();
        p
    }

    #[test]
    fn test_stale_snapshot_rejected() {
        let engine = engine();
        let mut p = open_long_with_ladder();
        p.last_tick_at = t0() + Duration::seconds(60);

        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).at(t0()).build();
        let result = engine.evaluate(&p, &snap, &ControllerState::default(), false, Instant::now());
        assert!(matches!(result, Err(EngineError::DataStale { .. })));
    }

    #[test]
    fn test_identical_snapshot_replay_is_stale() {
        let engine = engine();
        let p = open_long_with_ladder();
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .at(t0() + Duration::seconds(60))
            .build();

        let decision = engine
            .evaluate(&p, &snap, &ControllerState::default(), false, Instant::now())
            .unwrap();

        // Replaying the very same snapshot against the updated position is
        // rejected before any controller runs
        let replay = engine.evaluate(
            &decision.position,
            &snap,
            &ControllerState::default(),
            false,
            Instant::now(),
        );
        assert!(matches!(replay, Err(EngineError::DataStale { .. })));
    }

    #[test]
    fn test_symbol_mismatch_rejected() {
        let engine = engine();
        let p = open_long_with_ladder();
        let snap = SnapshotBuilder::new("BTCUSDT", dec!(95000))
            .at(t0() + Duration::seconds(60))
            .build();

        let result = engine.evaluate(&p, &snap, &ControllerState::default(), false, Instant::now());
        assert!(matches!(result, Err(EngineError::SymbolMismatch { .. })));
    }

    #[test]
    fn test_target_hits_accumulate_in_order() {
        let engine = engine();
        let p = open_long_with_ladder();
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(202.5))
            .at(t0() + Duration::seconds(60))
            .build();

        let decision = engine
            .evaluate(&p, &snap, &ControllerState::default(), false, Instant::now())
            .unwrap();

        assert_eq!(decision.position.targets_hit, 2);
        assert_eq!(decision.position.first_target_at, Some(snap.timestamp));
        let hits: Vec<_> = decision
            .events
            .iter()
            .filter(|e| matches!(e, Event::TargetHit { .. }))
            .collect();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_guard_inactive_after_first_target() {
        let engine = engine();
        let mut p = open_long_with_ladder();
        p.targets_hit = 1;
        p.first_target_at = Some(t0());

        // Conditions that would hard-invalidate pre-TP1
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(201.1))
            .trend_strength(dec!(21.0))
            .volatility_pct(dec!(0.0030))
            .trend_ref(dec!(205))
            .adverse_closes(Side::Long, 5)
            .at(t0() + Duration::seconds(60))
            .build();

        let decision = engine
            .evaluate(&p, &snap, &ControllerState::default(), false, Instant::now())
            .unwrap();
        assert_eq!(decision.position.guard, GuardState::Ok);
        assert_eq!(decision.exit, None);
    }

    #[test]
    fn test_exit_suppresses_proposals() {
        let engine = engine();
        let p = open_long_with_ladder();
        // Price through the stop; ladder/ratchet would otherwise propose
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(198.8))
            .at(t0() + Duration::seconds(60))
            .build();

        let decision = engine
            .evaluate(&p, &snap, &ControllerState::default(), false, Instant::now())
            .unwrap();
        assert_eq!(decision.exit, Some(ExitReason::Stop));
        assert!(decision.stop.is_none());
        assert!(decision.ladder.is_none());
    }

    #[test]
    fn test_externally_flat_wins_every_tick() {
        let engine = engine();
        let p = open_long_with_ladder();
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(200.5))
            .at(t0() + Duration::seconds(60))
            .build();

        let decision = engine
            .evaluate(&p, &snap, &ControllerState::default(), true, Instant::now())
            .unwrap();
        assert_eq!(decision.exit, Some(ExitReason::ExternallyFlat));
    }

    #[test]
    fn test_regime_flip_flattens_after_first_target() {
        let engine = engine();
        let mut p = open_long_with_ladder();
        p.regime = Regime::Runner;
        p.saw_runner = true;
        p.targets_hit = 1;
        p.first_target_at = Some(t0());

        // Both metrics at/below the down bands: RUNNER reverts to CHOP
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(201.2))
            .trend_strength(dec!(22.0))
            .volatility_pct(dec!(0.0030))
            .at(t0() + Duration::seconds(60))
            .build();

        let decision = engine
            .evaluate(&p, &snap, &ControllerState::default(), false, Instant::now())
            .unwrap();
        assert_eq!(decision.exit, Some(ExitReason::RegimeFlip));
        assert!(decision
            .events
            .iter()
            .any(|e| matches!(e, Event::RegimeChanged { .. })));
    }

    #[test]
    fn test_breakeven_proposed_on_first_target_tick() {
        let engine = engine();
        let p = open_long_with_ladder();
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(201))
            .at(t0() + Duration::seconds(60))
            .build();

        let decision = engine
            .evaluate(&p, &snap, &ControllerState::default(), false, Instant::now())
            .unwrap();
        assert_eq!(decision.position.targets_hit, 1);
        let stop = decision.stop.expect("breakeven proposal");
        assert_eq!(stop.stop.as_decimal(), dec!(200.2));
    }
}
