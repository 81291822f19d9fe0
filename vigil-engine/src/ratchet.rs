//! Stop-Loss Ratchet Controller
//!
//! Computes the protective stop as a function of realized profit
//! milestones. The stop is monotonic in the favorable direction: every
//! proposal must tighten, and proposals that fall inside the guardrails
//! (minimum step, minimum buffer from price, commit cooldown) are
//! suppressed rather than erroring.
//!
//! Phases:
//! - pre-first-target: frozen, except the absolute-profit lock
//! - post-first-target: breakeven-plus-fees immediately, then discrete
//!   milestone advances
//! - post-second-target: jump to a fraction of the entry→TP2 distance,
//!   then anchored volatility trailing

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::time::Instant;

use vigil_domain::{EngineConfig, MarketSnapshot, Position, Price, RatchetConfig};

/// Per-position commit bookkeeping owned by the lifecycle unit.
///
/// Deliberately not serialized with the Position: a restarted daemon may
/// amend immediately; the command journal suppresses duplicates.
#[derive(Debug, Default)]
pub struct RatchetState {
    /// When the last stop change was committed
    pub last_commit: Option<Instant>,
}

/// What kind of advance a proposal represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Pre-TP1 absolute profit lock
    AbsLock,
    /// Breakeven-plus-fees commit at the first target
    Breakeven,
    /// Discrete milestone advance (new counter value)
    Milestone(u32),
    /// Post-TP2 fraction-of-distance lock
    Tp2Lock,
    /// Post-TP2 anchored volatility trail
    Trail,
}

/// A stop proposal that survived the guardrails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopProposal {
    /// The proposed stop price
    pub stop: Price,
    /// What produced it
    pub kind: StopKind,
}

/// Propose a tighter stop for this tick, or nothing.
pub fn propose(
    position: &Position,
    snapshot: &MarketSnapshot,
    state: &RatchetState,
    cfg: &EngineConfig,
    now: Instant,
) -> Option<StopProposal> {
    let rc = &cfg.ratchet;
    let side = position.side;
    let entry = position.entry_price.as_decimal();
    let price = snapshot.price.as_decimal();
    let current = position.stop.as_decimal();
    let vol = snapshot.primary.volatility.value();

    let breakeven = entry + side.sign() * entry * rc.fee_pad_pct;

    let mut candidates: Vec<(StopKind, Decimal)> = Vec::new();

    if position.targets_hit == 0 {
        // Frozen before the first target; only the absolute lock may act.
        if rc.abs_lock > Decimal::ZERO && position.max_favorable >= rc.abs_lock {
            candidates.push((StopKind::AbsLock, breakeven + side.sign() * rc.abs_lock));
        }
    } else {
        if side.tightens_stop(breakeven, current) {
            candidates.push((StopKind::Breakeven, breakeven));
        }

        if milestone_delay_over(position, snapshot, cfg) {
            if let Some((milestone, lock)) = milestone_candidate(position, rc) {
                // The milestone lock never sits below breakeven
                let lock = favorable_max(side.sign(), lock, breakeven);
                candidates.push((StopKind::Milestone(milestone), lock));
            }
        }

        if position.targets_hit >= 2 {
            let tp2 = position.targets.get(1).map(|t| t.as_decimal());
            if let Some(tp2) = tp2 {
                let lock = entry + rc.tp2_lock_frac * (tp2 - entry);
                candidates.push((StopKind::Tp2Lock, lock));
            }
            if let Some(vol) = vol {
                let extreme = entry + side.sign() * position.max_favorable;
                let trail = extreme - side.sign() * rc.trail_vol_mult * vol;
                candidates.push((StopKind::Trail, trail));
            }
        }
    }

    // Most favorable candidate wins; ties resolve to the later phase.
    let (kind, raw) = candidates
        .into_iter()
        .max_by(|a, b| (side.sign() * a.1).cmp(&(side.sign() * b.1)))?;

    apply_guardrails(position, price, vol, current, raw, kind, rc, state, now)
}

/// Count of milestone steps strictly exceeded beyond the first target.
///
/// A step counts only when MFE strictly exceeds the boundary: at exactly
/// +1.5R beyond TP1 with step 0.5R, two steps have been crossed.
fn steps_crossed(beyond: Decimal, step: Decimal) -> u32 {
    if beyond <= Decimal::ZERO || step <= Decimal::ZERO {
        return 0;
    }
    let mut n = (beyond / step).floor();
    if n * step == beyond {
        n -= Decimal::ONE;
    }
    if n <= Decimal::ZERO {
        return 0;
    }
    n.to_u32().unwrap_or(u32::MAX)
}

fn milestone_candidate(position: &Position, rc: &RatchetConfig) -> Option<(u32, Decimal)> {
    let entry = position.entry_price.as_decimal();
    let side = position.side;
    let tp1 = position.targets.first()?;
    let tp1_r = side.favorable_distance(entry, tp1.as_decimal()) / position.risk_unit;
    let beyond = position.mfe_r() - tp1_r;

    let crossed = steps_crossed(beyond, rc.milestone_step_r);
    if crossed <= position.milestones {
        return None;
    }

    // One advance per commit; the cooldown spaces successive advances.
    let next = position.milestones + 1;
    let lock_r = Decimal::from(next) * rc.milestone_lock_delta_r;
    let stop = entry + side.sign() * lock_r * position.risk_unit;
    Some((next, stop))
}

fn milestone_delay_over(position: &Position, snapshot: &MarketSnapshot, cfg: &EngineConfig) -> bool {
    match position.first_target_at {
        Some(at) => {
            let elapsed = snapshot.timestamp.signed_duration_since(at).num_seconds();
            elapsed >= (cfg.ratchet.post_tp1_delay_bars as i64) * (cfg.bar_secs as i64)
        }
        None => true,
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_guardrails(
    position: &Position,
    price: Decimal,
    vol: Option<Decimal>,
    current: Decimal,
    raw: Decimal,
    kind: StopKind,
    rc: &RatchetConfig,
    state: &RatchetState,
    now: Instant,
) -> Option<StopProposal> {
    let side = position.side;
    let immediate = kind == StopKind::Breakeven;
    // Discrete commits are already quantized by the R-step; the minimum
    // step only guards the continuous candidates against micro-ratchets.
    let quantized = matches!(kind, StopKind::Breakeven | StopKind::Milestone(_));

    // Commit cooldown (breakeven is exempt: it locks immediately at TP1)
    if !immediate {
        if let Some(last) = state.last_commit {
            if now.duration_since(last).as_secs() < rc.stop_cooldown_secs {
                return None;
            }
        }
    }

    // Minimum buffer from current price: never place the stop inside the
    // bid/ask noise band.
    let vol_term = vol.unwrap_or(Decimal::ZERO);
    let gap = (rc.min_gap_vol_mult * vol_term).max(rc.min_gap_pct * price);
    let clamped = match side {
        vigil_domain::Side::Long => raw.min(price - gap),
        vigil_domain::Side::Short => raw.max(price + gap),
    };

    if !side.tightens_stop(clamped, current) {
        return None;
    }

    // Minimum step: reject micro-ratchets into noise
    if !quantized {
        let step = (rc.min_step_vol_mult * vol_term).max(rc.min_step_pct * price);
        if (clamped - current).abs() < step {
            return None;
        }
    }

    Some(StopProposal { stop: Price::from(clamped), kind })
}

fn favorable_max(sign: Decimal, a: Decimal, b: Decimal) -> Decimal {
    if sign * a >= sign * b {
        a
    } else {
        b
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
    use vigil_domain::Side;
    use vigil_testkit::{t0, test_config, test_position, SnapshotBuilder};

    fn fresh_state() -> RatchetState {
        RatchetState::default()
    }

    // entry 200, initial stop 199 → R = 1
    fn long_with_targets(targets_hit: usize) -> Position {
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
        p.targets_hit = targets_hit;
        if targets_hit >= 1 {
            // Delay window already served
            p.first_target_at = Some(t0() - Duration::seconds(3600));
        }
        p
    }

    #[test]
    fn test_pre_tp1_is_frozen() {
        let cfg = test_config();
        let p = long_with_targets(0);
        // Price runs a full R without touching TP1 accounting
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).price(dec!(200.9)).build();

        assert_eq!(propose(&p, &snap, &fresh_state(), &cfg, Instant::now()), None);
    }

    #[test]
    fn test_abs_lock_engages_after_threshold() {
        let mut cfg = test_config();
        cfg.ratchet.abs_lock = dec!(0.5);

        let mut p = long_with_targets(0);
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).price(dec!(201.5)).build();
        p.record_excursion(snap.price, snap.timestamp);

        let proposal = propose(&p, &snap, &fresh_state(), &cfg, Instant::now()).unwrap();
        assert_eq!(proposal.kind, StopKind::AbsLock);
        // breakeven (200 * 1.001 = 200.2) + 0.5 lock
        assert_eq!(proposal.stop.as_decimal(), dec!(200.7));
    }

    #[test]
    fn test_abs_lock_below_threshold_stays_frozen() {
        let mut cfg = test_config();
        cfg.ratchet.abs_lock = dec!(0.5);

        let mut p = long_with_targets(0);
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).price(dec!(200.4)).build();
        p.record_excursion(snap.price, snap.timestamp);

        assert_eq!(propose(&p, &snap, &fresh_state(), &cfg, Instant::now()), None);
    }

    #[test]
    fn test_breakeven_commits_immediately_at_tp1() {
        let cfg = test_config();
        let mut p = long_with_targets(1);
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).price(dec!(201)).build();
        p.record_excursion(snap.price, snap.timestamp);

        // Cooldown just served must not delay the breakeven lock
        let state = RatchetState { last_commit: Some(Instant::now()) };
        let proposal = propose(&p, &snap, &state, &cfg, Instant::now()).unwrap();
        assert_eq!(proposal.kind, StopKind::Breakeven);
        // 200 * (1 + 0.0010)
        assert_eq!(proposal.stop.as_decimal(), dec!(200.2));
    }

    #[test]
    fn test_breakeven_direction_for_short() {
        let cfg = test_config();
        let mut p = test_position("SOLUSDT", Side::Short, dec!(200), dec!(201));
        p.commit_targets(
            vec![Price::new(dec!(199)).unwrap(), Price::new(dec!(198)).unwrap()],
            t0(),
        )
        .unwrap();
        p.targets_hit = 1;
        p.first_target_at = Some(t0() - Duration::seconds(3600));
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).price(dec!(199)).build();
        p.record_excursion(snap.price, snap.timestamp);

        let proposal = propose(&p, &snap, &fresh_state(), &cfg, Instant::now()).unwrap();
        assert_eq!(proposal.kind, StopKind::Breakeven);
        // Below entry for a short: 200 * (1 - 0.0010)
        assert_eq!(proposal.stop.as_decimal(), dec!(199.8));
    }

    #[test]
    fn test_milestone_steps_strict_boundary() {
        assert_eq!(steps_crossed(dec!(0.4), dec!(0.5)), 0);
        assert_eq!(steps_crossed(dec!(0.5), dec!(0.5)), 0);
        assert_eq!(steps_crossed(dec!(0.6), dec!(0.5)), 1);
        assert_eq!(steps_crossed(dec!(1.0), dec!(0.5)), 1);
        assert_eq!(steps_crossed(dec!(1.5), dec!(0.5)), 2);
        assert_eq!(steps_crossed(dec!(1.7), dec!(0.5)), 3);
        assert_eq!(steps_crossed(dec!(0), dec!(0.5)), 0);
    }

    #[test]
    fn test_milestone_advances_one_at_a_time() {
        let cfg = test_config();
        let mut p = long_with_targets(1);
        p.commit_stop(Price::new(dec!(200.2)).unwrap(), t0()).unwrap(); // BE already locked

        // MFE = 2.5R → 1.5R beyond TP1 → two steps crossed
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).price(dec!(202.5)).build();
        p.record_excursion(snap.price, snap.timestamp);

        let proposal = propose(&p, &snap, &fresh_state(), &cfg, Instant::now()).unwrap();
        assert_eq!(proposal.kind, StopKind::Milestone(1));
        // entry + 1 * 0.25R = 200.25
        assert_eq!(proposal.stop.as_decimal(), dec!(200.25));

        // After committing milestone 1, the next proposal is milestone 2
        p.commit_stop(proposal.stop, t0()).unwrap();
        p.advance_milestone(1, t0()).unwrap();

        let proposal = propose(&p, &snap, &fresh_state(), &cfg, Instant::now()).unwrap();
        assert_eq!(proposal.kind, StopKind::Milestone(2));
        assert_eq!(proposal.stop.as_decimal(), dec!(200.5));

        // Both steps committed: nothing further at this MFE
        p.commit_stop(proposal.stop, t0()).unwrap();
        p.advance_milestone(2, t0()).unwrap();
        assert_eq!(propose(&p, &snap, &fresh_state(), &cfg, Instant::now()), None);
    }

    #[test]
    fn test_milestone_respects_cooldown() {
        let cfg = test_config();
        let mut p = long_with_targets(1);
        p.commit_stop(Price::new(dec!(200.2)).unwrap(), t0()).unwrap();
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).price(dec!(202.5)).build();
        p.record_excursion(snap.price, snap.timestamp);

        // A commit landed moments ago: proposal suppressed
        let state = RatchetState { last_commit: Some(Instant::now()) };
        assert_eq!(propose(&p, &snap, &state, &cfg, Instant::now()), None);
    }

    #[test]
    fn test_milestone_waits_for_post_tp1_delay() {
        let cfg = test_config();
        let mut p = long_with_targets(1);
        p.commit_stop(Price::new(dec!(200.2)).unwrap(), t0()).unwrap();
        // First target hit just now: delay bars not served yet
        p.first_target_at = Some(t0());
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(202.5))
            .at(t0() + Duration::seconds(60))
            .build();
        p.record_excursion(snap.price, snap.timestamp);

        assert_eq!(propose(&p, &snap, &fresh_state(), &cfg, Instant::now()), None);
    }

    #[test]
    fn test_milestone_below_breakeven_floor_is_noop() {
        let mut cfg = test_config();
        cfg.ratchet.milestone_lock_delta_r = dec!(0.01); // tiny advance
        let mut p = long_with_targets(1);
        p.commit_stop(Price::new(dec!(200.2)).unwrap(), t0()).unwrap();
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).price(dec!(202.5)).build();
        p.record_excursion(snap.price, snap.timestamp);

        // entry + 0.01R = 200.01 < breakeven floor 200.2 → candidate is the
        // BE floor, which does not tighten the already-BE stop
        assert_eq!(propose(&p, &snap, &fresh_state(), &cfg, Instant::now()), None);
    }

    #[test]
    fn test_min_step_suppresses_trail_micro_ratchet() {
        let cfg = test_config();
        let mut p = long_with_targets(2);
        p.commit_stop(Price::new(dec!(203.2)).unwrap(), t0()).unwrap();

        // Extreme 204, vol 0.9 → trail = 203.28: only 0.08 better than the
        // committed stop, below the 0.20 * vol floor
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(203.9))
            .volatility_abs(dec!(0.9))
            .build();
        p.record_excursion(Price::new(dec!(204)).unwrap(), snap.timestamp);

        assert_eq!(propose(&p, &snap, &fresh_state(), &cfg, Instant::now()), None);
    }

    #[test]
    fn test_min_gap_clamps_to_price_buffer() {
        let cfg = test_config();
        let mut p = long_with_targets(2);
        p.commit_stop(Price::new(dec!(200.5)).unwrap(), t0()).unwrap();

        // Price sits barely above the tp2 lock level: the clamp pulls the
        // candidate back below price by the buffer
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(201.55))
            .volatility_pct(dec!(0.0045))
            .build();
        p.record_excursion(Price::new(dec!(202.2)).unwrap(), snap.timestamp);

        let proposal = propose(&p, &snap, &fresh_state(), &cfg, Instant::now());
        if let Some(prop) = proposal {
            let gap = dec!(0.35) * dec!(200) * dec!(0.0045); // vol term dominates
            assert!(prop.stop.as_decimal() <= dec!(201.55) - gap);
        }
    }

    #[test]
    fn test_post_tp2_trail_follows_extreme() {
        let cfg = test_config();
        let mut p = long_with_targets(2);
        p.commit_stop(Price::new(dec!(200.5)).unwrap(), t0()).unwrap();

        // Extreme at 204, vol 0.9 → trail = 204 - 0.8 * 0.9 = 203.28
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(203.9))
            .volatility_abs(dec!(0.9))
            .build();
        p.record_excursion(Price::new(dec!(204)).unwrap(), snap.timestamp);

        let proposal = propose(&p, &snap, &fresh_state(), &cfg, Instant::now()).unwrap();
        assert_eq!(proposal.kind, StopKind::Trail);
        assert_eq!(proposal.stop.as_decimal(), dec!(203.28));
    }

    #[test]
    fn test_tp2_lock_when_trail_unavailable() {
        let cfg = test_config();
        let mut p = long_with_targets(2);
        p.commit_stop(Price::new(dec!(200.2)).unwrap(), t0()).unwrap();

        // Volatility warming up: trail candidate unavailable, fraction lock
        // still applies. tp2 = 202 → lock = 200 + 0.75 * 2 = 201.5
        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(202.6))
            .volatility_not_ready()
            .build();
        p.record_excursion(snap.price, snap.timestamp);

        let proposal = propose(&p, &snap, &fresh_state(), &cfg, Instant::now()).unwrap();
        assert_eq!(proposal.kind, StopKind::Tp2Lock);
        assert_eq!(proposal.stop.as_decimal(), dec!(201.5));
    }

    #[test]
    fn test_proposals_never_loosen_the_stop() {
        let cfg = test_config();
        let mut p = long_with_targets(2);
        // Stop already well above every candidate
        p.commit_stop(Price::new(dec!(203.9)).unwrap(), t0()).unwrap();

        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200))
            .price(dec!(204.0))
            .build();
        p.record_excursion(snap.price, snap.timestamp);

        assert_eq!(propose(&p, &snap, &fresh_state(), &cfg, Instant::now()), None);
    }
}
