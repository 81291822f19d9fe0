//! Post-Entry Validity Guard (PEV)
//!
//! Checks, before the first profit target is reached, whether the
//! conditions that justified the entry still hold. Pure transition
//! function over [`GuardState`]:
//!
//! - hard invalidation goes straight to Exit, no grace
//! - soft degrade opens a Warn with a grace window; recovery (or a regime
//!   upgrade to RUNNER) clears it, expiry exits with reason `timeout`
//! - unready indicators never cause an Exit; they hold the previous state

use chrono::{DateTime, Utc};
use vigil_domain::{
    EngineConfig, EntrySnapshot, GuardExitReason, GuardState, MarketSnapshot, Regime, WarnReason,
};

/// Evaluate the guard for one snapshot.
///
/// `prev` must be the state carried on the position; Exit is terminal and
/// is returned unchanged. The caller only invokes this while the position
/// has not yet hit its first target.
pub fn evaluate(
    entry: &EntrySnapshot,
    snapshot: &MarketSnapshot,
    prev: GuardState,
    regime: Regime,
    cfg: &EngineConfig,
) -> GuardState {
    if prev.is_exit() {
        return prev;
    }

    let side = entry.side;
    let tf = &snapshot.primary;
    let now = snapshot.timestamp;

    let (trend, vol_pct) = match (tf.trend_strength.value(), tf.volatility_pct(snapshot.price)) {
        (Some(t), Some(v)) => (t, v),
        // Data gap: hold state, never exit on missing indicators
        _ => return prev,
    };

    let bands = &cfg.regime;
    let structure = tf.structure_intact(side);
    let wrong_side = tf
        .on_trend_side(side, snapshot.price)
        .map(|ok| !ok)
        .unwrap_or(false);

    // Hard invalidation: deep metric failure + confirmed wrong-side closes
    let hard = trend <= bands.trend_down - cfg.guard.hard_trend_delta
        && vol_pct <= bands.vol_pct_down * cfg.guard.hard_vol_ratio
        && wrong_side
        && snapshot.confirm.adverse_closes(side) >= cfg.guard.confirm_closes;
    if hard {
        return GuardState::Exit { reason: GuardExitReason::HardInvalidation };
    }

    let soft_reason = if trend <= bands.trend_down {
        Some(WarnReason::TrendWeak)
    } else if vol_pct <= bands.vol_pct_down {
        Some(WarnReason::VolatilityFloor)
    } else if structure == Some(false) {
        Some(WarnReason::StructureBroken)
    } else {
        None
    };

    // Full recovery: both metrics back above the up bands with structure
    // repaired (unknown structure does not block recovery).
    let recovered =
        trend >= bands.trend_up && vol_pct >= bands.vol_pct_up && structure != Some(false);

    match prev {
        GuardState::Warn { since, reason } => {
            // Post-entry quality at or above entry quality clears the warning
            if regime == Regime::Runner || recovered {
                return GuardState::Ok;
            }
            if grace_expired(since, now, cfg) {
                return GuardState::Exit { reason: GuardExitReason::Timeout };
            }
            // Keep the original warn clock; refresh the reason if a new
            // condition is the active one.
            GuardState::Warn { since, reason: soft_reason.unwrap_or(reason) }
        }
        GuardState::Ok => match soft_reason {
            Some(reason) => GuardState::Warn { since: now, reason },
            None => GuardState::Ok,
        },
        GuardState::Exit { .. } => prev,
    }
}

fn grace_expired(since: DateTime<Utc>, now: DateTime<Utc>, cfg: &EngineConfig) -> bool {
    let elapsed = now.signed_duration_since(since).num_seconds();
    elapsed >= cfg.guard_grace_secs() as i64
}

// =============================================================================
// Tests
// =============================================================================
