//! Take-Profit Ladder Controller
//!
//! Computes an ordered set of target distances from entry, either as
//! fixed risk-multiples or as volatility-multiples with regime-adaptive
//! widening (RUNNER uses wider multiples than CHOP). Committed ladders
//! are extend-only: a regime downgrade never pulls targets closer.
//! Amendments are deduplicated against the last committed ladder by an
//! epsilon and rate-limited by a minimum interval.

use rust_decimal::Decimal;
use tokio::time::Instant;

use vigil_domain::{EngineConfig, LadderMode, MarketSnapshot, Position, Price, Regime};

/// Per-position amendment bookkeeping owned by the lifecycle unit.
#[derive(Debug, Default)]
pub struct LadderState {
    /// When the last ladder amendment was committed
    pub last_amend: Option<Instant>,
}

/// Propose a new committed ladder for this tick, or nothing.
///
/// Returns the full ladder to commit (already merged extend-only against
/// the committed one). Rungs that have been hit are never moved.
pub fn propose(
    position: &Position,
    snapshot: &MarketSnapshot,
    regime: Regime,
    state: &LadderState,
    cfg: &EngineConfig,
    now: Instant,
) -> Option<Vec<Price>> {
    // Rate limit amendments per position
    if let Some(last) = state.last_amend {
        if now.duration_since(last).as_secs() < cfg.ladder.cooldown_secs {
            return None;
        }
    }

    let distances = desired_distances(position, snapshot, regime, cfg)?;
    let entry = position.entry_price.as_decimal();
    let sign = position.side.sign();

    let mut merged: Vec<Decimal> = Vec::with_capacity(distances.len());
    for (i, d) in distances.iter().enumerate() {
        let candidate = entry + sign * d;
        let value = match position.targets.get(i) {
            // Hit rungs are frozen; unhit rungs extend but never retreat
            Some(committed) if i < position.targets_hit => committed.as_decimal(),
            Some(committed) => {
                let c = committed.as_decimal();
                if sign * candidate > sign * c {
                    candidate
                } else {
                    c
                }
            }
            None => candidate,
        };
        merged.push(value);
    }

    // Dedupe: only emit when some rung moved by more than epsilon
    if !position.targets.is_empty() && position.targets.len() == merged.len() {
        let eps = cfg.ladder.epsilon_pct * snapshot.price.as_decimal();
        let moved = merged
            .iter()
            .zip(position.targets.iter())
            .any(|(m, c)| (*m - c.as_decimal()).abs() > eps);
        if !moved {
            return None;
        }
    }

    Some(merged.into_iter().map(Price::from).collect())
}

/// Desired rung distances from entry, in quote units.
///
/// `None` while the required inputs are warming up: the committed ladder
/// simply stays in place.
fn desired_distances(
    position: &Position,
    snapshot: &MarketSnapshot,
    regime: Regime,
    cfg: &EngineConfig,
) -> Option<Vec<Decimal>> {
    match &cfg.ladder.mode {
        LadderMode::RiskMultiples { mults } => {
            Some(mults.iter().map(|m| m * position.risk_unit).collect())
        }
        LadderMode::Volatility { chop_mults, runner_mults } => {
            let vol = snapshot.primary.volatility.value()?;
            let mults = match regime {
                Regime::Chop => chop_mults,
                Regime::Runner => runner_mults,
            };
            Some(mults.iter().map(|m| m * vol).collect())
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
