//! Exit Resolver
//!
//! Combines guard, stop, ladder, and regime signals into a single
//! terminal decision. Reasons are mutually exclusive; the first
//! applicable one in priority order wins:
//!
//! `externally_flat` > `guard_exit` > `stop` > `regime_flip` >
//! `target_final` > `stall`.
//!
//! Regime flip applies only once the first target has been hit and only
//! before the second; stall is the lowest-priority policy and is disabled
//! when `stall_bars` is zero.

use vigil_domain::{EngineConfig, ExitReason, GuardState, MarketSnapshot, Position, Regime};

/// Per-tick inputs that live outside the position itself.
#[derive(Debug, Clone, Copy)]
pub struct ExitContext {
    /// Gateway reported zero size for this position
    pub externally_flat: bool,
    /// Regime carried into this tick (flip detection)
    pub prev_regime: Regime,
}

/// Resolve the terminal decision for this tick, if any.
pub fn resolve(
    position: &Position,
    snapshot: &MarketSnapshot,
    ctx: &ExitContext,
    cfg: &EngineConfig,
) -> Option<ExitReason> {
    if ctx.externally_flat {
        return Some(ExitReason::ExternallyFlat);
    }

    if let GuardState::Exit { reason } = position.guard {
        return Some(ExitReason::GuardExit(reason));
    }

    if position
        .side
        .crossed_adverse(snapshot.price.as_decimal(), position.stop.as_decimal())
    {
        return Some(ExitReason::Stop);
    }

    let flipped = ctx.prev_regime == Regime::Runner && position.regime == Regime::Chop;
    if flipped && position.targets_hit >= 1 && position.targets_hit < 2 {
        return Some(ExitReason::RegimeFlip);
    }

    if !position.targets.is_empty() && position.targets_hit == position.targets.len() {
        return Some(ExitReason::TargetFinal);
    }

    if cfg.stall_bars > 0 {
        let idle = snapshot
            .timestamp
            .signed_duration_since(position.extreme_at)
            .num_seconds();
        if idle >= (cfg.stall_bars as i64) * (cfg.bar_secs as i64) {
            return Some(ExitReason::Stall);
        }
    }

    None
}

// =============================================================================
// Tests
// =============================================================================
