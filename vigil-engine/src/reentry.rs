//! Reentry Gatekeeper
//!
//! After a close, blocks new entries on the same (instrument, side) until
//! all of the following hold: the cooldown elapsed, the candidate price
//! sits farther than the configured distance from the last exit, and a
//! fresh trigger exists (newly-formed structure, or an
//! extension-and-pullback with momentum above the floor).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use vigil_domain::{CandidateEntry, ReentryConfig, ReentryLock};

/// Why a candidate entry was blocked.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum ReentryBlock {
    /// Cooldown since the last close has not elapsed
    #[error("cooldown: {remaining_secs}s remaining")]
    Cooldown {
        /// Seconds left on the cooldown
        remaining_secs: i64,
    },
    /// Candidate price is inside the no-progress band around the exit
    #[error("price within {required} of last exit")]
    TooClose {
        /// Required distance in quote units
        required: Decimal,
    },
    /// Neither fresh-trigger condition is satisfied
    #[error("no fresh trigger since exit")]
    NoFreshTrigger,
}

/// Evaluate a candidate entry against the lock written at the last close.
///
/// `volatility` (absolute price units, from the candidate's snapshot) may
/// scale the distance requirement; `None` falls back to the fixed
/// percentage floor alone.
pub fn allow(
    lock: &ReentryLock,
    candidate: &CandidateEntry,
    volatility: Option<Decimal>,
    cfg: &ReentryConfig,
    now: DateTime<Utc>,
) -> Result<(), ReentryBlock> {
    // (a) cooldown
    let elapsed = now.signed_duration_since(lock.exited_at).num_seconds();
    if elapsed < cfg.cooldown_secs as i64 {
        return Err(ReentryBlock::Cooldown { remaining_secs: cfg.cooldown_secs as i64 - elapsed });
    }

    // (b) distance from the last exit price
    let exit = lock.exit_price.as_decimal();
    let mut required = cfg.min_distance_pct * exit;
    if let Some(vol) = volatility {
        required = required.max(cfg.distance_vol_mult * vol);
    }
    let distance = (candidate.price.as_decimal() - exit).abs();
    if distance <= required {
        return Err(ReentryBlock::TooClose { required });
    }

    // (c) fresh trigger: new structure, or extension-and-pullback with
    // momentum above the floor
    let momentum_ok = candidate
        .momentum
        .value()
        .map(|m| m >= cfg.momentum_floor)
        .unwrap_or(false);
    let extended = candidate.extension_pct >= cfg.extension_pct && momentum_ok;

    if candidate.fresh_structure || extended {
        Ok(())
    } else {
        Err(ReentryBlock::NoFreshTrigger)
    }
}

// =============================================================================
// Tests
// =============================================================================
