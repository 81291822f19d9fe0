//! Engine Configuration
//!
//! One immutable, validated configuration object per run. Every threshold
//! the controllers consult lives here under a named field with a
//! documented default; nothing reads ad-hoc globals at runtime.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::value_objects::DomainError;

// =============================================================================
// Regime bands
// =============================================================================

/// Hysteresis bands for the regime classifier.
///
/// Entering RUNNER requires both metrics at/above their `*_up` thresholds;
/// reverting to CHOP requires both at/below their `*_down` thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeBands {
    /// Trend-strength upgrade threshold (default 26.0)
    pub trend_up: Decimal,
    /// Trend-strength downgrade threshold (default 23.0)
    pub trend_down: Decimal,
    /// Volatility% upgrade threshold as fraction of price (default 0.0040)
    pub vol_pct_up: Decimal,
    /// Volatility% downgrade threshold as fraction of price (default 0.0035)
    pub vol_pct_down: Decimal,
}

impl Default for RegimeBands {
    fn default() -> Self {
        Self {
            trend_up: dec!(26.0),
            trend_down: dec!(23.0),
            vol_pct_up: dec!(0.0040),
            vol_pct_down: dec!(0.0035),
        }
    }
}

// =============================================================================
// Guard config
// =============================================================================

/// Post-entry validity guard thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Hard invalidation: trend-strength below (trend_down - this delta)
    /// (default 1.0)
    pub hard_trend_delta: Decimal,
    /// Hard invalidation: volatility% below (vol_pct_down * this ratio)
    /// (default 0.90)
    pub hard_vol_ratio: Decimal,
    /// Wrong-side closes on the confirm timeframe required to confirm a
    /// hard invalidation (default 3)
    pub confirm_closes: u32,
    /// Grace window in primary-timeframe bars (default 2)
    pub grace_bars: u32,
    /// Grace window floor in seconds (default 300)
    pub grace_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            hard_trend_delta: dec!(1.0),
            hard_vol_ratio: dec!(0.90),
            confirm_closes: 3,
            grace_bars: 2,
            grace_secs: 300,
        }
    }
}

// =============================================================================
// Ratchet config
// =============================================================================

/// Stop-loss ratchet thresholds and guardrails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatchetConfig {
    /// Fee pad for breakeven-plus-fees, fraction of entry (default 0.0010)
    pub fee_pad_pct: Decimal,
    /// Pre-first-target absolute profit lock in quote units; 0 disables
    /// (default 0)
    pub abs_lock: Decimal,
    /// Milestone step in R beyond the first target (default 0.5)
    pub milestone_step_r: Decimal,
    /// Stop advance per milestone in R from entry (default 0.25)
    pub milestone_lock_delta_r: Decimal,
    /// Bars to wait after the breakeven commit before milestone trailing
    /// (default 3)
    pub post_tp1_delay_bars: u32,
    /// Fraction of entry-to-TP2 distance locked after the second target
    /// (default 0.75)
    pub tp2_lock_frac: Decimal,
    /// Post-TP2 trail distance as a multiple of volatility (default 0.8)
    pub trail_vol_mult: Decimal,
    /// Minimum stop step as a multiple of volatility (default 0.20)
    pub min_step_vol_mult: Decimal,
    /// Minimum stop step as a fraction of price (default 0.0004)
    pub min_step_pct: Decimal,
    /// Minimum buffer from price as a multiple of volatility (default 0.35)
    pub min_gap_vol_mult: Decimal,
    /// Minimum buffer from price as a fraction of price (default 0.0012)
    pub min_gap_pct: Decimal,
    /// Cooldown between committed stop changes, seconds (default 55)
    pub stop_cooldown_secs: u64,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self {
            fee_pad_pct: dec!(0.0010),
            abs_lock: Decimal::ZERO,
            milestone_step_r: dec!(0.5),
            milestone_lock_delta_r: dec!(0.25),
            post_tp1_delay_bars: 3,
            tp2_lock_frac: dec!(0.75),
            trail_vol_mult: dec!(0.8),
            min_step_vol_mult: dec!(0.20),
            min_step_pct: dec!(0.0004),
            min_gap_vol_mult: dec!(0.35),
            min_gap_pct: dec!(0.0012),
            stop_cooldown_secs: 55,
        }
    }
}

// =============================================================================
// Ladder config
// =============================================================================

/// Take-profit ladder mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LadderMode {
    /// Targets at fixed R-multiples from entry
    RiskMultiples {
        /// Strictly increasing R-multiples (default [1.0, 2.0, 3.0])
        mults: Vec<Decimal>,
    },
    /// Targets at volatility multiples, widened in RUNNER regime
    Volatility {
        /// Multiples used while CHOP (default [0.60, 1.00, 1.50])
        chop_mults: Vec<Decimal>,
        /// Multiples used while RUNNER (default [0.90, 1.60, 2.60])
        runner_mults: Vec<Decimal>,
    },
}

/// Take-profit ladder thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderConfig {
    /// Target computation mode
    pub mode: LadderMode,
    /// Amendment dedupe epsilon as a fraction of price (default 0.0002)
    pub epsilon_pct: Decimal,
    /// Minimum interval between ladder amendments, seconds (default 55)
    pub cooldown_secs: u64,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            mode: LadderMode::Volatility {
                chop_mults: vec![dec!(0.60), dec!(1.00), dec!(1.50)],
                runner_mults: vec![dec!(0.90), dec!(1.60), dec!(2.60)],
            },
            epsilon_pct: dec!(0.0002),
            cooldown_secs: 55,
        }
    }
}

// =============================================================================
// Re-entry config
// =============================================================================

/// Re-entry gate thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReentryConfig {
    /// Cooldown after a close, seconds (default 90)
    pub cooldown_secs: u64,
    /// Minimum distance from the last exit price, fraction of exit price
    /// (default 0.004)
    pub min_distance_pct: Decimal,
    /// Distance floor as a multiple of volatility; 0 disables (default 0.5)
    pub distance_vol_mult: Decimal,
    /// Fresh-trigger extension threshold, fraction of exit price
    /// (default 0.006)
    pub extension_pct: Decimal,
    /// Fresh-trigger momentum floor (default 0.6)
    pub momentum_floor: Decimal,
}

impl Default for ReentryConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 90,
            min_distance_pct: dec!(0.004),
            distance_vol_mult: dec!(0.5),
            extension_pct: dec!(0.006),
            momentum_floor: dec!(0.6),
        }
    }
}

// =============================================================================
// Engine config
// =============================================================================

/// Complete engine configuration, injected once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Regime classifier bands
    pub regime: RegimeBands,
    /// Post-entry validity guard
    pub guard: GuardConfig,
    /// Stop-loss ratchet
    pub ratchet: RatchetConfig,
    /// Take-profit ladder
    pub ladder: LadderConfig,
    /// Re-entry gate
    pub reentry: ReentryConfig,
    /// Stall exit after this many bars without a new favorable extreme;
    /// 0 disables the policy (default 0)
    pub stall_bars: u32,
    /// Primary timeframe bar duration, seconds (default 300)
    pub bar_secs: u64,
    /// Bounded retries for rejected amendments (default 3)
    pub amend_retries: u32,
    /// Base backoff between amendment retries, milliseconds (default 250)
    pub amend_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            regime: RegimeBands::default(),
            guard: GuardConfig::default(),
            ratchet: RatchetConfig::default(),
            ladder: LadderConfig::default(),
            reentry: ReentryConfig::default(),
            stall_bars: 0,
            bar_secs: 300,
            amend_retries: 3,
            amend_backoff_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Validate cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` naming the first violated
    /// invariant.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.regime.trend_down >= self.regime.trend_up {
            return Err(DomainError::InvalidConfig(
                "regime trend_down must be below trend_up".to_string(),
            ));
        }
        if self.regime.vol_pct_down >= self.regime.vol_pct_up {
            return Err(DomainError::InvalidConfig(
                "regime vol_pct_down must be below vol_pct_up".to_string(),
            ));
        }
        if self.guard.hard_trend_delta < Decimal::ZERO {
            return Err(DomainError::InvalidConfig(
                "guard hard_trend_delta must be non-negative".to_string(),
            ));
        }
        if self.guard.hard_vol_ratio <= Decimal::ZERO || self.guard.hard_vol_ratio > Decimal::ONE {
            return Err(DomainError::InvalidConfig(
                "guard hard_vol_ratio must be in (0, 1]".to_string(),
            ));
        }
        if self.guard.confirm_closes == 0 {
            return Err(DomainError::InvalidConfig(
                "guard confirm_closes must be at least 1".to_string(),
            ));
        }
        if self.ratchet.milestone_step_r <= Decimal::ZERO
            || self.ratchet.milestone_lock_delta_r <= Decimal::ZERO
        {
            return Err(DomainError::InvalidConfig(
                "milestone step and lock delta must be positive".to_string(),
            ));
        }
        if self.ratchet.tp2_lock_frac <= Decimal::ZERO || self.ratchet.tp2_lock_frac >= Decimal::ONE
        {
            return Err(DomainError::InvalidConfig(
                "tp2_lock_frac must be in (0, 1)".to_string(),
            ));
        }
        if self.ratchet.fee_pad_pct < Decimal::ZERO {
            return Err(DomainError::InvalidConfig(
                "fee_pad_pct must be non-negative".to_string(),
            ));
        }
        let mults = match &self.ladder.mode {
            LadderMode::RiskMultiples { mults } => vec![mults.clone()],
            LadderMode::Volatility { chop_mults, runner_mults } => {
                if chop_mults.len() != runner_mults.len() {
                    return Err(DomainError::InvalidConfig(
                        "chop and runner ladder multiples must have the same length".to_string(),
                    ));
                }
                for (c, r) in chop_mults.iter().zip(runner_mults.iter()) {
                    if r < c {
                        return Err(DomainError::InvalidConfig(
                            "runner ladder multiples must be at least the chop multiples"
                                .to_string(),
                        ));
                    }
                }
                vec![chop_mults.clone(), runner_mults.clone()]
            }
        };
        for set in mults {
            if set.is_empty() {
                return Err(DomainError::InvalidConfig(
                    "ladder multiples must not be empty".to_string(),
                ));
            }
            let mut last = Decimal::ZERO;
            for m in set {
                if m <= last {
                    return Err(DomainError::InvalidConfig(
                        "ladder multiples must be strictly increasing and positive".to_string(),
                    ));
                }
                last = m;
            }
        }
        if self.ladder.epsilon_pct < Decimal::ZERO {
            return Err(DomainError::InvalidConfig(
                "ladder epsilon_pct must be non-negative".to_string(),
            ));
        }
        if self.reentry.min_distance_pct < Decimal::ZERO {
            return Err(DomainError::InvalidConfig(
                "reentry min_distance_pct must be non-negative".to_string(),
            ));
        }
        if self.bar_secs == 0 {
            return Err(DomainError::InvalidConfig("bar_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Grace window for a guard warning, in seconds: the larger of the
    /// seconds floor and the bar allowance.
    pub fn guard_grace_secs(&self) -> u64 {
        self.guard.grace_secs.max(self.guard.grace_bars as u64 * self.bar_secs)
    }

    /// Rung count of the configured ladder.
    pub fn ladder_len(&self) -> usize {
        match &self.ladder.mode {
            LadderMode::RiskMultiples { mults } => mults.len(),
            LadderMode::Volatility { chop_mults, .. } => chop_mults.len(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
