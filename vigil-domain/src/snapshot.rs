//! Market and Entry Snapshot Types
//!
//! Canonical, feed-agnostic snapshot types consumed on every tick.
//! Every indicator carries an explicit readiness flag: consumers must
//! branch on readiness instead of doing arithmetic on an absent value.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::{Price, Side, Symbol};

// =============================================================================
// Readings
// =============================================================================

/// A single indicator reading with its readiness flag.
///
/// `value()` returns `None` until the indicator has enough history,
/// which forces callers to handle the warm-up window explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    value: Decimal,
    ready: bool,
}

impl Reading {
    /// A ready reading.
    pub fn ready(value: Decimal) -> Self {
        Self { value, ready: true }
    }

    /// A not-yet-ready reading (warm-up window).
    pub fn not_ready() -> Self {
        Self { value: Decimal::ZERO, ready: false }
    }

    /// The value, if ready.
    pub fn value(&self) -> Option<Decimal> {
        self.ready.then_some(self.value)
    }

    /// Whether the reading is ready.
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

/// A boolean indicator reading (alignment/structure flags) with readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    value: bool,
    ready: bool,
}

impl Flag {
    /// A ready flag.
    pub fn ready(value: bool) -> Self {
        Self { value, ready: true }
    }

    /// A not-yet-ready flag.
    pub fn not_ready() -> Self {
        Self { value: false, ready: false }
    }

    /// The flag value, if ready.
    pub fn value(&self) -> Option<bool> {
        self.ready.then_some(self.value)
    }
}

// =============================================================================
// Timeframe readings
// =============================================================================

/// Indicator readings for one timeframe.
///
/// `volatility` is in absolute price units; use
/// [`TimeframeReadings::volatility_pct`] for the price-relative form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeReadings {
    /// Trend-strength oscillator (ADX-family)
    pub trend_strength: Reading,
    /// Volatility in absolute price units (ATR-family)
    pub volatility: Reading,
    /// Momentum oscillator
    pub momentum: Reading,
    /// Moving-average alignment in the long direction
    pub ma_aligned_long: Flag,
    /// Moving-average alignment in the short direction
    pub ma_aligned_short: Flag,
    /// Trendline/channel width in absolute price units
    pub channel_width: Reading,
    /// Medium-term trend reference price (long-period MA)
    pub trend_ref: Reading,
    /// Recent price structure holds for longs (higher-lows intact)
    pub structure_intact_long: Flag,
    /// Recent price structure holds for shorts (lower-highs intact)
    pub structure_intact_short: Flag,
    /// Consecutive closes below `trend_ref` (adverse for longs)
    pub closes_below_trend_ref: u32,
    /// Consecutive closes above `trend_ref` (adverse for shorts)
    pub closes_above_trend_ref: u32,
}

impl TimeframeReadings {
    /// All readings flagged not-ready (warm-up).
    pub fn warming_up() -> Self {
        Self {
            trend_strength: Reading::not_ready(),
            volatility: Reading::not_ready(),
            momentum: Reading::not_ready(),
            ma_aligned_long: Flag::not_ready(),
            ma_aligned_short: Flag::not_ready(),
            channel_width: Reading::not_ready(),
            trend_ref: Reading::not_ready(),
            structure_intact_long: Flag::not_ready(),
            structure_intact_short: Flag::not_ready(),
            closes_below_trend_ref: 0,
            closes_above_trend_ref: 0,
        }
    }

    /// Volatility as a fraction of `price` (e.g. 0.004 == 0.40%), if ready.
    pub fn volatility_pct(&self, price: Price) -> Option<Decimal> {
        self.volatility.value().map(|v| v / price.as_decimal())
    }

    /// Side-aware structure flag.
    pub fn structure_intact(&self, side: Side) -> Option<bool> {
        match side {
            Side::Long => self.structure_intact_long.value(),
            Side::Short => self.structure_intact_short.value(),
        }
    }

    /// Side-aware MA alignment flag.
    pub fn ma_aligned(&self, side: Side) -> Option<bool> {
        match side {
            Side::Long => self.ma_aligned_long.value(),
            Side::Short => self.ma_aligned_short.value(),
        }
    }

    /// Consecutive closes on the wrong side of the trend reference for `side`.
    pub fn adverse_closes(&self, side: Side) -> u32 {
        match side {
            Side::Long => self.closes_below_trend_ref,
            Side::Short => self.closes_above_trend_ref,
        }
    }

    /// Whether `price` sits on the correct side of the trend reference.
    ///
    /// `None` while the trend reference is warming up.
    pub fn on_trend_side(&self, side: Side, price: Price) -> Option<bool> {
        self.trend_ref.value().map(|r| match side {
            Side::Long => price.as_decimal() >= r,
            Side::Short => price.as_decimal() <= r,
        })
    }
}

// =============================================================================
// Market snapshot
// =============================================================================

/// One time-stamped multi-timeframe view of the market.
///
/// Immutable once produced; a newer snapshot supersedes the prior one by
/// timestamp. Ticks carrying an older timestamp than the last processed
/// one are rejected as stale without any state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Contract this snapshot describes
    pub symbol: Symbol,
    /// Snapshot production time (feed clock)
    pub timestamp: DateTime<Utc>,
    /// Last trade price
    pub price: Price,
    /// Primary decision timeframe (5m)
    pub primary: TimeframeReadings,
    /// Confirmation timeframe (1m)
    pub confirm: TimeframeReadings,
}

// =============================================================================
// Entry snapshot
// =============================================================================

/// The reasons-for-entry, captured exactly once at fill.
///
/// The post-entry validity guard compares live conditions against this
/// record; it never changes for the life of the position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    /// Position direction at fill
    pub side: Side,
    /// Trend-strength at fill
    pub trend_strength: Decimal,
    /// Volatility as fraction of price at fill
    pub volatility_pct: Decimal,
    /// Price was on the correct side of the trend reference at fill
    pub on_trend_side: bool,
    /// A structural pattern justified the entry
    pub structure_formed: bool,
    /// Fill time
    pub entered_at: DateTime<Utc>,
}

// =============================================================================
// Candidate entry (re-entry gate input)
// =============================================================================

/// A proposed entry from the external signal engine, evaluated by the
/// re-entry gatekeeper against the last close on the same (symbol, side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry {
    /// Contract to enter
    pub symbol: Symbol,
    /// Proposed direction
    pub side: Side,
    /// Proposed entry price
    pub price: Price,
    /// The structural pattern has newly formed since the last exit
    pub fresh_structure: bool,
    /// Furthest favorable excursion away from the last exit since the
    /// close, as a fraction of the exit price (provider-maintained)
    pub extension_pct: Decimal,
    /// Momentum at proposal time
    pub momentum: Reading,
}

// =============================================================================
// Tests
// =============================================================================
