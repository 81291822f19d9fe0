//! Test fixtures shared across crates.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use vigil_domain::{
    EngineConfig, EntrySnapshot, Flag, MarketSnapshot, Position, Price, Quantity, Reading, Side,
    Symbol, TimeframeReadings,
};

/// Deterministic base timestamp for scenario tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Engine configuration with the documented defaults.
pub fn test_config() -> EngineConfig {
    EngineConfig::default()
}

/// Builder for market snapshots with healthy trending defaults.
///
/// Every reading starts ready; individual readings can be degraded or
/// flagged not-ready per test.
pub struct SnapshotBuilder {
    symbol: Symbol,
    timestamp: DateTime<Utc>,
    price: Decimal,
    trend_strength: Option<Decimal>,
    volatility: Option<Decimal>,
    momentum: Decimal,
    trend_ref: Option<Decimal>,
    structure_long: Option<bool>,
    structure_short: Option<bool>,
    closes_below: u32,
    closes_above: u32,
}

impl SnapshotBuilder {
    /// Start from a pair and a price, all readings ready and healthy.
    pub fn new(pair: &str, price: Decimal) -> Self {
        Self {
            symbol: Symbol::from_pair(pair).expect("valid test pair"),
            timestamp: t0(),
            price,
            trend_strength: Some(dec!(27.0)),
            // 0.45% of price: above the default up band
            volatility: Some(price * dec!(0.0045)),
            momentum: dec!(0.7),
            trend_ref: Some(price * dec!(0.99)),
            structure_long: Some(true),
            structure_short: Some(true),
            closes_below: 0,
            closes_above: 0,
        }
    }

    /// Set the snapshot timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the last trade price.
    pub fn price(mut self, price: Decimal) -> Self {
        self.price = price;
        self
    }

    /// Set trend-strength.
    pub fn trend_strength(mut self, value: Decimal) -> Self {
        self.trend_strength = Some(value);
        self
    }

    /// Flag trend-strength as warming up.
    pub fn trend_not_ready(mut self) -> Self {
        self.trend_strength = None;
        self
    }

    /// Set volatility as a fraction of price.
    pub fn volatility_pct(mut self, pct: Decimal) -> Self {
        self.volatility = Some(self.price * pct);
        self
    }

    /// Set volatility in absolute price units.
    pub fn volatility_abs(mut self, value: Decimal) -> Self {
        self.volatility = Some(value);
        self
    }

    /// Flag volatility as warming up.
    pub fn volatility_not_ready(mut self) -> Self {
        self.volatility = None;
        self
    }

    /// Set momentum.
    pub fn momentum(mut self, value: Decimal) -> Self {
        self.momentum = value;
        self
    }

    /// Place the medium-term trend reference at an absolute price.
    pub fn trend_ref(mut self, value: Decimal) -> Self {
        self.trend_ref = Some(value);
        self
    }

    /// Break recent structure for the given side.
    pub fn structure_broken(mut self, side: Side) -> Self {
        match side {
            Side::Long => self.structure_long = Some(false),
            Side::Short => self.structure_short = Some(false),
        }
        self
    }

    /// Flag structure as warming up for both sides.
    pub fn structure_not_ready(mut self) -> Self {
        self.structure_long = None;
        self.structure_short = None;
        self
    }

    /// Set consecutive adverse closes on the confirm timeframe.
    pub fn adverse_closes(mut self, side: Side, count: u32) -> Self {
        match side {
            Side::Long => self.closes_below = count,
            Side::Short => self.closes_above = count,
        }
        self
    }

    fn readings(&self) -> TimeframeReadings {
        let opt_reading = |v: Option<Decimal>| v.map(Reading::ready).unwrap_or_else(Reading::not_ready);
        let opt_flag = |v: Option<bool>| v.map(Flag::ready).unwrap_or_else(Flag::not_ready);
        TimeframeReadings {
            trend_strength: opt_reading(self.trend_strength),
            volatility: opt_reading(self.volatility),
            momentum: Reading::ready(self.momentum),
            ma_aligned_long: Flag::ready(true),
            ma_aligned_short: Flag::ready(true),
            channel_width: opt_reading(self.volatility.map(|v| v * dec!(3))),
            trend_ref: opt_reading(self.trend_ref),
            structure_intact_long: opt_flag(self.structure_long),
            structure_intact_short: opt_flag(self.structure_short),
            closes_below_trend_ref: self.closes_below,
            closes_above_trend_ref: self.closes_above,
        }
    }

    /// Build the snapshot (primary and confirm share the readings).
    pub fn build(self) -> MarketSnapshot {
        MarketSnapshot {
            symbol: self.symbol.clone(),
            timestamp: self.timestamp,
            price: Price::new(self.price).expect("positive test price"),
            primary: self.readings(),
            confirm: self.readings(),
        }
    }
}

/// An open position with entry/initial-stop at the given prices.
pub fn test_position(pair: &str, side: Side, entry: Decimal, initial_stop: Decimal) -> Position {
    let entry_snapshot = EntrySnapshot {
        side,
        trend_strength: dec!(27.0),
        volatility_pct: dec!(0.0045),
        on_trend_side: true,
        structure_formed: true,
        entered_at: t0(),
    };
    Position::open(
        Symbol::from_pair(pair).expect("valid test pair"),
        side,
        Price::new(entry).expect("positive entry"),
        Quantity::new(dec!(10)).expect("positive quantity"),
        Price::new(initial_stop).expect("positive stop"),
        entry_snapshot,
        t0(),
    )
    .expect("valid test position")
}
