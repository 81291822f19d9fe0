//! Value Objects for the Vigil Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object and entity validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Symbol must be valid trading pair
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Configuration validation error
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Initial stop placement violates side polarity
    #[error("Invalid initial stop: {0}")]
    InvalidInitialStop(String),

    /// Target ladder is not strictly increasing in distance from entry
    #[error("Invalid target ladder: {0}")]
    InvalidLadder(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice("Price must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

// Internal constructor for derived prices (ratchet/ladder arithmetic).
impl From<Decimal> for Price {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Quantity represents a positive decimal quantity
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new Quantity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity("Quantity must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Create a zero quantity (flat-size comparisons only)
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Whether this quantity is zero (gateway reports flat)
    pub fn is_zero(&self) -> bool {
        self.0 == Decimal::ZERO
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// Symbol represents a perpetual contract pair (e.g., BTCUSDT)
///
/// # Invariants
/// - Must be valid format (base + quote)
/// - Base and quote must be non-empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Create a Symbol from a trading pair string
    ///
    /// # Examples
    /// ```
    /// # use vigil_domain::value_objects::Symbol;
    /// let symbol = Symbol::from_pair("BTCUSDT").unwrap();
    /// assert_eq!(symbol.base(), "BTC");
    /// assert_eq!(symbol.quote(), "USDT");
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` if format is invalid
    pub fn from_pair(pair: &str) -> Result<Self, DomainError> {
        // Common quote currencies (extend as needed)
        const QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "USD", "BTC", "ETH"];

        for quote in QUOTE_CURRENCIES {
            if let Some(base) = pair.strip_suffix(quote) {
                if !base.is_empty() {
                    return Ok(Self {
                        base: base.to_string(),
                        quote: quote.to_string(),
                    });
                }
            }
        }

        Err(DomainError::InvalidSymbol(format!("Cannot parse contract pair: {}", pair)))
    }

    /// Create a Symbol from explicit base and quote
    pub fn new(base: String, quote: String) -> Result<Self, DomainError> {
        if base.is_empty() || quote.is_empty() {
            return Err(DomainError::InvalidSymbol("Base and quote must be non-empty".to_string()));
        }
        Ok(Self { base, quote })
    }

    /// Get the base currency
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Get the quote currency
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Get the contract pair as string (e.g., "BTCUSDT")
    pub fn as_pair(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_pair())
    }
}

// =============================================================================
// Side
// =============================================================================

/// Side represents the position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Long position (profits when price rises)
    Long,
    /// Short position (profits when price falls)
    Short,
}

impl Side {
    /// Signed direction multiplier: +1 for Long, -1 for Short
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => -Decimal::ONE,
        }
    }

    /// Favorable distance from `from` to `to` in quote units.
    ///
    /// Positive when `to` is in the profitable direction for this side.
    pub fn favorable_distance(&self, from: Decimal, to: Decimal) -> Decimal {
        match self {
            Side::Long => to - from,
            Side::Short => from - to,
        }
    }

    /// Whether `candidate` is a tighter (more favorable) stop than `current`.
    pub fn tightens_stop(&self, candidate: Decimal, current: Decimal) -> bool {
        match self {
            Side::Long => candidate > current,
            Side::Short => candidate < current,
        }
    }

    /// Whether `price` has crossed `level` in the adverse direction
    /// (stop semantics: at-or-through triggers).
    pub fn crossed_adverse(&self, price: Decimal, level: Decimal) -> bool {
        match self {
            Side::Long => price <= level,
            Side::Short => price >= level,
        }
    }

    /// Whether `price` has crossed `level` in the favorable direction
    /// (target semantics: at-or-through triggers).
    pub fn crossed_favorable(&self, price: Decimal, level: Decimal) -> bool {
        match self {
            Side::Long => price >= level,
            Side::Short => price <= level,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // Price tests
    #[test]
    fn test_price_validation() {
        assert!(Price::new(dec!(100.0)).is_ok());
        assert!(Price::new(dec!(0.01)).is_ok());
        assert!(Price::new(dec!(-1.0)).is_err());
        assert!(Price::new(dec!(0.0)).is_err());
    }

    #[test]
    fn test_price_as_decimal() {
        let price = Price::new(dec!(12345.67)).unwrap();
        assert_eq!(price.as_decimal(), dec!(12345.67));
    }

    // Quantity tests
    #[test]
    fn test_quantity_validation() {
        assert!(Quantity::new(dec!(0.001)).is_ok());
        assert!(Quantity::new(dec!(100.0)).is_ok());
        assert!(Quantity::new(dec!(-0.1)).is_err());
        assert!(Quantity::new(dec!(0.0)).is_err());
    }

    #[test]
    fn test_quantity_zero_flag() {
        assert!(Quantity::zero().is_zero());
        assert!(!Quantity::new(dec!(0.5)).unwrap().is_zero());
    }

    // Symbol tests
    #[test]
    fn test_symbol_from_pair() {
        let symbol = Symbol::from_pair("BTCUSDT").unwrap();
        assert_eq!(symbol.base(), "BTC");
        assert_eq!(symbol.quote(), "USDT");
        assert_eq!(symbol.as_pair(), "BTCUSDT");
    }

    #[test]
    fn test_symbol_from_pair_usdc() {
        let symbol = Symbol::from_pair("SOLUSDC").unwrap();
        assert_eq!(symbol.base(), "SOL");
        assert_eq!(symbol.quote(), "USDC");
    }

    #[test]
    fn test_symbol_invalid() {
        assert!(Symbol::from_pair("INVALID").is_err());
        assert!(Symbol::from_pair("").is_err());
    }

    // Side tests
    #[test]
    fn test_side_favorable_distance() {
        assert_eq!(Side::Long.favorable_distance(dec!(100), dec!(105)), dec!(5));
        assert_eq!(Side::Long.favorable_distance(dec!(100), dec!(95)), dec!(-5));
        assert_eq!(Side::Short.favorable_distance(dec!(100), dec!(95)), dec!(5));
        assert_eq!(Side::Short.favorable_distance(dec!(100), dec!(105)), dec!(-5));
    }

    #[test]
    fn test_side_tightens_stop() {
        // Long: stop only moves up
        assert!(Side::Long.tightens_stop(dec!(101), dec!(100)));
        assert!(!Side::Long.tightens_stop(dec!(99), dec!(100)));
        assert!(!Side::Long.tightens_stop(dec!(100), dec!(100)));

        // Short: stop only moves down
        assert!(Side::Short.tightens_stop(dec!(99), dec!(100)));
        assert!(!Side::Short.tightens_stop(dec!(101), dec!(100)));
    }

    #[test]
    fn test_side_crossed_adverse() {
        // Long stop: price at or below level
        assert!(Side::Long.crossed_adverse(dec!(100), dec!(100)));
        assert!(Side::Long.crossed_adverse(dec!(99), dec!(100)));
        assert!(!Side::Long.crossed_adverse(dec!(101), dec!(100)));

        // Short stop: price at or above level
        assert!(Side::Short.crossed_adverse(dec!(100), dec!(100)));
        assert!(Side::Short.crossed_adverse(dec!(101), dec!(100)));
        assert!(!Side::Short.crossed_adverse(dec!(99), dec!(100)));
    }

    #[test]
    fn test_side_crossed_favorable() {
        assert!(Side::Long.crossed_favorable(dec!(105), dec!(105)));
        assert!(!Side::Long.crossed_favorable(dec!(104), dec!(105)));
        assert!(Side::Short.crossed_favorable(dec!(95), dec!(95)));
        assert!(!Side::Short.crossed_favorable(dec!(96), dec!(95)));
    }
}
