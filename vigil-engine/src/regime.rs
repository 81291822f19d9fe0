//! Regime Classifier
//!
//! Maps a snapshot to CHOP or RUNNER using two independent hysteresis
//! bands (trend-strength and volatility%). Upgrading to RUNNER requires
//! both metrics at/above their up thresholds; reverting to CHOP requires
//! both at/below their down thresholds. Unready inputs hold the previous
//! regime: no action on missing data.

use vigil_domain::{MarketSnapshot, Regime, RegimeBands};

/// Classify the market regime for one snapshot.
///
/// Hysteresis: the band that must be crossed depends on the previous
/// regime, which prevents oscillation when the metrics sit between the
/// down and up thresholds.
pub fn classify(snapshot: &MarketSnapshot, prev: Regime, bands: &RegimeBands) -> Regime {
    let trend = snapshot.primary.trend_strength.value();
    let vol_pct = snapshot.primary.volatility_pct(snapshot.price);

    let (trend, vol_pct) = match (trend, vol_pct) {
        (Some(t), Some(v)) => (t, v),
        // Warm-up: hold the previous classification
        _ => return prev,
    };

    let want_runner = trend >= bands.trend_up && vol_pct >= bands.vol_pct_up;
    let want_chop = trend <= bands.trend_down && vol_pct <= bands.vol_pct_down;

    match prev {
        Regime::Runner => {
            if want_chop {
                Regime::Chop
            } else {
                Regime::Runner
            }
        }
        Regime::Chop => {
            if want_runner {
                Regime::Runner
            } else {
                Regime::Chop
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
