//! Domain Events for Vigil
//!
//! Events are immutable records of state changes in a position's life.
//! They feed telemetry, the notification port, and the audit trail.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{ExitReason, GuardState, PositionId, Regime};
use crate::value_objects::{Price, Side, Symbol};

/// Telemetry events emitted over a position's life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Regime classification changed
    RegimeChanged {
        /// Position identifier
        position_id: PositionId,
        /// Previous regime
        previous: Regime,
        /// New regime
        current: Regime,
        /// When the change was observed
        timestamp: DateTime<Utc>,
    },

    /// Post-entry validity guard transitioned
    GuardChanged {
        /// Position identifier
        position_id: PositionId,
        /// Previous guard state
        previous: GuardState,
        /// New guard state
        current: GuardState,
        /// When the transition was observed
        timestamp: DateTime<Utc>,
    },

    /// A ladder target was hit
    TargetHit {
        /// Position identifier
        position_id: PositionId,
        /// 1-based index of the target in the ladder
        index: usize,
        /// Target price
        price: Price,
        /// When the target was hit
        timestamp: DateTime<Utc>,
    },

    /// Protective stop committed at a new level
    StopCommitted {
        /// Position identifier
        position_id: PositionId,
        /// Previous stop price
        previous: Price,
        /// New stop price
        current: Price,
        /// Price that triggered the advance
        trigger_price: Price,
        /// When the commit happened
        timestamp: DateTime<Utc>,
    },

    /// A profit milestone advanced the stop
    MilestoneAdvanced {
        /// Position identifier
        position_id: PositionId,
        /// New milestone counter value
        milestone: u32,
        /// MFE in R-multiples at the advance
        mfe_r: Decimal,
        /// Stop level locked by this milestone
        stop: Price,
        /// When the advance happened
        timestamp: DateTime<Utc>,
    },

    /// The committed target ladder changed
    LadderCommitted {
        /// Position identifier
        position_id: PositionId,
        /// Previous ladder
        previous: Vec<Price>,
        /// New ladder
        current: Vec<Price>,
        /// When the commit happened
        timestamp: DateTime<Utc>,
    },

    /// An amendment exhausted its retries
    AmendmentFailed {
        /// Position identifier
        position_id: PositionId,
        /// Command sequence number
        sequence: u64,
        /// Attempts made
        attempts: u32,
        /// Gateway error description
        error: String,
        /// When the failure was recorded
        timestamp: DateTime<Utc>,
    },

    /// Gateway size disagreed with internal state
    Desynced {
        /// Position identifier
        position_id: PositionId,
        /// Internally tracked size
        expected: Decimal,
        /// Gateway-reported size
        reported: Decimal,
        /// When the desync was detected
        timestamp: DateTime<Utc>,
    },

    /// Position closed, full audit
    Closed {
        /// Position identifier
        position_id: PositionId,
        /// Exit reason
        reason: ExitReason,
        /// Entry fill price
        entry_price: Price,
        /// Exit fill price
        exit_price: Price,
        /// Maximum favorable excursion, quote units
        max_favorable: Decimal,
        /// Maximum adverse excursion, quote units
        max_adverse: Decimal,
        /// When the position closed
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Get the position ID from any event
    pub fn position_id(&self) -> PositionId {
        match self {
            Event::RegimeChanged { position_id, .. }
            | Event::GuardChanged { position_id, .. }
            | Event::TargetHit { position_id, .. }
            | Event::StopCommitted { position_id, .. }
            | Event::MilestoneAdvanced { position_id, .. }
            | Event::LadderCommitted { position_id, .. }
            | Event::AmendmentFailed { position_id, .. }
            | Event::Desynced { position_id, .. }
            | Event::Closed { position_id, .. } => *position_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::RegimeChanged { timestamp, .. }
            | Event::GuardChanged { timestamp, .. }
            | Event::TargetHit { timestamp, .. }
            | Event::StopCommitted { timestamp, .. }
            | Event::MilestoneAdvanced { timestamp, .. }
            | Event::LadderCommitted { timestamp, .. }
            | Event::AmendmentFailed { timestamp, .. }
            | Event::Desynced { timestamp, .. }
            | Event::Closed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::RegimeChanged { .. } => "regime_changed",
            Event::GuardChanged { .. } => "guard_changed",
            Event::TargetHit { .. } => "target_hit",
            Event::StopCommitted { .. } => "stop_committed",
            Event::MilestoneAdvanced { .. } => "milestone_advanced",
            Event::LadderCommitted { .. } => "ladder_committed",
            Event::AmendmentFailed { .. } => "amendment_failed",
            Event::Desynced { .. } => "desynced",
            Event::Closed { .. } => "closed",
        }
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Structured notification payloads for the external messaging
/// collaborator. Formatting is entirely that collaborator's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationMessage {
    /// Regime label changed
    RegimeLabel {
        /// Contract pair
        symbol: Symbol,
        /// Direction
        side: Side,
        /// New regime
        regime: Regime,
    },
    /// Guard raised or cleared a warning
    GuardWarning {
        /// Contract pair
        symbol: Symbol,
        /// Direction
        side: Side,
        /// Guard state label ("ok" | "warn" | "exit")
        state: String,
        /// Human-free reason token
        reason: Option<String>,
    },
    /// Position closed
    ExitSummary {
        /// Contract pair
        symbol: Symbol,
        /// Direction
        side: Side,
        /// Exit reason token
        reason: String,
        /// Entry fill price
        entry_price: Price,
        /// Exit fill price
        exit_price: Price,
        /// Realized result in R-multiples
        realized_r: Decimal,
    },
}

// =============================================================================
// Tests
// =============================================================================
