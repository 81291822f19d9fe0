//! Domain Entities for Vigil
//!
//! The Position entity and its lifecycle state, plus the records produced
//! at close (re-entry lock, exit record) and the fill-time entry draft.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snapshot::EntrySnapshot;
use crate::value_objects::{DomainError, Price, Quantity, Side, Symbol};

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a Position
pub type PositionId = Uuid;

/// Registry key: at most one open position exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    /// Contract pair
    pub symbol: Symbol,
    /// Position direction
    pub side: Side,
}

impl PositionKey {
    /// Create a new key.
    pub fn new(symbol: Symbol, side: Side) -> Self {
        Self { symbol, side }
    }
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match self.side {
            Side::Long => "long",
            Side::Short => "short",
        };
        write!(f, "{}:{}", self.symbol.as_pair(), side)
    }
}

// =============================================================================
// Regime
// =============================================================================

/// Market regime label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    /// Low-momentum ranging conditions
    Chop,
    /// Sustained trending conditions
    Runner,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Chop => write!(f, "CHOP"),
            Regime::Runner => write!(f, "RUNNER"),
        }
    }
}

// =============================================================================
// Guard state
// =============================================================================

/// Reason a guard warning was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnReason {
    /// Trend-strength at/below its down band
    TrendWeak,
    /// Volatility at/below its down band
    VolatilityFloor,
    /// Recent price structure broken
    StructureBroken,
}

impl WarnReason {
    /// Stable token form.
    pub fn as_str(&self) -> &'static str {
        match self {
            WarnReason::TrendWeak => "trend_weak",
            WarnReason::VolatilityFloor => "volatility_floor",
            WarnReason::StructureBroken => "structure_broken",
        }
    }
}

/// Reason a guard exit was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardExitReason {
    /// Hard invalidation of the entry thesis (no grace)
    HardInvalidation,
    /// Warning persisted beyond the grace window
    Timeout,
}

impl GuardExitReason {
    /// Stable token form.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardExitReason::HardInvalidation => "hard_invalidation",
            GuardExitReason::Timeout => "timeout",
        }
    }
}

/// Post-entry validity guard state.
///
/// Warn may revert to Ok (recovery/improvement) or advance to Exit;
/// Exit is terminal for the guard and forces a close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GuardState {
    /// Entry thesis still holds
    Ok,
    /// Entry thesis degraded; grace window running
    Warn {
        /// When the warning was first raised
        since: DateTime<Utc>,
        /// What raised it
        reason: WarnReason,
    },
    /// Entry thesis invalidated; terminal
    Exit {
        /// What invalidated it
        reason: GuardExitReason,
    },
}

impl GuardState {
    /// Short label for telemetry.
    pub fn label(&self) -> &'static str {
        match self {
            GuardState::Ok => "ok",
            GuardState::Warn { .. } => "warn",
            GuardState::Exit { .. } => "exit",
        }
    }

    /// Whether the guard demands an exit.
    pub fn is_exit(&self) -> bool {
        matches!(self, GuardState::Exit { .. })
    }
}

// =============================================================================
// Exit reasons
// =============================================================================

/// Exit reason taxonomy, mutually exclusive.
///
/// The exit resolver picks the first applicable reason in this priority
/// order (top wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Venue reports zero size; halts the lifecycle immediately
    ExternallyFlat,
    /// Post-entry validity guard demanded the exit
    GuardExit(GuardExitReason),
    /// Price crossed the committed protective stop
    Stop,
    /// RUNNER flipped to CHOP after the first target, before the second
    RegimeFlip,
    /// Every target in the ladder was hit
    TargetFinal,
    /// No new favorable extreme for the configured number of bars
    Stall,
}

impl ExitReason {
    /// Stable string form used in records and telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::ExternallyFlat => "externally_flat",
            ExitReason::GuardExit(_) => "guard_exit",
            ExitReason::Stop => "stop",
            ExitReason::RegimeFlip => "regime_flip",
            ExitReason::TargetFinal => "target_final",
            ExitReason::Stall => "stall",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Position status
// =============================================================================

/// Position lifecycle status. CLOSED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PositionStatus {
    /// Managed, amendments flowing
    Open,
    /// Close command issued, waiting for the fill
    Closing {
        /// Why the close was issued
        reason: ExitReason,
    },
    /// Closed; no transition leaves this state
    Closed {
        /// Why the position closed
        reason: ExitReason,
        /// Exit fill price
        exit_price: Price,
        /// When it closed
        closed_at: DateTime<Utc>,
    },
}

impl PositionStatus {
    /// Short label for telemetry.
    pub fn label(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Closing { .. } => "closing",
            PositionStatus::Closed { .. } => "closed",
        }
    }
}

// =============================================================================
// Position
// =============================================================================

/// A managed perpetual-futures position.
///
/// Key invariants, enforced by the mutators below:
/// - the committed stop never moves adversely once set
/// - committed target distances are strictly increasing and extend-only
/// - the milestone counter never decreases
/// - MFE/MAE extremes are monotonic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Identity (time-ordered)
    pub id: PositionId,
    /// Contract pair
    pub symbol: Symbol,
    /// Direction
    pub side: Side,
    /// Lifecycle status
    pub status: PositionStatus,

    /// Entry fill price
    pub entry_price: Price,
    /// Position size
    pub quantity: Quantity,
    /// Risk unit R: distance from entry to the initial stop
    pub risk_unit: Decimal,

    /// Committed protective stop
    pub stop: Price,
    /// Committed target ladder (strictly increasing distance from entry)
    pub targets: Vec<Price>,
    /// How many targets have been hit
    pub targets_hit: usize,
    /// When the first target was hit
    pub first_target_at: Option<DateTime<Utc>>,

    /// Milestone counter (monotonic)
    pub milestones: u32,
    /// Current regime classification
    pub regime: Regime,
    /// Post-entry validity guard state
    pub guard: GuardState,
    /// Whether the position has been in RUNNER at any point
    pub saw_runner: bool,

    /// Reasons-for-entry captured at fill
    pub entry: EntrySnapshot,

    /// Maximum favorable excursion since entry, quote units (>= 0)
    pub max_favorable: Decimal,
    /// Maximum adverse excursion since entry, quote units (>= 0)
    pub max_adverse: Decimal,
    /// When the favorable extreme was last extended
    pub extreme_at: DateTime<Utc>,

    /// Timestamp of the last snapshot processed (stale-tick ordering)
    pub last_tick_at: DateTime<Utc>,
    /// Audit timestamps
    pub opened_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Open a position from a fill.
    ///
    /// # Errors
    ///
    /// Rejects an initial stop on the wrong side of entry (the only
    /// permitted "re-basing" of the stop is this fill-time placement).
    pub fn open(
        symbol: Symbol,
        side: Side,
        entry_price: Price,
        quantity: Quantity,
        initial_stop: Price,
        entry: EntrySnapshot,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let risk_unit = side.favorable_distance(initial_stop.as_decimal(), entry_price.as_decimal());
        if risk_unit <= Decimal::ZERO {
            return Err(DomainError::InvalidInitialStop(format!(
                "{side} entry at {entry_price} requires a protective stop on the adverse side, got {initial_stop}"
            )));
        }

        Ok(Self {
            id: Uuid::now_v7(),
            symbol,
            side,
            status: PositionStatus::Open,
            entry_price,
            quantity,
            risk_unit,
            stop: initial_stop,
            targets: Vec::new(),
            targets_hit: 0,
            first_target_at: None,
            milestones: 0,
            regime: Regime::Chop,
            guard: GuardState::Ok,
            saw_runner: false,
            entry,
            max_favorable: Decimal::ZERO,
            max_adverse: Decimal::ZERO,
            extreme_at: opened_at,
            last_tick_at: opened_at,
            opened_at,
            updated_at: opened_at,
        })
    }

    /// Whether the position is still open (not closing, not closed).
    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open)
    }

    /// Whether the position reached its terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self.status, PositionStatus::Closed { .. })
    }

    /// Registry key for this position.
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.symbol.clone(), self.side)
    }

    /// Unrealized excursion at `price` in quote units (signed; positive
    /// is favorable).
    pub fn excursion(&self, price: Price) -> Decimal {
        self.side
            .favorable_distance(self.entry_price.as_decimal(), price.as_decimal())
    }

    /// Maximum favorable excursion expressed in R-multiples.
    pub fn mfe_r(&self) -> Decimal {
        self.max_favorable / self.risk_unit
    }

    /// Record price extremes. Returns true when a new favorable extreme
    /// was set (the stall detector keys off this).
    pub fn record_excursion(&mut self, price: Price, at: DateTime<Utc>) -> bool {
        let exc = self.excursion(price);
        let mut new_extreme = false;
        if exc > self.max_favorable {
            self.max_favorable = exc;
            self.extreme_at = at;
            new_extreme = true;
        }
        if -exc > self.max_adverse {
            self.max_adverse = -exc;
        }
        new_extreme
    }

    /// Commit a tighter stop. Rejects adverse movement.
    pub fn commit_stop(&mut self, stop: Price, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.side.tightens_stop(stop.as_decimal(), self.stop.as_decimal()) {
            return Err(DomainError::InvalidStateTransition(format!(
                "stop {} does not tighten current stop {} for {}",
                stop, self.stop, self.side
            )));
        }
        self.stop = stop;
        self.updated_at = at;
        Ok(())
    }

    /// Commit a target ladder. Enforces strictly-increasing distances and
    /// element-wise extend-only against the committed ladder.
    pub fn commit_targets(&mut self, targets: Vec<Price>, at: DateTime<Utc>) -> Result<(), DomainError> {
        if targets.len() < self.targets.len() {
            return Err(DomainError::InvalidLadder(format!(
                "ladder shrank from {} to {} rungs",
                self.targets.len(),
                targets.len()
            )));
        }
        let mut last = Decimal::ZERO;
        for t in &targets {
            let d = self.side.favorable_distance(self.entry_price.as_decimal(), t.as_decimal());
            if d <= last {
                return Err(DomainError::InvalidLadder(format!(
                    "target {} is not strictly beyond the previous rung", t
                )));
            }
            last = d;
        }
        for (new, old) in targets.iter().zip(self.targets.iter()) {
            let dn = self.side.favorable_distance(self.entry_price.as_decimal(), new.as_decimal());
            let dp = self.side.favorable_distance(self.entry_price.as_decimal(), old.as_decimal());
            if dn < dp {
                return Err(DomainError::InvalidLadder(format!(
                    "target {} retreats from committed {}", new, old
                )));
            }
        }
        self.targets = targets;
        self.updated_at = at;
        Ok(())
    }

    /// Advance the milestone counter. Monotonic.
    pub fn advance_milestone(&mut self, milestone: u32, at: DateTime<Utc>) -> Result<(), DomainError> {
        if milestone <= self.milestones {
            return Err(DomainError::InvalidStateTransition(format!(
                "milestone {} does not advance counter at {}", milestone, self.milestones
            )));
        }
        self.milestones = milestone;
        self.updated_at = at;
        Ok(())
    }

    /// Transition to Closing.
    pub fn begin_close(&mut self, reason: ExitReason, at: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            PositionStatus::Open => {
                self.status = PositionStatus::Closing { reason };
                self.updated_at = at;
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition(format!(
                "cannot begin close from {}", self.status.label()
            ))),
        }
    }

    /// Transition to Closed (terminal).
    pub fn finish_close(
        &mut self,
        exit_price: Price,
        at: DateTime<Utc>,
    ) -> Result<ExitReason, DomainError> {
        match self.status {
            PositionStatus::Closing { reason } => {
                self.status = PositionStatus::Closed { reason, exit_price, closed_at: at };
                self.updated_at = at;
                Ok(reason)
            }
            _ => Err(DomainError::InvalidStateTransition(format!(
                "cannot finish close from {}", self.status.label()
            ))),
        }
    }
}

// =============================================================================
// Entry draft (fill-time interface)
// =============================================================================

/// Pushed by the external execution layer when an entry order fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    /// Contract pair
    pub symbol: Symbol,
    /// Direction
    pub side: Side,
    /// Fill price
    pub price: Price,
    /// Filled size
    pub quantity: Quantity,
    /// Initial protective stop from the signal engine
    pub initial_stop: Price,
    /// Reasons-for-entry snapshot
    pub entry: EntrySnapshot,
}

// =============================================================================
// Close records
// =============================================================================

/// Written exactly once per close; gates re-entry on the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReentryLock {
    /// Contract pair
    pub symbol: Symbol,
    /// Closed direction
    pub side: Side,
    /// Exit fill price
    pub exit_price: Price,
    /// When the position closed
    pub exited_at: DateTime<Utc>,
    /// Why it closed
    pub exit_reason: ExitReason,
}

/// Immutable audit record appended to the external ledger at close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRecord {
    /// Position identity
    pub position_id: PositionId,
    /// Contract pair
    pub symbol: Symbol,
    /// Direction
    pub side: Side,
    /// Entry fill price
    pub entry_price: Price,
    /// Exit fill price
    pub exit_price: Price,
    /// Exit reason
    pub reason: ExitReason,
    /// Maximum favorable excursion, quote units
    pub max_favorable: Decimal,
    /// Maximum adverse excursion, quote units
    pub max_adverse: Decimal,
    /// Realized result in R-multiples
    pub realized_r: Decimal,
    /// Close time
    pub closed_at: DateTime<Utc>,
}

impl ExitRecord {
    /// Build the record from a closed position.
    pub fn from_closed(position: &Position) -> Option<Self> {
        match position.status {
            PositionStatus::Closed { reason, exit_price, closed_at } => Some(Self {
                position_id: position.id,
                symbol: position.symbol.clone(),
                side: position.side,
                entry_price: position.entry_price,
                exit_price,
                reason,
                max_favorable: position.max_favorable,
                max_adverse: position.max_adverse,
                realized_r: position.excursion(exit_price) / position.risk_unit,
                closed_at,
            }),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
