//! Vigil Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains entities, value objects, snapshots, events, and the engine
//! configuration object.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod entities;
pub mod events;
pub mod snapshot;
pub mod value_objects;

// Re-export commonly used types
pub use config::{
    EngineConfig, GuardConfig, LadderConfig, LadderMode, RatchetConfig, ReentryConfig, RegimeBands,
};
pub use entities::{
    EntryDraft, ExitReason, ExitRecord, GuardExitReason, GuardState, Position, PositionId,
    PositionKey, PositionStatus, ReentryLock, Regime, WarnReason,
};
pub use events::{Event, NotificationMessage};
pub use snapshot::{CandidateEntry, EntrySnapshot, Flag, MarketSnapshot, Reading, TimeframeReadings};
pub use value_objects::{DomainError, Price, Quantity, Side, Symbol};
