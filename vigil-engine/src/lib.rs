//! Vigil Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes a position and a snapshot, returns the convergent decision for
//! the tick: observed-state updates, at most one stop proposal, at most
//! one ladder proposal, and an optional terminal exit resolution.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod guard;
pub mod ladder;
pub mod ratchet;
pub mod reentry;
pub mod regime;
pub mod resolver;
pub mod tick;

pub use error::{EngineError, EngineResult};
pub use ladder::LadderState;
pub use ratchet::{RatchetState, StopKind, StopProposal};
pub use reentry::ReentryBlock;
pub use resolver::ExitContext;
pub use tick::{ControllerState, Engine, TickDecision};
