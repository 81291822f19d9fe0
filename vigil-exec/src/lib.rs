//! Vigil Execution Layer
//!
//! The order-gateway port, the sequenced amendment contract, the command
//! journal that makes emission idempotent, and the retrying dispatcher
//! that bridges engine decisions to the gateway.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod dispatcher;
pub mod error;
pub mod ports;
pub mod stub;

pub use command::{
    AmendAck, AmendAction, CommandJournal, CommandRecord, CommandStatus, OrderAmendment,
};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{ExecError, ExecResult};
pub use ports::OrderGatewayPort;
pub use stub::StubGateway;
