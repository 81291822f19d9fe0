//! Execution layer port definitions.
//!
//! Ports define the interfaces to the external collaborators the engine
//! commands or queries. Adapters implement them for specific venues; the
//! stub adapter backs tests and development.

use async_trait::async_trait;

use vigil_domain::{PositionId, Quantity, Side, Symbol};

use crate::command::{AmendAck, OrderAmendment};
use crate::error::ExecError;

/// Port for the order gateway.
///
/// The gateway owns order-protocol details; the engine only speaks the
/// sequenced amendment contract. Gateways MUST discard duplicate and
/// out-of-order sequence numbers per position.
#[async_trait]
pub trait OrderGatewayPort: Send + Sync {
    /// Apply one sequenced amendment.
    ///
    /// Never errors on duplicates: a replayed sequence returns
    /// [`AmendAck::Duplicate`] so the caller can suppress it quietly.
    async fn amend(&self, amendment: &OrderAmendment) -> Result<AmendAck, ExecError>;

    /// The venue-reported position size, if the venue reports one.
    ///
    /// `Some(zero)` means the venue sees the position flat;
    /// `None` means no report is available this tick.
    async fn position_size(
        &self,
        symbol: &Symbol,
        side: Side,
    ) -> Result<Option<Quantity>, ExecError>;

    /// Best-effort cancellation of in-flight amendments for a position.
    async fn cancel_all(&self, position_id: PositionId) -> Result<(), ExecError>;

    /// Whether the gateway is healthy/connected.
    async fn health_check(&self) -> Result<(), ExecError>;
}
