//! Amendment Dispatcher
//!
//! Bridges engine decisions to the order gateway with idempotency and
//! bounded retry. Flow per command:
//!
//! 1. The journal assigns the next sequence and records the command
//! 2. The gateway applies it; rejections retry with backoff up to the
//!    configured bound
//! 3. The outcome is journaled; duplicates are suppressed at debug level
//!
//! An exhausted retry budget surfaces as `AmendmentRejected`; the caller
//! leaves the committed stop/targets unchanged and emits telemetry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use vigil_domain::PositionId;

use crate::command::{AmendAck, AmendAction, CommandJournal, CommandStatus, OrderAmendment};
use crate::error::{ExecError, ExecResult};
use crate::ports::OrderGatewayPort;

/// What happened to a dispatched command.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Gateway applied the amendment
    Applied(OrderAmendment),
    /// Gateway had already seen the sequence; nothing changed
    DuplicateSuppressed(u64),
}

/// Dispatches sequenced amendments with retry and journaling.
pub struct Dispatcher<G: OrderGatewayPort> {
    gateway: Arc<G>,
    journal: Arc<CommandJournal>,
    max_retries: u32,
    backoff: Duration,
}

impl<G: OrderGatewayPort> Dispatcher<G> {
    /// Create a dispatcher.
    pub fn new(
        gateway: Arc<G>,
        journal: Arc<CommandJournal>,
        max_retries: u32,
        backoff_ms: u64,
    ) -> Self {
        Self {
            gateway,
            journal,
            max_retries,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Issue and send one amendment for a position.
    pub async fn dispatch(
        &self,
        position_id: PositionId,
        action: AmendAction,
    ) -> ExecResult<DispatchOutcome> {
        let amendment = self.journal.issue(position_id, action)?;
        let label = amendment.action.label();
        let sequence = amendment.sequence;

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.gateway.amend(&amendment).await {
                Ok(AmendAck::Applied) => {
                    self.journal.complete(position_id, sequence, CommandStatus::Acked)?;
                    info!(%position_id, sequence, action = label, "Amendment applied");
                    return Ok(DispatchOutcome::Applied(amendment));
                }
                Ok(AmendAck::Duplicate) => {
                    self.journal.complete(position_id, sequence, CommandStatus::Duplicate)?;
                    // Normal under retry; never worth more than debug
                    debug!(%position_id, sequence, action = label, "Duplicate amendment suppressed");
                    return Ok(DispatchOutcome::DuplicateSuppressed(sequence));
                }
                Ok(AmendAck::Rejected { reason }) => {
                    if attempts > self.max_retries {
                        self.journal.complete(position_id, sequence, CommandStatus::Rejected)?;
                        error!(
                            %position_id,
                            sequence,
                            action = label,
                            attempts,
                            %reason,
                            "Amendment rejected, retries exhausted"
                        );
                        return Err(ExecError::AmendmentRejected {
                            position_id,
                            sequence,
                            attempts,
                            reason,
                        });
                    }
                    warn!(
                        %position_id,
                        sequence,
                        action = label,
                        attempt = attempts,
                        %reason,
                        "Amendment rejected, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempts).await;
                }
                Err(e) => {
                    if attempts > self.max_retries {
                        self.journal.complete(position_id, sequence, CommandStatus::Rejected)?;
                        return Err(ExecError::AmendmentRejected {
                            position_id,
                            sequence,
                            attempts,
                            reason: e.to_string(),
                        });
                    }
                    warn!(%position_id, sequence, attempt = attempts, error = %e, "Gateway error, retrying");
                    tokio::time::sleep(self.backoff * attempts).await;
                }
            }
        }
    }

    /// Best-effort cancellation of in-flight commands for a position.
    pub async fn cancel_all(&self, position_id: PositionId) {
        if let Err(e) = self.gateway.cancel_all(position_id).await {
            warn!(%position_id, error = %e, "Best-effort cancel failed");
        }
    }

    /// Venue-reported size passthrough.
    pub async fn position_size(
        &self,
        symbol: &vigil_domain::Symbol,
        side: vigil_domain::Side,
    ) -> ExecResult<Option<vigil_domain::Quantity>> {
        self.gateway.position_size(symbol, side).await
    }

    /// The journal (restart inspection and tests).
    pub fn journal(&self) -> &CommandJournal {
        &self.journal
    }

    /// Release journal bookkeeping for a closed position.
    pub fn release(&self, position_id: PositionId) {
        self.journal.release(position_id);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubGateway;
    use rust_decimal_macros::dec;
    use uuid::Uuid;
    use vigil_domain::Price;

    fn dispatcher(gateway: Arc<StubGateway>) -> Dispatcher<StubGateway> {
        Dispatcher::new(gateway, Arc::new(CommandJournal::new()), 3, 1)
    }

    fn set_stop(value: rust_decimal::Decimal) -> AmendAction {
        AmendAction::SetStop { stop: Price::new(value).unwrap() }
    }

    #[tokio::test]
    async fn test_dispatch_applies_and_journals() {
        let gateway = Arc::new(StubGateway::new());
        let d = dispatcher(gateway.clone());
        let id = Uuid::now_v7();

        let outcome = d.dispatch(id, set_stop(dec!(200.5))).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Applied(_)));

        let applied = gateway.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].sequence, 1);

        let records = d.journal().records(id);
        assert_eq!(records[0].status, CommandStatus::Acked);
    }

    #[tokio::test]
    async fn test_dispatch_retries_then_succeeds() {
        let gateway = Arc::new(StubGateway::new());
        gateway.reject_next(2, "throttled");
        let d = dispatcher(gateway.clone());
        let id = Uuid::now_v7();

        let outcome = d.dispatch(id, set_stop(dec!(200.5))).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Applied(_)));
        assert_eq!(gateway.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_exhausts_retries() {
        let gateway = Arc::new(StubGateway::new());
        gateway.reject_next(10, "margin check failed");
        let d = dispatcher(gateway.clone());
        let id = Uuid::now_v7();

        let result = d.dispatch(id, set_stop(dec!(200.5))).await;
        match result {
            Err(ExecError::AmendmentRejected { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("expected AmendmentRejected, got {other:?}"),
        }
        assert!(gateway.applied().is_empty());

        let records = d.journal().records(id);
        assert_eq!(records[0].status, CommandStatus::Rejected);
    }

    #[tokio::test]
    async fn test_duplicate_sequence_suppressed() {
        let gateway = Arc::new(StubGateway::new());
        let id = Uuid::now_v7();

        // A command with sequence 1 already reached the gateway (e.g. a
        // retry raced its own timeout)
        gateway
            .amend(&OrderAmendment { position_id: id, sequence: 1, action: set_stop(dec!(200)) })
            .await
            .unwrap();

        let d = dispatcher(gateway.clone());
        let outcome = d.dispatch(id, set_stop(dec!(200))).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::DuplicateSuppressed(1));
        // Only the first delivery was recorded as applied
        assert_eq!(gateway.applied().len(), 1);
    }
}
