//! Stub gateway for testing.
//!
//! Simulates the venue-side amendment contract without network I/O:
//! sequence dedupe per position, scriptable rejections, and scriptable
//! size reports for flat/desync scenarios.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use vigil_domain::{PositionId, Quantity, Side, Symbol};

use crate::command::{AmendAck, OrderAmendment};
use crate::error::ExecError;
use crate::ports::OrderGatewayPort;

/// In-memory gateway with venue-like sequence handling.
#[derive(Default)]
pub struct StubGateway {
    /// Amendments that were actually applied, in arrival order
    applied: RwLock<Vec<OrderAmendment>>,
    /// Highest sequence seen per position
    last_sequence: RwLock<HashMap<PositionId, u64>>,
    /// Remaining scripted rejections
    reject_remaining: AtomicU32,
    /// Reason attached to scripted rejections
    reject_reason: RwLock<String>,
    /// Scripted size reports per (pair, side)
    sizes: RwLock<HashMap<(String, Side), Quantity>>,
    /// Cancelled positions (best-effort cancel tracking)
    cancelled: RwLock<Vec<PositionId>>,
}

impl StubGateway {
    /// Create a stub gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `count` amendments to be rejected.
    pub fn reject_next(&self, count: u32, reason: &str) {
        self.reject_remaining.store(count, Ordering::SeqCst);
        *self.reject_reason.write().unwrap() = reason.to_string();
    }

    /// Script the size the venue reports for a (pair, side).
    pub fn set_position_size(&self, pair: &str, side: Side, size: Quantity) {
        self.sizes
            .write()
            .unwrap()
            .insert((pair.to_string(), side), size);
    }

    /// Applied amendments, in arrival order.
    pub fn applied(&self) -> Vec<OrderAmendment> {
        self.applied.read().unwrap().clone()
    }

    /// Applied amendments for one position.
    pub fn applied_for(&self, position_id: PositionId) -> Vec<OrderAmendment> {
        self.applied
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.position_id == position_id)
            .cloned()
            .collect()
    }

    /// Positions that received a best-effort cancel.
    pub fn cancelled(&self) -> Vec<PositionId> {
        self.cancelled.read().unwrap().clone()
    }
}

#[async_trait]
impl OrderGatewayPort for StubGateway {
    async fn amend(&self, amendment: &OrderAmendment) -> Result<AmendAck, ExecError> {
        // Sequence check first: the venue contract discards duplicates
        // and out-of-order commands before anything else.
        {
            let last = self.last_sequence.read().unwrap();
            if let Some(&seen) = last.get(&amendment.position_id) {
                if amendment.sequence <= seen {
                    return Ok(AmendAck::Duplicate);
                }
            }
        }

        if self
            .reject_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(AmendAck::Rejected {
                reason: self.reject_reason.read().unwrap().clone(),
            });
        }

        self.last_sequence
            .write()
            .unwrap()
            .insert(amendment.position_id, amendment.sequence);
        self.applied.write().unwrap().push(amendment.clone());
        Ok(AmendAck::Applied)
    }

    async fn position_size(
        &self,
        symbol: &Symbol,
        side: Side,
    ) -> Result<Option<Quantity>, ExecError> {
        Ok(self
            .sizes
            .read()
            .unwrap()
            .get(&(symbol.as_pair(), side))
            .copied())
    }

    async fn cancel_all(&self, position_id: PositionId) -> Result<(), ExecError> {
        self.cancelled.write().unwrap().push(position_id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ExecError> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
