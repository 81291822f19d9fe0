//! Sequenced Amendment Commands and the Command Journal
//!
//! Every command sent to the order gateway carries a per-position
//! monotonic sequence number. The gateway discards duplicates and
//! out-of-order sequences, which makes timeout-and-retry safe: repeating
//! a command can never create a duplicate order.
//!
//! The journal records every issued command and its outcome, so a
//! restarted daemon can inspect what was in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use vigil_domain::{PositionId, Price};

use crate::error::{ExecError, ExecResult};

// =============================================================================
// Commands
// =============================================================================

/// What the amendment asks the gateway to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AmendAction {
    /// Move the protective stop
    SetStop {
        /// New stop price
        stop: Price,
    },
    /// Replace the take-profit ladder
    SetTargets {
        /// New ladder, ordered by distance from entry
        targets: Vec<Price>,
    },
    /// Flatten the remainder at market
    Close,
}

impl AmendAction {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            AmendAction::SetStop { .. } => "set_stop",
            AmendAction::SetTargets { .. } => "set_targets",
            AmendAction::Close => "close",
        }
    }
}

/// One sequenced command for the order gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAmendment {
    /// Position this command belongs to
    pub position_id: PositionId,
    /// Monotonic per-position sequence number
    pub sequence: u64,
    /// The requested change
    pub action: AmendAction,
}

/// Gateway acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ack", rename_all = "snake_case")]
pub enum AmendAck {
    /// Command applied
    Applied,
    /// Command rejected (retryable)
    Rejected {
        /// Gateway-reported reason
        reason: String,
    },
    /// Sequence already seen; command discarded
    Duplicate,
}

// =============================================================================
// Journal
// =============================================================================

/// Outcome of a journaled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    /// Issued, no acknowledgement yet
    Pending,
    /// Gateway applied it
    Acked,
    /// Gateway rejected it and retries were exhausted
    Rejected,
    /// Gateway reported a duplicate sequence
    Duplicate,
}

/// Journal record for one issued command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// The command as sent
    pub amendment: OrderAmendment,
    /// Current status
    pub status: CommandStatus,
    /// When the command was issued
    pub issued_at: DateTime<Utc>,
    /// When the final status was recorded
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct PositionJournal {
    next_sequence: u64,
    records: Vec<CommandRecord>,
}

/// Per-position command sequencing and audit.
///
/// Thread-safe; the lifecycle units of different positions share one
/// journal without contending on each other's keys for long.
#[derive(Debug, Default)]
pub struct CommandJournal {
    positions: RwLock<HashMap<PositionId, PositionJournal>>,
}

impl CommandJournal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next sequenced command for a position and record it.
    pub fn issue(&self, position_id: PositionId, action: AmendAction) -> ExecResult<OrderAmendment> {
        let mut positions = self
            .positions
            .write()
            .map_err(|e| ExecError::Journal(format!("write lock poisoned: {e}")))?;
        let journal = positions.entry(position_id).or_default();
        journal.next_sequence += 1;

        let amendment = OrderAmendment {
            position_id,
            sequence: journal.next_sequence,
            action,
        };
        journal.records.push(CommandRecord {
            amendment: amendment.clone(),
            status: CommandStatus::Pending,
            issued_at: Utc::now(),
            completed_at: None,
        });
        Ok(amendment)
    }

    /// Record the final status of an issued command.
    pub fn complete(
        &self,
        position_id: PositionId,
        sequence: u64,
        status: CommandStatus,
    ) -> ExecResult<()> {
        let mut positions = self
            .positions
            .write()
            .map_err(|e| ExecError::Journal(format!("write lock poisoned: {e}")))?;
        let journal = positions
            .get_mut(&position_id)
            .ok_or_else(|| ExecError::Journal(format!("no journal for position {position_id}")))?;
        let record = journal
            .records
            .iter_mut()
            .find(|r| r.amendment.sequence == sequence)
            .ok_or_else(|| {
                ExecError::Journal(format!("sequence {sequence} not issued for {position_id}"))
            })?;
        record.status = status;
        record.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Highest sequence issued for a position (0 if none).
    pub fn last_sequence(&self, position_id: PositionId) -> u64 {
        self.positions
            .read()
            .ok()
            .and_then(|p| p.get(&position_id).map(|j| j.next_sequence))
            .unwrap_or(0)
    }

    /// Commands still pending for a position (restart inspection).
    pub fn pending(&self, position_id: PositionId) -> Vec<CommandRecord> {
        self.positions
            .read()
            .ok()
            .and_then(|p| {
                p.get(&position_id).map(|j| {
                    j.records
                        .iter()
                        .filter(|r| r.status == CommandStatus::Pending)
                        .cloned()
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    /// All records for a position.
    pub fn records(&self, position_id: PositionId) -> Vec<CommandRecord> {
        self.positions
            .read()
            .ok()
            .and_then(|p| p.get(&position_id).map(|j| j.records.clone()))
            .unwrap_or_default()
    }

    /// Drop a position's journal once its lifecycle unit released.
    pub fn release(&self, position_id: PositionId) {
        if let Ok(mut positions) = self.positions.write() {
            positions.remove(&position_id);
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
    use uuid::Uuid;

    fn set_stop(value: rust_decimal::Decimal) -> AmendAction {
        AmendAction::SetStop { stop: Price::new(value).unwrap() }
    }

    #[test]
    fn test_sequences_are_monotonic_per_position() {
        let journal = CommandJournal::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        assert_eq!(journal.issue(a, set_stop(dec!(100))).unwrap().sequence, 1);
        assert_eq!(journal.issue(a, set_stop(dec!(101))).unwrap().sequence, 2);
        // Independent counter per position
        assert_eq!(journal.issue(b, set_stop(dec!(50))).unwrap().sequence, 1);
        assert_eq!(journal.last_sequence(a), 2);
        assert_eq!(journal.last_sequence(b), 1);
    }

    #[test]
    fn test_complete_updates_record() {
        let journal = CommandJournal::new();
        let id = Uuid::now_v7();
        let cmd = journal.issue(id, set_stop(dec!(100))).unwrap();

        assert_eq!(journal.pending(id).len(), 1);
        journal.complete(id, cmd.sequence, CommandStatus::Acked).unwrap();
        assert!(journal.pending(id).is_empty());

        let records = journal.records(id);
        assert_eq!(records[0].status, CommandStatus::Acked);
        assert!(records[0].completed_at.is_some());
    }

    #[test]
    fn test_complete_unknown_sequence_errors() {
        let journal = CommandJournal::new();
        let id = Uuid::now_v7();
        journal.issue(id, set_stop(dec!(100))).unwrap();

        assert!(journal.complete(id, 99, CommandStatus::Acked).is_err());
        assert!(journal
            .complete(Uuid::now_v7(), 1, CommandStatus::Acked)
            .is_err());
    }

    #[test]
    fn test_release_drops_journal() {
        let journal = CommandJournal::new();
        let id = Uuid::now_v7();
        journal.issue(id, AmendAction::Close).unwrap();

        journal.release(id);
        assert_eq!(journal.last_sequence(id), 0);
        assert!(journal.records(id).is_empty());
    }

    #[test]
    fn test_amendment_serialization() {
        let cmd = OrderAmendment {
            position_id: Uuid::now_v7(),
            sequence: 7,
            action: AmendAction::SetTargets {
                targets: vec![Price::new(dec!(201)).unwrap(), Price::new(dec!(202)).unwrap()],
            },
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let parsed: OrderAmendment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cmd);
        assert!(json.contains("\"action\":\"set_targets\""));
    }
}
