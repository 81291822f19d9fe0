//! Event bus for internal daemon communication.
//!
//! The event bus decouples the producers from the lifecycle machinery:
//! - Snapshot feed → lifecycle units (ticks)
//! - Execution layer → manager (entry fills)
//! - Gateway watcher → lifecycle units (flat notices)
//! - Lifecycle units → observers (telemetry, close notices)
//!
//! Uses tokio broadcast channels for fan-out to multiple receivers.

use tokio::sync::broadcast;

use vigil_domain::{
    EntryDraft, Event, ExitReason, MarketSnapshot, PositionId, Side, Symbol,
};

// =============================================================================
// Event Types
// =============================================================================

/// Events that flow through the daemon event bus.
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    /// New market snapshot (one tick for every unit on the symbol)
    Snapshot(MarketSnapshot),

    /// Entry order filled; a lifecycle unit must be created
    EntryFill(EntryDraft),

    /// Gateway reported zero size for a (symbol, side)
    GatewayFlat {
        /// Affected contract
        symbol: Symbol,
        /// Affected direction
        side: Side,
    },

    /// Telemetry from a lifecycle unit
    Telemetry(Event),

    /// A position reached its terminal state
    PositionClosed {
        /// Closed position
        position_id: PositionId,
        /// Why it closed
        reason: ExitReason,
    },

    /// Shutdown signal
    Shutdown,
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event bus for daemon-wide communication.
///
/// Multiple producers can send events, and multiple consumers can
/// receive. Uses broadcast channels for the fan-out pattern.
pub struct EventBus {
    sender: broadcast::Sender<DaemonEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before slow
    /// receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    pub fn send(&self, event: DaemonEvent) -> usize {
        // send() errors when there are no receivers; that is fine here
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver { receiver: self.sender.subscribe() }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Receiver for daemon events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<DaemonEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns an error description if the receiver lagged.
    pub async fn recv(&mut self) -> Option<Result<DaemonEvent, String>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<Result<DaemonEvent, String>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            }
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
    use vigil_testkit::SnapshotBuilder;

    #[tokio::test]
    async fn test_event_bus_send_recv() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        let snap = SnapshotBuilder::new("SOLUSDT", dec!(200)).build();
        bus.send(DaemonEvent::Snapshot(snap.clone()));

        let event = receiver.recv().await.unwrap().unwrap();
        match event {
            DaemonEvent::Snapshot(s) => assert_eq!(s.symbol, snap.symbol),
            _ => panic!("Expected Snapshot event"),
        }
    }

    #[tokio::test]
    async fn test_event_bus_multiple_receivers() {
        let bus = EventBus::new(10);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();

        assert_eq!(bus.receiver_count(), 2);

        bus.send(DaemonEvent::Shutdown);

        assert!(matches!(receiver1.recv().await.unwrap().unwrap(), DaemonEvent::Shutdown));
        assert!(matches!(receiver2.recv().await.unwrap().unwrap(), DaemonEvent::Shutdown));
    }

    #[tokio::test]
    async fn test_event_bus_no_receivers() {
        let bus = EventBus::new(10);

        // Send with no receivers should not panic
        let count = bus.send(DaemonEvent::Shutdown);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        assert!(receiver.try_recv().is_none());
    }
}
