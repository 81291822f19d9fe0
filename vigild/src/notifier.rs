//! Notification port.
//!
//! The engine emits structured notification payloads; rendering and
//! delivery belong to the external messaging collaborator behind this
//! port. The default adapter logs the payload.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

use vigil_domain::NotificationMessage;

/// Port for the external messaging collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one structured notification.
    async fn notify(&self, message: NotificationMessage);
}

/// Default adapter: structured log line per notification.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: NotificationMessage) {
        match serde_json::to_string(&message) {
            Ok(payload) => info!(%payload, "notification"),
            Err(e) => info!(error = %e, "notification serialization failed"),
        }
    }
}

/// Test adapter: records every delivered notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<NotificationMessage>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All delivered notifications, in order.
    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: NotificationMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

// =============================================================================
// Tests
// =============================================================================
