//! Daemon: Main runtime orchestrator.
//!
//! Ties together the components:
//! - Lifecycle Manager (registry + units)
//! - Event Bus (internal communication)
//! - API Server (HTTP status surface)
//!
//! # Lifecycle
//!
//! 1. Load configuration (echoed at startup)
//! 2. Initialize components
//! 3. Restore open positions from the store
//! 4. Start the API server
//! 5. Main event loop (entry fills, close notices)
//! 6. Graceful shutdown on SIGINT

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use vigil_engine::Engine;
use vigil_exec::{CommandJournal, Dispatcher, OrderGatewayPort, StubGateway};
use vigil_store::MemoryStore;

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{DaemonEvent, EventBus};
use crate::manager::LifecycleManager;
use crate::notifier::{LogNotifier, Notifier};

// =============================================================================
// Daemon
// =============================================================================

/// The main Vigil daemon.
pub struct Daemon<G: OrderGatewayPort + 'static> {
    config: Config,
    manager: Arc<LifecycleManager<G>>,
    event_bus: Arc<EventBus>,
}

impl Daemon<StubGateway> {
    /// Create a daemon wired to the stub gateway (tests/development;
    /// live venues plug their own adapter into [`Daemon::new`]).
    pub fn new_stub(config: Config) -> DaemonResult<Self> {
        let gateway = Arc::new(StubGateway::new());
        Self::with_gateway(config, gateway, Arc::new(LogNotifier))
    }
}

impl<G: OrderGatewayPort + 'static> Daemon<G> {
    /// Create a daemon from a gateway adapter and a notifier adapter.
    pub fn with_gateway(
        config: Config,
        gateway: Arc<G>,
        notifier: Arc<dyn Notifier>,
    ) -> DaemonResult<Self> {
        let engine = Engine::new(config.engine.clone())?;
        let store = Arc::new(MemoryStore::new());
        let journal = Arc::new(CommandJournal::new());
        let dispatcher = Arc::new(Dispatcher::new(
            gateway,
            journal,
            config.engine.amend_retries,
            config.engine.amend_backoff_ms,
        ));
        let event_bus = Arc::new(EventBus::new(1000));
        let manager = Arc::new(LifecycleManager::new(
            engine,
            store,
            dispatcher,
            event_bus.clone(),
            notifier,
        ));

        Ok(Self { config, manager, event_bus })
    }

    /// Create a daemon around pre-built components.
    pub fn new(config: Config, manager: Arc<LifecycleManager<G>>, event_bus: Arc<EventBus>) -> Self {
        Self { config, manager, event_bus }
    }

    /// The event bus (feeds and adapters publish into it).
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// The lifecycle manager.
    pub fn manager(&self) -> Arc<LifecycleManager<G>> {
        self.manager.clone()
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting Vigil daemon"
        );
        self.config.echo();

        // 1. Restore open positions
        self.manager.restore().await?;

        // 2. Start API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 3. Main event loop
        let mut receiver = self.event_bus.subscribe();
        info!("Entering main event loop");
        loop {
            tokio::select! {
                maybe = receiver.recv() => {
                    match maybe {
                        None => break,
                        Some(Err(lag_msg)) => warn!(%lag_msg, "Event receiver lagged"),
                        Some(Ok(event)) => {
                            match self.handle_event(event).await {
                                Ok(()) => {}
                                Err(DaemonError::Shutdown) => break,
                                Err(e) => error!(error = %e, "Error handling event"),
                            }
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        // 4. Graceful shutdown
        self.shutdown().await
    }

    /// Start the API server on the configured address.
    pub async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState { manager: self.manager.clone() });
        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| DaemonError::Config(format!("Failed to get local address: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    async fn handle_event(&self, event: DaemonEvent) -> DaemonResult<()> {
        match event {
            DaemonEvent::EntryFill(draft) => {
                info!(
                    symbol = %draft.symbol.as_pair(),
                    side = %draft.side,
                    price = %draft.price,
                    "Entry fill received"
                );
                self.manager.on_fill(draft).await?;
            }

            DaemonEvent::PositionClosed { position_id, reason } => {
                info!(%position_id, %reason, "Position closed");
            }

            DaemonEvent::Shutdown => return Err(DaemonError::Shutdown),

            // Snapshots, flat notices and telemetry are consumed by the
            // lifecycle units directly
            _ => {}
        }
        Ok(())
    }

    async fn shutdown(&self) -> DaemonResult<()> {
        info!("Initiating graceful shutdown");
        self.manager.shutdown().await;
        let remaining = self.manager.unit_count().await;
        info!(active_units = remaining, "Shutdown complete");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_stub_creation() {
        let config = Config::test();
        let daemon = Daemon::new_stub(config).unwrap();

        assert_eq!(daemon.manager.unit_count().await, 0);
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let config = Config::test();
        let daemon = Daemon::new_stub(config).unwrap();

        let addr = daemon.start_api_server().await.unwrap();
        assert!(addr.port() > 0);

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_daemon_restore_empty() {
        let config = Config::test();
        let daemon = Daemon::new_stub(config).unwrap();

        assert_eq!(daemon.manager.restore().await.unwrap(), 0);
    }
}
