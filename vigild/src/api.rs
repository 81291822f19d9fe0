//! HTTP API for the Vigil daemon.
//!
//! Read-only surface:
//! - Health check
//! - Status (open positions and their committed levels)
//! - Re-entry locks
//!
//! Entry placement belongs to the external signal engine; the daemon
//! only reports what it manages.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use vigil_exec::OrderGatewayPort;

use crate::manager::LifecycleManager;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<G: OrderGatewayPort + 'static> {
    /// The lifecycle manager
    pub manager: Arc<LifecycleManager<G>>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" when reachable
    pub status: String,
    /// Daemon version
    pub version: String,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Number of open positions
    pub open_positions: usize,
    /// Per-position summaries
    pub positions: Vec<PositionSummary>,
}

/// Summary of a managed position.
#[derive(Debug, Serialize)]
pub struct PositionSummary {
    /// Position identity
    pub id: Uuid,
    /// Contract pair
    pub symbol: String,
    /// Direction
    pub side: String,
    /// Lifecycle status label
    pub status: String,
    /// Regime label
    pub regime: String,
    /// Guard state label
    pub guard: String,
    /// Entry fill price
    pub entry_price: Decimal,
    /// Committed protective stop
    pub stop: Decimal,
    /// Committed ladder
    pub targets: Vec<Decimal>,
    /// Targets already hit
    pub targets_hit: usize,
    /// Milestone counter
    pub milestones: u32,
}

/// One re-entry lock row.
#[derive(Debug, Serialize)]
pub struct ReentryLockSummary {
    /// Contract pair
    pub symbol: String,
    /// Closed direction
    pub side: String,
    /// Exit fill price
    pub exit_price: Decimal,
    /// Exit reason token
    pub exit_reason: String,
    /// When the position closed
    pub exited_at: chrono::DateTime<chrono::Utc>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description
    pub error: String,
}

// =============================================================================
// Router
// =============================================================================

/// Build the API router.
pub fn create_router<G: OrderGatewayPort + 'static>(state: Arc<ApiState<G>>) -> Router {
    Router::new()
        .route("/health", get(health::<G>))
        .route("/status", get(status::<G>))
        .route("/reentry-locks", get(reentry_locks::<G>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health<G: OrderGatewayPort + 'static>(
    State(_state): State<Arc<ApiState<G>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn status<G: OrderGatewayPort + 'static>(
    State(state): State<Arc<ApiState<G>>>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let positions = state.manager.open_positions().await.map_err(internal)?;

    let summaries = positions
        .iter()
        .map(|p| PositionSummary {
            id: p.id,
            symbol: p.symbol.as_pair(),
            side: p.side.to_string(),
            status: p.status.label().to_string(),
            regime: p.regime.to_string(),
            guard: p.guard.label().to_string(),
            entry_price: p.entry_price.as_decimal(),
            stop: p.stop.as_decimal(),
            targets: p.targets.iter().map(|t| t.as_decimal()).collect(),
            targets_hit: p.targets_hit,
            milestones: p.milestones,
        })
        .collect();

    Ok(Json(StatusResponse {
        open_positions: positions.len(),
        positions: summaries,
    }))
}

async fn reentry_locks<G: OrderGatewayPort + 'static>(
    State(state): State<Arc<ApiState<G>>>,
) -> Result<Json<Vec<ReentryLockSummary>>, (StatusCode, Json<ErrorResponse>)> {
    let locks = state.manager.reentry_locks().await.map_err(internal)?;

    Ok(Json(
        locks
            .iter()
            .map(|l| ReentryLockSummary {
                symbol: l.symbol.as_pair(),
                side: l.side.to_string(),
                exit_price: l.exit_price.as_decimal(),
                exit_reason: l.exit_reason.as_str().to_string(),
                exited_at: l.exited_at,
            })
            .collect(),
    ))
}

fn internal(e: crate::error::DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: e.to_string() }),
    )
}
