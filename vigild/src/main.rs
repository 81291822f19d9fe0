//! Vigil Daemon
//!
//! Position lifecycle and risk-management runtime.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p vigild
//!
//! # Start with custom environment
//! VIGIL_ENV=test VIGIL_API_PORT=8081 cargo run -p vigild
//! ```
//!
//! # Environment Variables
//!
//! - `VIGIL_ENV`: Environment (test, development, production)
//! - `VIGIL_API_HOST`: API host (default: 0.0.0.0)
//! - `VIGIL_API_PORT`: API port (default: 8080)
//! - `VIGIL_TREND_UP` / `VIGIL_TREND_DOWN`: regime trend bands
//! - `VIGIL_VOL_PCT_UP` / `VIGIL_VOL_PCT_DOWN`: regime volatility bands
//! - `VIGIL_MILESTONE_STEP_R` / `VIGIL_MILESTONE_LOCK_DELTA_R`: ratchet milestones
//! - `VIGIL_STOP_COOLDOWN_SECS` / `VIGIL_LADDER_COOLDOWN_SECS`: amendment cooldowns
//! - `VIGIL_REENTRY_COOLDOWN_SECS` / `VIGIL_REENTRY_DISTANCE_PCT`: re-entry gate
//! - `VIGIL_GRACE_BARS` / `VIGIL_GRACE_SECS`: guard grace window

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vigild::{Config, Daemon};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vigild=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Vigil Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::new_stub(config)?;
    daemon.run().await?;

    Ok(())
}
