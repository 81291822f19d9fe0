//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults
//! and hands the engine one immutable, validated `EngineConfig`. The
//! resolved configuration is echoed at startup.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use tracing::info;

use vigil_domain::EngineConfig;

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Engine thresholds
    pub engine: EngineConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let engine = Self::load_engine_config()?;

        engine.validate().map_err(|e| DaemonError::Config(e.to_string()))?;

        Ok(Self { api, engine, environment })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            engine: EngineConfig::default(),
            environment: Environment::Test,
        }
    }

    /// Echo the resolved configuration at startup.
    pub fn echo(&self) {
        let e = &self.engine;
        info!(
            trend_up = %e.regime.trend_up,
            trend_down = %e.regime.trend_down,
            vol_pct_up = %e.regime.vol_pct_up,
            vol_pct_down = %e.regime.vol_pct_down,
            "config: regime bands"
        );
        info!(
            hard_trend_delta = %e.guard.hard_trend_delta,
            hard_vol_ratio = %e.guard.hard_vol_ratio,
            confirm_closes = e.guard.confirm_closes,
            grace_bars = e.guard.grace_bars,
            grace_secs = e.guard.grace_secs,
            "config: post-entry guard"
        );
        info!(
            milestone_step_r = %e.ratchet.milestone_step_r,
            milestone_lock_delta_r = %e.ratchet.milestone_lock_delta_r,
            fee_pad_pct = %e.ratchet.fee_pad_pct,
            abs_lock = %e.ratchet.abs_lock,
            min_gap_pct = %e.ratchet.min_gap_pct,
            stop_cooldown_secs = e.ratchet.stop_cooldown_secs,
            "config: stop ratchet"
        );
        info!(
            cooldown_secs = e.reentry.cooldown_secs,
            min_distance_pct = %e.reentry.min_distance_pct,
            extension_pct = %e.reentry.extension_pct,
            momentum_floor = %e.reentry.momentum_floor,
            "config: re-entry gate"
        );
        info!(stall_bars = e.stall_bars, bar_secs = e.bar_secs, "config: exit policy");
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("VIGIL_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid VIGIL_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("VIGIL_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("VIGIL_API_PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| DaemonError::Config(format!("Invalid VIGIL_API_PORT: {}", port_str)))?;

        Ok(ApiConfig { host, port })
    }

    fn load_engine_config() -> DaemonResult<EngineConfig> {
        let mut cfg = EngineConfig::default();

        cfg.regime.trend_up = Self::load_decimal_env("VIGIL_TREND_UP", cfg.regime.trend_up)?;
        cfg.regime.trend_down = Self::load_decimal_env("VIGIL_TREND_DOWN", cfg.regime.trend_down)?;
        cfg.regime.vol_pct_up = Self::load_decimal_env("VIGIL_VOL_PCT_UP", cfg.regime.vol_pct_up)?;
        cfg.regime.vol_pct_down =
            Self::load_decimal_env("VIGIL_VOL_PCT_DOWN", cfg.regime.vol_pct_down)?;

        cfg.guard.grace_bars = Self::load_int_env("VIGIL_GRACE_BARS", cfg.guard.grace_bars)?;
        cfg.guard.grace_secs = Self::load_int_env("VIGIL_GRACE_SECS", cfg.guard.grace_secs)?;
        cfg.guard.confirm_closes =
            Self::load_int_env("VIGIL_CONFIRM_CLOSES", cfg.guard.confirm_closes)?;

        cfg.ratchet.milestone_step_r =
            Self::load_decimal_env("VIGIL_MILESTONE_STEP_R", cfg.ratchet.milestone_step_r)?;
        cfg.ratchet.milestone_lock_delta_r = Self::load_decimal_env(
            "VIGIL_MILESTONE_LOCK_DELTA_R",
            cfg.ratchet.milestone_lock_delta_r,
        )?;
        cfg.ratchet.abs_lock = Self::load_decimal_env("VIGIL_ABS_LOCK", cfg.ratchet.abs_lock)?;
        cfg.ratchet.fee_pad_pct =
            Self::load_decimal_env("VIGIL_FEE_PAD_PCT", cfg.ratchet.fee_pad_pct)?;
        cfg.ratchet.min_step_pct =
            Self::load_decimal_env("VIGIL_MIN_STEP_PCT", cfg.ratchet.min_step_pct)?;
        cfg.ratchet.min_gap_pct =
            Self::load_decimal_env("VIGIL_MIN_GAP_PCT", cfg.ratchet.min_gap_pct)?;
        cfg.ratchet.stop_cooldown_secs =
            Self::load_int_env("VIGIL_STOP_COOLDOWN_SECS", cfg.ratchet.stop_cooldown_secs)?;

        cfg.ladder.cooldown_secs =
            Self::load_int_env("VIGIL_LADDER_COOLDOWN_SECS", cfg.ladder.cooldown_secs)?;

        cfg.reentry.cooldown_secs =
            Self::load_int_env("VIGIL_REENTRY_COOLDOWN_SECS", cfg.reentry.cooldown_secs)?;
        cfg.reentry.min_distance_pct =
            Self::load_decimal_env("VIGIL_REENTRY_DISTANCE_PCT", cfg.reentry.min_distance_pct)?;

        cfg.stall_bars = Self::load_int_env("VIGIL_STALL_BARS", cfg.stall_bars)?;
        cfg.bar_secs = Self::load_int_env("VIGIL_BAR_SECS", cfg.bar_secs)?;
        cfg.amend_retries = Self::load_int_env("VIGIL_AMEND_RETRIES", cfg.amend_retries)?;
        cfg.amend_backoff_ms =
            Self::load_int_env("VIGIL_AMEND_BACKOFF_MS", cfg.amend_backoff_ms)?;

        Ok(cfg)
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_int_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig { host: "0.0.0.0".to_string(), port: 8080 },
            engine: EngineConfig::default(),
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
