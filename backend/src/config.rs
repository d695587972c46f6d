//! Configuration management for the Plant Nursery Management Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides, e.g. NURSERY__LOSS__CANCEL_WHEN_DEPLETED

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::ReadinessWindow;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Batch creation rules
    pub batch: BatchConfig,

    /// Measurement intake rules
    pub measurement: MeasurementConfig,

    /// Readiness evaluation policy
    pub readiness: ReadinessConfig,

    /// Loss recording policy
    pub loss: LossConfig,

    /// Optimistic concurrency retry policy
    pub concurrency: ConcurrencyConfig,

    /// Dashboard reporting
    pub reporting: ReportingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    /// Smallest accepted initial quantity
    pub min_initial_qty: i32,

    /// Largest accepted initial quantity
    pub max_initial_qty: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MeasurementConfig {
    /// Upper bound on plants sampled per measurement
    pub max_sample_size: i32,
}

/// How the readiness window is chosen
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    CurrentStage,
    Trailing,
    All,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReadinessConfig {
    /// Which measurements feed the readiness decision
    pub window: WindowMode,

    /// Window length when `window = "trailing"`
    pub trailing_count: usize,

    /// Days ahead a projected ready date still counts as on track
    pub grace_period_days: i64,
}

impl ReadinessConfig {
    pub fn window(&self) -> ReadinessWindow {
        match self.window {
            WindowMode::CurrentStage => ReadinessWindow::CurrentStage,
            WindowMode::Trailing => ReadinessWindow::Trailing(self.trailing_count.max(1)),
            WindowMode::All => ReadinessWindow::All,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LossConfig {
    /// Cancel a batch whose living quantity reaches zero
    pub cancel_when_depleted: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConcurrencyConfig {
    /// Attempts per operation before a version conflict is surfaced
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportingConfig {
    /// Zones at or above this utilization are flagged
    pub utilization_alert_percent: u32,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment =
            std::env::var("NURSERY_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Self::load_from(
            &environment,
            Environment::with_prefix("NURSERY")
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Load with an explicit environment source, e.g. a fixed map in tests
    pub fn load_from(environment: &str, overrides: Environment) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment)?
            .set_default("database.url", "postgres://localhost/nursery")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("batch.min_initial_qty", 1)?
            .set_default("batch.max_initial_qty", 10_000)?
            .set_default("measurement.max_sample_size", 100)?
            .set_default("readiness.window", "current_stage")?
            .set_default("readiness.trailing_count", 5)?
            .set_default("readiness.grace_period_days", 90)?
            .set_default("loss.cancel_when_depleted", true)?
            .set_default("concurrency.max_attempts", 5)?
            .set_default("reporting.utilization_alert_percent", 90)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (NURSERY__ prefix)
            .add_source(overrides)
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            database: DatabaseConfig::default(),
            batch: BatchConfig {
                min_initial_qty: 1,
                max_initial_qty: 10_000,
            },
            measurement: MeasurementConfig {
                max_sample_size: 100,
            },
            readiness: ReadinessConfig {
                window: WindowMode::CurrentStage,
                trailing_count: 5,
                grace_period_days: 90,
            },
            loss: LossConfig {
                cancel_when_depleted: true,
            },
            concurrency: ConcurrencyConfig { max_attempts: 5 },
            reporting: ReportingConfig {
                utilization_alert_percent: 90,
            },
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/nursery".to_string(),
            max_connections: 10,
            min_connections: 2,
        }
    }
}
