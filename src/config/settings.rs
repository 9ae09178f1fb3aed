//! Application settings and configuration

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::schema::SeriesKind;
use crate::timeframe::AlignmentType;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Database configuration
    pub database: DatabaseSettings,
    /// Refresh run configuration
    #[serde(default)]
    pub refresh: RefreshSettings,
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Batch insert size
    #[serde(default = "default_batch_size")]
    pub batch_insert_size: usize,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_batch_size() -> usize {
    1000
}

/// Refresh run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// Smoothing periods computed per timeframe
    #[serde(default = "default_periods")]
    pub periods: Vec<u32>,
    /// Seeding policies to compute and persist
    #[serde(default = "default_series_kinds")]
    pub series_kinds: Vec<SeriesKind>,
    /// Restrict the timeframe universe to one alignment family
    #[serde(default)]
    pub alignment: Option<AlignmentType>,
    /// Only use dimension entries flagged canonical
    #[serde(default = "default_true")]
    pub canonical_only: bool,
    /// Instruments refreshed concurrently
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Abort the batch on the first instrument failure
    #[serde(default)]
    pub fail_fast: bool,
}

fn default_periods() -> Vec<u32> {
    vec![5, 10, 20, 50]
}

fn default_series_kinds() -> Vec<SeriesKind> {
    vec![SeriesKind::Recursive]
}

fn default_parallelism() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            periods: default_periods(),
            series_kinds: default_series_kinds(),
            alignment: None,
            canonical_only: default_true(),
            parallelism: default_parallelism(),
            fail_fast: false,
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix("EMA_ENGINE")
    }

    /// Load settings with a custom environment variable prefix
    pub fn load_with_prefix(env_prefix: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config_dir = Self::config_dir();

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            // Add environment-specific configuration
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Add local overrides (not checked into git)
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            // Add environment variables (e.g., EMA_ENGINE__DATABASE__URL)
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Get the configuration directory path
    fn config_dir() -> String {
        std::env::var("EMA_ENGINE_CONFIG_DIR").unwrap_or_else(|_| "config".into())
    }

    /// Create default settings (useful for testing)
    pub fn default_settings() -> Self {
        Settings {
            database: DatabaseSettings {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/ema_engine".into()),
                max_connections: 10,
                min_connections: 2,
                batch_insert_size: 1000,
            },
            refresh: RefreshSettings::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}
