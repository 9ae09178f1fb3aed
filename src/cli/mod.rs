//! Command-line interface
//!
//! Provides CLI commands for the engine.

pub mod db;
pub mod refresh;
pub mod timeframes;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::config::Settings;

/// EMA Engine CLI
#[derive(Parser)]
#[command(name = "ema-engine")]
#[command(about = "Incremental multi-timeframe smoothed series over daily prices")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Refresh computed series to the latest upstream data
    Refresh(refresh::RefreshArgs),
    /// Timeframe dimension commands
    #[command(subcommand)]
    Timeframes(timeframes::TimeframeCommands),
    /// Database operations
    #[command(subcommand)]
    Db(db::DbCommands),
}

/// Load settings from configuration, falling back to environment defaults.
pub(crate) fn load_settings() -> Settings {
    Settings::load().unwrap_or_else(|e| {
        debug!("Configuration not loaded ({}), using defaults", e);
        Settings::default_settings()
    })
}
