//! EMA Engine CLI
//!
//! Provides commands for:
//! - `refresh`: Advance computed series to the latest upstream data
//! - `timeframes`: Inspect the timeframe dimension
//! - `db`: Database operations

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ema_engine::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("ema_engine=info".parse()?))
        .init();

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    match cli.command {
        Commands::Refresh(args) => {
            ema_engine::cli::refresh::execute(args).await?;
        }
        Commands::Timeframes(cmd) => {
            ema_engine::cli::timeframes::execute(cmd).await?;
        }
        Commands::Db(cmd) => {
            ema_engine::cli::db::execute(cmd).await?;
        }
    }

    Ok(())
}
