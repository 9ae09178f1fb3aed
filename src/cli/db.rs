//! Database management commands

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::info;

use crate::storage::EmaRepository;

use super::load_settings;

/// Database subcommands
#[derive(Subcommand)]
pub enum DbCommands {
    /// Create output and dimension relations
    InitSchema(InitSchemaArgs),
    /// Show output statistics
    Stats(StatsArgs),
    /// Show watermark state for one instrument
    Watermarks(WatermarksArgs),
}

/// Arguments for init-schema command
#[derive(Args)]
pub struct InitSchemaArgs {
    /// Seed the timeframe dimension with the default universe
    #[arg(long)]
    pub seed_timeframes: bool,
}

/// Arguments for stats command
#[derive(Args)]
pub struct StatsArgs {}

/// Arguments for watermarks command
#[derive(Args)]
pub struct WatermarksArgs {
    /// Instrument to inspect
    #[arg(long)]
    pub instrument: String,
}

/// Execute database commands
pub async fn execute(cmd: DbCommands) -> Result<()> {
    match cmd {
        DbCommands::InitSchema(args) => execute_init_schema(args).await,
        DbCommands::Stats(args) => execute_stats(args).await,
        DbCommands::Watermarks(args) => execute_watermarks(args).await,
    }
}

async fn execute_init_schema(args: InitSchemaArgs) -> Result<()> {
    let settings = load_settings();
    let repository = EmaRepository::from_settings(&settings.database).await?;

    info!("Initializing schema...");
    repository.init_schema().await?;

    if args.seed_timeframes {
        let seeded = repository.seed_default_timeframes().await?;
        info!("Seeded {} timeframe dimension entries", seeded);
        println!("Seeded {} timeframe(s)", seeded);
    }

    println!("Schema initialized");
    Ok(())
}

async fn execute_stats(_args: StatsArgs) -> Result<()> {
    let settings = load_settings();
    let repository = EmaRepository::from_settings(&settings.database).await?;

    let stats = repository.get_stats().await?;

    println!("Output statistics:");
    println!("  Observations: {}", stats.total_observations);
    println!("  Instruments:  {}", stats.total_instruments);
    println!("  Watermarks:   {}", stats.total_watermarks);
    if let Some(earliest) = stats.earliest_ts {
        println!("  Earliest:     {}", earliest);
    }
    if let Some(latest) = stats.latest_ts {
        println!("  Latest:       {}", latest);
    }

    Ok(())
}

async fn execute_watermarks(args: WatermarksArgs) -> Result<()> {
    let settings = load_settings();
    let repository = EmaRepository::from_settings(&settings.database).await?;

    let watermarks = repository.list_watermarks(&args.instrument).await?;
    if watermarks.is_empty() {
        println!("No watermarks for {}", args.instrument);
        return Ok(());
    }

    println!("Watermarks for {}:", args.instrument);
    for wm in &watermarks {
        println!(
            "  {:<24} {}  (updated {})",
            wm.key.to_string(),
            wm.last_emitted_ts,
            wm.updated_at
        );
    }

    Ok(())
}
