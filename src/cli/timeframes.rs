//! Timeframe dimension commands

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::storage::EmaRepository;
use crate::timeframe::{AlignmentType, TimeframeCache};

use super::load_settings;

/// Timeframe subcommands
#[derive(Subcommand)]
pub enum TimeframeCommands {
    /// List the resolved timeframe universe
    List(ListArgs),
}

/// Arguments for list command
#[derive(Args)]
pub struct ListArgs {
    /// Restrict to one alignment family (fixed, calendar)
    #[arg(long)]
    pub alignment: Option<String>,

    /// Include dimension entries not flagged canonical
    #[arg(long)]
    pub include_non_canonical: bool,
}

/// Execute timeframe commands
pub async fn execute(cmd: TimeframeCommands) -> Result<()> {
    match cmd {
        TimeframeCommands::List(args) => execute_list(args).await,
    }
}

async fn execute_list(args: ListArgs) -> Result<()> {
    let settings = load_settings();
    let repository = EmaRepository::from_settings(&settings.database).await?;
    let cache = TimeframeCache::load(repository.pool()).await?;

    let family = match &args.alignment {
        Some(s) => Some(
            AlignmentType::from_str(s)
                .ok_or_else(|| anyhow::anyhow!("Unknown alignment type '{}'", s))?,
        ),
        None => None,
    };

    let resolved = cache.resolve(family, !args.include_non_canonical)?;

    println!(
        "{:<10} {:>11} {:<9} {:<9} {:>13} {:>11}",
        "label", "bucket_days", "alignment", "scheme", "partial_start", "partial_end"
    );
    for tf in &resolved {
        println!(
            "{:<10} {:>11} {:<9} {:<9} {:>13} {:>11}",
            tf.label,
            tf.bucket_days,
            tf.alignment.as_str(),
            tf.scheme.map(|s| s.as_str()).unwrap_or("-"),
            tf.allow_partial_start,
            tf.allow_partial_end
        );
    }
    println!("\n{} timeframe(s)", resolved.len());

    Ok(())
}
