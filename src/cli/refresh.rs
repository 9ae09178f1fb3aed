//! Refresh command

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use tracing::info;

use crate::refresh::{RefreshCoordinator, RefreshOptions};
use crate::schema::SeriesKind;
use crate::storage::{EmaRepository, PriceStore};
use crate::timeframe::{AlignmentType, TimeframeCache};

use super::load_settings;

/// Arguments for refresh command
#[derive(Args)]
pub struct RefreshArgs {
    /// Instruments to refresh: `all` or a comma-separated id list; all
    /// known instruments if omitted
    #[arg(long, value_delimiter = ',')]
    pub instruments: Vec<String>,

    /// Restrict to specific timeframe labels (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub timeframes: Vec<String>,

    /// Override configured smoothing periods (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub periods: Vec<u32>,

    /// Override configured seeding policies (recursive, anchored)
    #[arg(long, value_delimiter = ',')]
    pub series_kinds: Vec<String>,

    /// Restrict to one alignment family (fixed, calendar)
    #[arg(long)]
    pub alignment: Option<String>,

    /// Include dimension entries not flagged canonical
    #[arg(long)]
    pub include_non_canonical: bool,

    /// Reset watermarks for the selected keys and recompute from scratch
    #[arg(long)]
    pub full_refresh: bool,

    /// Abort the batch on the first instrument failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Override configured instrument concurrency
    #[arg(long)]
    pub parallelism: Option<usize>,
}

/// Execute refresh command
pub async fn execute(args: RefreshArgs) -> Result<()> {
    let settings = load_settings();
    let repository = Arc::new(EmaRepository::from_settings(&settings.database).await?);
    let timeframes = Arc::new(TimeframeCache::load(repository.pool()).await?);

    let mut options = RefreshOptions::from_settings(&settings.refresh);

    if !args.timeframes.is_empty() {
        options.timeframe_labels = Some(args.timeframes);
    }
    if !args.periods.is_empty() {
        options.periods = args.periods;
    }
    if !args.series_kinds.is_empty() {
        options.series_kinds = args
            .series_kinds
            .iter()
            .map(|s| {
                SeriesKind::from_str(s)
                    .ok_or_else(|| anyhow::anyhow!("Unknown series kind '{}'", s))
            })
            .collect::<Result<Vec<_>>>()?;
    }
    if let Some(alignment) = &args.alignment {
        options.alignment = Some(
            AlignmentType::from_str(alignment)
                .ok_or_else(|| anyhow::anyhow!("Unknown alignment type '{}'", alignment))?,
        );
    }
    if args.include_non_canonical {
        options.canonical_only = false;
    }
    if let Some(parallelism) = args.parallelism {
        options.parallelism = parallelism.max(1);
    }
    options.full_refresh = args.full_refresh;
    options.fail_fast = options.fail_fast || args.fail_fast;

    let instruments = if selects_all_instruments(&args.instruments) {
        let all = repository.list_instruments().await?;
        info!("Refreshing all {} known instruments", all.len());
        all
    } else {
        args.instruments
    };

    if instruments.is_empty() {
        info!("No instruments to refresh");
        return Ok(());
    }

    let coordinator = RefreshCoordinator::new(repository, timeframes, options);
    let report = coordinator.run(&instruments).await?;
    report.log_summary();

    let failed = report.failed_instruments();
    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} instruments failed: {}",
            failed.len(),
            report.outcomes.len(),
            failed.join(", ")
        );
    }

    println!(
        "Refreshed {} instruments, {} rows inserted",
        report.outcomes.len(),
        report.total_rows_inserted()
    );
    Ok(())
}

/// Whether the selection means the whole known universe: an omitted flag or
/// the literal `all`.
fn selects_all_instruments(instruments: &[String]) -> bool {
    instruments.is_empty()
        || (instruments.len() == 1 && instruments[0].eq_ignore_ascii_case("all"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_all_instruments() {
        assert!(selects_all_instruments(&[]));
        assert!(selects_all_instruments(&["all".to_string()]));
        assert!(selects_all_instruments(&["ALL".to_string()]));
        assert!(!selects_all_instruments(&["AAPL".to_string()]));
        assert!(!selects_all_instruments(&[
            "all".to_string(),
            "AAPL".to_string()
        ]));
    }
}
