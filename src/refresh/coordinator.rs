//! Incremental refresh coordinator
//!
//! Drives the per-instrument state machine:
//! LOAD -> COMPUTE -> DIFF -> PERSIST -> ADVANCE.
//!
//! History is reloaded and recomputed in full each run; the stored
//! watermark decides which rows are new. Because the computation is
//! deterministic, recompute-all-keep-only-new is equivalent to a true
//! incremental recurrence, and a crash anywhere before a key's ADVANCE
//! only causes idempotent-skip rework on retry.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RefreshSettings;
use crate::schema::{EmaObservation, PricePoint, SeriesKey, SeriesKind};
use crate::series::build_observations;
use crate::storage::{ObservationStore, PriceStore, StorageError, WatermarkStore};
use crate::timeframe::{
    AlignmentType, ResolverError, TimeframeCache, TimeframeDefinition,
};

use super::report::{InstrumentOutcome, RefreshReport};

/// Refresh failures. Resolver failures abort the run; the rest are scoped
/// to one instrument or one key and collected in the report.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RefreshError {
    #[error("Timeframe resolution failed: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Recomputed history for a key does not reproduce its stored
    /// watermark row, either because no recomputed row lands on the
    /// watermark date or because the value there changed: upstream history
    /// was mutated retroactively. The engine does not self-heal; the key
    /// is skipped and surfaced for external reconciliation.
    #[error(
        "Watermark inconsistency for {key}: recomputed history does not \
         reproduce the stored watermark row at {watermark} (recomputed \
         range {first}..{last})"
    )]
    WatermarkInconsistency {
        key: SeriesKey,
        watermark: NaiveDate,
        first: NaiveDate,
        last: NaiveDate,
    },
}

/// Options for one refresh run.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub periods: Vec<u32>,
    pub series_kinds: Vec<SeriesKind>,
    /// Restrict the universe to one alignment family.
    pub alignment: Option<AlignmentType>,
    pub canonical_only: bool,
    /// Exact-label restriction of the resolved universe.
    pub timeframe_labels: Option<Vec<String>>,
    /// Reset the selected keys' watermarks and recompute from scratch.
    pub full_refresh: bool,
    pub parallelism: usize,
    /// Abort the batch on the first instrument failure instead of
    /// collecting it.
    pub fail_fast: bool,
}

impl RefreshOptions {
    pub fn from_settings(settings: &RefreshSettings) -> Self {
        Self {
            periods: settings.periods.clone(),
            series_kinds: settings.series_kinds.clone(),
            alignment: settings.alignment,
            canonical_only: settings.canonical_only,
            timeframe_labels: None,
            full_refresh: false,
            parallelism: settings.parallelism.max(1),
            fail_fast: settings.fail_fast,
        }
    }
}

/// Orchestrates incremental refresh across instruments.
///
/// Instruments are independent; they run concurrently up to
/// `options.parallelism`, sharing only the read-only timeframe cache and
/// the persistence sink.
pub struct RefreshCoordinator<S> {
    store: Arc<S>,
    timeframes: Arc<TimeframeCache>,
    options: RefreshOptions,
}

impl<S> RefreshCoordinator<S>
where
    S: PriceStore + ObservationStore + WatermarkStore + 'static,
{
    pub fn new(store: Arc<S>, timeframes: Arc<TimeframeCache>, options: RefreshOptions) -> Self {
        Self {
            store,
            timeframes,
            options,
        }
    }

    /// Run a refresh over the given instruments.
    ///
    /// Per-instrument failures are collected in the report unless
    /// `fail_fast` is set, in which case the first failure aborts the
    /// batch.
    pub async fn run(&self, instruments: &[String]) -> Result<RefreshReport, RefreshError> {
        let universe = self.resolve_universe()?;
        let key_count = universe.len() * self.options.periods.len() * self.options.series_kinds.len();
        info!(
            "Refreshing {} instruments across {} timeframes ({} keys each)",
            instruments.len(),
            universe.len(),
            key_count
        );

        let universe = Arc::new(universe);
        let mut report = RefreshReport::default();

        let mut outcomes = stream::iter(instruments.iter().cloned())
            .map(|instrument_id| {
                let universe = Arc::clone(&universe);
                async move { self.refresh_instrument(&instrument_id, &universe).await }
            })
            .buffer_unordered(self.options.parallelism);

        while let Some(mut outcome) = outcomes.next().await {
            if self.options.fail_fast && !outcome.is_success() {
                return Err(outcome.errors.remove(0));
            }
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    /// Resolve and filter the timeframe universe for this run.
    fn resolve_universe(&self) -> Result<Vec<TimeframeDefinition>, RefreshError> {
        let mut universe = self
            .timeframes
            .resolve(self.options.alignment, self.options.canonical_only)?;

        if let Some(labels) = &self.options.timeframe_labels {
            universe.retain(|tf| labels.iter().any(|l| l == &tf.label));
            if universe.is_empty() {
                return Err(ResolverError::NoTimeframes.into());
            }
        }

        Ok(universe)
    }

    /// Run the full state machine for one instrument.
    ///
    /// Key-scoped failures are collected in the outcome; remaining keys
    /// still make progress.
    pub async fn refresh_instrument(
        &self,
        instrument_id: &str,
        universe: &[TimeframeDefinition],
    ) -> InstrumentOutcome {
        let mut outcome = InstrumentOutcome::new(instrument_id);

        // LOAD: full reload of daily history, the accepted cost for
        // recurrence correctness.
        let prices = match self.store.load_daily_history(instrument_id).await {
            Ok(prices) => prices,
            Err(e) => {
                outcome.errors.push(e.into());
                return outcome;
            }
        };

        if prices.is_empty() {
            debug!("{}: no price history, nothing to do", instrument_id);
            return outcome;
        }

        let mut watermarks = match self.store.read_all(instrument_id).await {
            Ok(w) => w,
            Err(e) => {
                outcome.errors.push(e.into());
                return outcome;
            }
        };

        if self.options.full_refresh {
            let keys: Vec<SeriesKey> = self.keys(universe).collect();
            match self.store.clear(instrument_id, &keys).await {
                Ok(removed) => {
                    debug!("{}: cleared {} watermarks for full refresh", instrument_id, removed);
                    for key in &keys {
                        watermarks.remove(key);
                    }
                }
                Err(e) => {
                    outcome.errors.push(e.into());
                    return outcome;
                }
            }
        }

        for timeframe in universe {
            for &period in &self.options.periods {
                for &kind in &self.options.series_kinds {
                    let key = SeriesKey::new(timeframe.label.clone(), period, kind);
                    match self
                        .refresh_key(instrument_id, &prices, timeframe, &key, &watermarks)
                        .await
                    {
                        Ok(KeyResult::Inserted(n)) => {
                            outcome.keys_processed += 1;
                            outcome.rows_inserted += n;
                        }
                        Ok(KeyResult::Current) => {
                            outcome.keys_processed += 1;
                            outcome.keys_current += 1;
                        }
                        Ok(KeyResult::InsufficientHistory) => {
                            outcome.keys_insufficient_history += 1;
                        }
                        Err(e) => {
                            warn!("{}/{}: {}", instrument_id, key, e);
                            outcome.errors.push(e);
                        }
                    }
                }
            }
        }

        debug!(
            "{}: {} keys processed, {} rows inserted, {} below threshold",
            instrument_id,
            outcome.keys_processed,
            outcome.rows_inserted,
            outcome.keys_insufficient_history
        );
        outcome
    }

    /// COMPUTE -> DIFF -> PERSIST -> ADVANCE for a single key.
    async fn refresh_key(
        &self,
        instrument_id: &str,
        prices: &[PricePoint],
        timeframe: &TimeframeDefinition,
        key: &SeriesKey,
        watermarks: &HashMap<SeriesKey, NaiveDate>,
    ) -> Result<KeyResult, RefreshError> {
        // COMPUTE: full theoretical output for this key.
        let rows = build_observations(prices, timeframe, key.period, key.kind);
        if rows.is_empty() {
            debug!(
                "{}/{}: history below seeding threshold, emitting nothing",
                instrument_id, key
            );
            return Ok(KeyResult::InsufficientHistory);
        }

        // DIFF: keep rows strictly beyond the stored watermark.
        let new_rows: &[_] = match watermarks.get(key) {
            None => &rows[..],
            Some(&watermark) => {
                let last = rows[rows.len() - 1].ts;
                if watermark >= last {
                    // Also covers a watermark beyond all available data:
                    // nothing new, watermark untouched.
                    &[]
                } else {
                    // The recomputed series must reproduce the watermark row,
                    // otherwise upstream history was mutated retroactively.
                    match rows.iter().position(|r| r.ts == watermark) {
                        Some(pos) => {
                            self.settle_boundary(instrument_id, key, &rows, pos)
                                .await?;
                            &rows[pos + 1..]
                        }
                        None => {
                            return Err(RefreshError::WatermarkInconsistency {
                                key: key.clone(),
                                watermark,
                                first: rows[0].ts,
                                last,
                            });
                        }
                    }
                }
            }
        };

        if new_rows.is_empty() {
            return Ok(KeyResult::Current);
        }

        // PERSIST + ADVANCE: one transaction; conflicts skip, the watermark
        // moves to the batch maximum.
        let inserted = self
            .store
            .insert_and_advance(instrument_id, key, new_rows)
            .await?;
        Ok(KeyResult::Inserted(inserted))
    }

    /// Reconcile the stored row at the watermark against its recomputation.
    ///
    /// The value must match exactly; a mismatch (or a missing stored row)
    /// means upstream history was mutated retroactively and the key fails
    /// loudly. Classification may legitimately change on calendar
    /// timeframes: the trailing row of the previous run settles from
    /// preview to canonical once the next period's data arrives, and the
    /// stored row is updated in place so the completed bucket keeps
    /// exactly one canonical row.
    async fn settle_boundary(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        rows: &[EmaObservation],
        pos: usize,
    ) -> Result<(), RefreshError> {
        let recomputed = &rows[pos];
        let stored = self
            .store
            .find_observation(instrument_id, key, recomputed.ts)
            .await?;

        let stored = match stored {
            Some(s) if s.value == recomputed.value => s,
            _ => {
                return Err(RefreshError::WatermarkInconsistency {
                    key: key.clone(),
                    watermark: recomputed.ts,
                    first: rows[0].ts,
                    last: rows[rows.len() - 1].ts,
                });
            }
        };

        if stored != *recomputed {
            debug!(
                "{}/{}: boundary row {} settled, updating classification",
                instrument_id, key, recomputed.ts
            );
            self.store
                .update_observation(instrument_id, key, recomputed)
                .await?;
        }

        Ok(())
    }

    fn keys<'a>(
        &'a self,
        universe: &'a [TimeframeDefinition],
    ) -> impl Iterator<Item = SeriesKey> + 'a {
        universe.iter().flat_map(move |tf| {
            self.options.periods.iter().flat_map(move |&period| {
                self.options
                    .series_kinds
                    .iter()
                    .map(move |&kind| SeriesKey::new(tf.label.clone(), period, kind))
            })
        })
    }
}

enum KeyResult {
    Inserted(usize),
    Current,
    InsufficientHistory,
}
