//! Refresh run reporting
//!
//! Per-instrument outcomes are collected rather than failing the batch, so
//! one instrument's failure never blocks progress on the rest.

use tracing::{info, warn};

use super::coordinator::RefreshError;

/// Outcome of refreshing one instrument.
#[derive(Debug, Default)]
pub struct InstrumentOutcome {
    pub instrument_id: String,
    /// Keys that went through the full state machine.
    pub keys_processed: usize,
    /// Keys below their seeding threshold; expected, not an error.
    pub keys_insufficient_history: usize,
    /// Keys already at their watermark; nothing to do.
    pub keys_current: usize,
    pub rows_inserted: usize,
    /// Key-scoped and load failures for this instrument.
    pub errors: Vec<RefreshError>,
}

impl InstrumentOutcome {
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Aggregated outcome of one refresh run.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub outcomes: Vec<InstrumentOutcome>,
}

impl RefreshReport {
    pub fn total_rows_inserted(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows_inserted).sum()
    }

    pub fn failed_instruments(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.instrument_id.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_success())
    }

    /// Log a one-line summary plus a warning per failed instrument.
    pub fn log_summary(&self) {
        info!(
            "Refresh complete: {} instruments, {} rows inserted, {} failed",
            self.outcomes.len(),
            self.total_rows_inserted(),
            self.failed_instruments().len()
        );
        for outcome in &self.outcomes {
            for error in &outcome.errors {
                warn!("{}: {}", outcome.instrument_id, error);
            }
        }
    }
}
