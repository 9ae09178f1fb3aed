//! Storage trait seams
//!
//! The coordinator talks to storage through these traits so the refresh
//! state machine can be exercised against the in-memory double as well as
//! Postgres.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;

use crate::schema::{EmaObservation, PricePoint, SeriesKey};

/// Storage errors shared by all backends.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read-only access to the upstream daily price relation.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Full reload of one instrument's daily history, ascending by date.
    async fn load_daily_history(&self, instrument_id: &str) -> StorageResult<Vec<PricePoint>>;

    /// Distinct instruments present in the price relation.
    async fn list_instruments(&self) -> StorageResult<Vec<String>>;
}

/// Per-key last-emitted-timestamp tracking.
///
/// Watermarks only ever advance. A key without a watermark backfills fully
/// on its own; adding new timeframes or periods never blocks or resets
/// progress on existing keys.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn read(&self, instrument_id: &str, key: &SeriesKey) -> StorageResult<Option<NaiveDate>>;

    /// All watermarks for one instrument, for batch efficiency.
    async fn read_all(&self, instrument_id: &str) -> StorageResult<HashMap<SeriesKey, NaiveDate>>;

    /// Monotonic write: a timestamp at or below the stored watermark leaves
    /// it unchanged.
    async fn write(&self, instrument_id: &str, key: &SeriesKey, ts: NaiveDate) -> StorageResult<()>;

    /// Remove watermarks for the given keys (full-refresh support).
    /// Returns the number of watermarks removed.
    async fn clear(&self, instrument_id: &str, keys: &[SeriesKey]) -> StorageResult<u64>;
}

/// Persistence sink for computed observation rows.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Insert rows for one key (ascending timestamp order) and advance that
    /// key's watermark to the batch maximum, atomically. Primary-key
    /// conflicts are skipped as already-processed. Returns the number of
    /// rows actually inserted; an empty batch leaves the watermark
    /// untouched.
    async fn insert_and_advance(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        rows: &[EmaObservation],
    ) -> StorageResult<usize>;

    /// Stored row at exactly (key, ts), if any.
    async fn find_observation(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        ts: NaiveDate,
    ) -> StorageResult<Option<EmaObservation>>;

    /// Replace a stored row's value and classification columns in place.
    ///
    /// Used when a period closes and the previous run's trailing row
    /// settles from preview to canonical.
    async fn update_observation(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        row: &EmaObservation,
    ) -> StorageResult<()>;
}
