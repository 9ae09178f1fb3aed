//! Domain types shared across the engine
//!
//! Defines the price input, observation output, and watermark records,
//! plus the composite keys the storage layer and coordinator agree on.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single daily closing price for one instrument.
///
/// Upstream-owned and read-only; the engine never writes this relation.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub instrument_id: String,
    pub ts: NaiveDate,
    pub close: Decimal,
}

/// Which seeding policy produced a series.
///
/// The two policies yield different early-window values and are persisted
/// side by side under distinct keys rather than collapsed to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    /// Seed from the first raw close, recurse over every daily row.
    Recursive,
    /// Seed from the mean of the first `period` canonical bucket closes,
    /// recurse on canonical closes only.
    Anchored,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Recursive => "recursive",
            SeriesKind::Anchored => "anchored",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "recursive" => Some(SeriesKind::Recursive),
            "anchored" => Some(SeriesKind::Anchored),
            _ => None,
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-instrument output key: one smoothed series per (timeframe, period, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub timeframe_label: String,
    pub period: u32,
    pub kind: SeriesKind,
}

impl SeriesKey {
    pub fn new(timeframe_label: impl Into<String>, period: u32, kind: SeriesKind) -> Self {
        Self {
            timeframe_label: timeframe_label.into(),
            period,
            kind,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.timeframe_label, self.period, self.kind)
    }
}

/// One row of the smoothed output series.
///
/// The composite primary key is (instrument_id, ts, timeframe_label, period,
/// series_kind); inserts against an existing key are skipped as
/// already-processed.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaObservation {
    pub instrument_id: String,
    pub ts: NaiveDate,
    pub timeframe_label: String,
    pub period: u32,
    pub kind: SeriesKind,
    pub value: Decimal,
    pub bucket_days: u32,
    /// Interior row of a still-forming bucket, as opposed to a bucket close.
    pub is_preview: bool,
    pub first_difference: Option<Decimal>,
    pub second_difference: Option<Decimal>,
    pub first_difference_canonical: Option<Decimal>,
    pub second_difference_canonical: Option<Decimal>,
}

impl EmaObservation {
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(self.timeframe_label.clone(), self.period, self.kind)
    }
}

/// Last timestamp successfully persisted for one output key.
///
/// Enables resumable, non-duplicating incremental refresh; only ever
/// advances, never regresses.
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub instrument_id: String,
    pub key: SeriesKey,
    pub last_emitted_ts: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_kind_roundtrip() {
        assert_eq!(SeriesKind::from_str("recursive"), Some(SeriesKind::Recursive));
        assert_eq!(SeriesKind::from_str("anchored"), Some(SeriesKind::Anchored));
        assert_eq!(SeriesKind::from_str("bogus"), None);
        assert_eq!(SeriesKind::Anchored.as_str(), "anchored");
    }

    #[test]
    fn test_series_key_display() {
        let key = SeriesKey::new("2d", 3, SeriesKind::Recursive);
        assert_eq!(key.to_string(), "2d/3/recursive");
    }
}
