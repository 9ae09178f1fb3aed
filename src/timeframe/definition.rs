//! Timeframe dimension types
//!
//! A timeframe groups consecutive daily observations into synthetic bars,
//! either by a fixed trading-day count or by calendar-period boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How bucket boundaries are determined for a timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentType {
    /// Every `bucket_days`-th row closes a bucket.
    Fixed,
    /// Buckets close on the last trading day of a calendar period.
    Calendar,
}

impl AlignmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentType::Fixed => "fixed",
            AlignmentType::Calendar => "calendar",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(AlignmentType::Fixed),
            "calendar" => Some(AlignmentType::Calendar),
            _ => None,
        }
    }
}

impl fmt::Display for AlignmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar period used by calendar-aligned timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarScheme {
    /// ISO 8601 week (Monday start).
    IsoWeek,
    /// US convention week (Sunday start).
    UsWeek,
    Month,
    Quarter,
    Year,
}

impl CalendarScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarScheme::IsoWeek => "iso_week",
            CalendarScheme::UsWeek => "us_week",
            CalendarScheme::Month => "month",
            CalendarScheme::Quarter => "quarter",
            CalendarScheme::Year => "year",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "iso_week" => Some(CalendarScheme::IsoWeek),
            "us_week" => Some(CalendarScheme::UsWeek),
            "month" => Some(CalendarScheme::Month),
            "quarter" => Some(CalendarScheme::Quarter),
            "year" => Some(CalendarScheme::Year),
            _ => None,
        }
    }
}

impl fmt::Display for CalendarScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the timeframe dimension.
///
/// Loaded once per run from the configuration relation and cached; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeDefinition {
    pub label: String,
    /// Nominal bucket length in trading days. Also the horizon multiplier
    /// for calendar timeframes (week=5, month=21, quarter=63, year=252).
    pub bucket_days: u32,
    pub alignment: AlignmentType,
    /// Required when `alignment` is `Calendar`.
    pub scheme: Option<CalendarScheme>,
    /// Whether the dataset's possibly-partial first period may close a bucket.
    pub allow_partial_start: bool,
    /// Whether the trailing still-forming period's last row closes a bucket.
    pub allow_partial_end: bool,
    /// Dimension-level flag marking entries that participate in canonical
    /// output; non-canonical entries are filterable at resolution time.
    pub canonical: bool,
}

impl TimeframeDefinition {
    /// Fixed-day timeframe with defaults suitable for tests.
    pub fn fixed(label: impl Into<String>, bucket_days: u32) -> Self {
        Self {
            label: label.into(),
            bucket_days,
            alignment: AlignmentType::Fixed,
            scheme: None,
            allow_partial_start: false,
            allow_partial_end: true,
            canonical: true,
        }
    }

    /// Calendar timeframe with defaults suitable for tests.
    pub fn calendar(label: impl Into<String>, bucket_days: u32, scheme: CalendarScheme) -> Self {
        Self {
            label: label.into(),
            bucket_days,
            alignment: AlignmentType::Calendar,
            scheme: Some(scheme),
            allow_partial_start: false,
            allow_partial_end: false,
            canonical: true,
        }
    }

    /// Averaging window length in underlying daily points for a period.
    pub fn horizon_days(&self, period: u32) -> u32 {
        self.bucket_days * period
    }
}
