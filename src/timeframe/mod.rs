//! Timeframe universe: dimension types, calendar arithmetic, and resolution
//!
//! A timeframe maps the daily series onto synthetic bars, either every
//! `bucket_days` rows (fixed alignment) or at calendar-period boundaries
//! (calendar alignment). The resolver turns the cached dimension into the
//! per-run key universe.

pub mod calendar;
mod definition;
mod resolver;

pub use definition::{AlignmentType, CalendarScheme, TimeframeDefinition};
pub use resolver::{ResolverError, ResolverResult, TimeframeCache};
