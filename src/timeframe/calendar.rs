//! Calendar-period arithmetic
//!
//! Maps dates to the calendar period they belong to, under each supported
//! scheme. Two dates share a bucket iff they share a period start.

use chrono::{Datelike, Duration, NaiveDate};

use super::definition::CalendarScheme;

/// First calendar day of the period containing `date`.
///
/// Serves as the bucket identity: rows whose period starts differ belong to
/// different buckets.
pub fn period_start(scheme: CalendarScheme, date: NaiveDate) -> NaiveDate {
    match scheme {
        CalendarScheme::IsoWeek => {
            date - Duration::days(date.weekday().num_days_from_monday() as i64)
        }
        CalendarScheme::UsWeek => {
            date - Duration::days(date.weekday().num_days_from_sunday() as i64)
        }
        CalendarScheme::Month => {
            // First of the month always exists
            NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap()
        }
        CalendarScheme::Quarter => {
            let quarter_month = ((date.month() - 1) / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), quarter_month, 1).unwrap()
        }
        CalendarScheme::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap(),
    }
}

/// Whether two dates fall in the same calendar period.
pub fn same_period(scheme: CalendarScheme, a: NaiveDate, b: NaiveDate) -> bool {
    period_start(scheme, a) == period_start(scheme, b)
}
