//! Canonical-vs-preview row classification and difference series
//!
//! A canonical row marks the close of a timeframe bucket; every other row
//! previews a still-forming bucket. Differences come in two families: the
//! full-series first/second differences defined across every valued row,
//! and canonical-only differences defined across the canonical subsequence
//! and null everywhere else.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::timeframe::{calendar, AlignmentType, TimeframeDefinition};

/// Classify each row of a date-ordered daily series as canonical or preview.
///
/// Fixed alignment: row at 0-based index r is canonical iff
/// `(r + 1) % bucket_days == 0`.
///
/// Calendar alignment: a row is canonical iff it is the last trading day of
/// its calendar period, i.e. the next row falls in a different period. The
/// dataset's leading (possibly partial) period only closes a bucket when
/// `allow_partial_start` is set, and the trailing still-forming period only
/// closes one when `allow_partial_end` is set.
pub fn canonical_flags(dates: &[NaiveDate], timeframe: &TimeframeDefinition) -> Vec<bool> {
    match timeframe.alignment {
        AlignmentType::Fixed => {
            let bucket = timeframe.bucket_days as usize;
            (0..dates.len()).map(|r| (r + 1) % bucket == 0).collect()
        }
        AlignmentType::Calendar => {
            let scheme = match timeframe.scheme {
                Some(s) => s,
                // Resolver guarantees calendar entries carry a scheme;
                // classify everything as preview if one slips through.
                None => return vec![false; dates.len()],
            };

            let n = dates.len();
            let mut flags: Vec<bool> = (0..n)
                .map(|i| {
                    if i + 1 < n {
                        !calendar::same_period(scheme, dates[i], dates[i + 1])
                    } else {
                        timeframe.allow_partial_end
                    }
                })
                .collect();

            if !timeframe.allow_partial_start && n > 0 {
                let first_period = calendar::period_start(scheme, dates[0]);
                for (i, &d) in dates.iter().enumerate() {
                    if calendar::period_start(scheme, d) != first_period {
                        break;
                    }
                    flags[i] = false;
                }
            }

            flags
        }
    }
}

/// First and second differences over a computed series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesDerivatives {
    pub first: Vec<Option<Decimal>>,
    pub second: Vec<Option<Decimal>>,
    pub first_canonical: Vec<Option<Decimal>>,
    pub second_canonical: Vec<Option<Decimal>>,
}

/// Compute both difference families for a series.
///
/// Full-series differences are defined on every valued row with enough
/// predecessors; canonical differences diff across the canonical valued
/// subsequence only and stay null on preview rows. The canonical first
/// difference is non-null exactly from the second canonical observation
/// onwards, the second difference from the third.
pub fn derivatives(values: &[Option<Decimal>], canonical: &[bool]) -> SeriesDerivatives {
    let n = values.len();
    let mut first = vec![None; n];
    let mut second = vec![None; n];
    let mut first_canonical = vec![None; n];
    let mut second_canonical = vec![None; n];

    let mut prev_value: Option<Decimal> = None;
    let mut prev_first: Option<Decimal> = None;
    let mut prev_canon_value: Option<Decimal> = None;
    let mut prev_canon_first: Option<Decimal> = None;

    for i in 0..n {
        let Some(value) = values[i] else { continue };

        if let Some(prev) = prev_value {
            let d1 = value - prev;
            first[i] = Some(d1);
            if let Some(pd1) = prev_first {
                second[i] = Some(d1 - pd1);
            }
            prev_first = Some(d1);
        }
        prev_value = Some(value);

        if canonical[i] {
            if let Some(prev) = prev_canon_value {
                let d1 = value - prev;
                first_canonical[i] = Some(d1);
                if let Some(pd1) = prev_canon_first {
                    second_canonical[i] = Some(d1 - pd1);
                }
                prev_canon_first = Some(d1);
            }
            prev_canon_value = Some(value);
        }
    }

    SeriesDerivatives {
        first,
        second,
        first_canonical,
        second_canonical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeframe::CalendarScheme;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn consecutive_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_fixed_day_canonical_positions() {
        let tf = TimeframeDefinition::fixed("2d", 2);
        let dates = consecutive_days(d(2024, 1, 1), 10);
        let flags = canonical_flags(&dates, &tf);

        for (r, flag) in flags.iter().enumerate() {
            assert_eq!(*flag, (r + 1) % 2 == 0, "index {}", r);
        }
        let canonical: Vec<usize> = flags
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.then_some(i))
            .collect();
        assert_eq!(canonical, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_calendar_week_canonical_is_last_trading_day() {
        let mut tf = TimeframeDefinition::calendar("1w-cal", 5, CalendarScheme::IsoWeek);
        tf.allow_partial_start = true;

        // Mon 2024-01-01 .. Fri 2024-01-05, Mon 2024-01-08 .. Wed 2024-01-10
        let mut dates = consecutive_days(d(2024, 1, 1), 5);
        dates.extend(consecutive_days(d(2024, 1, 8), 3));

        let flags = canonical_flags(&dates, &tf);
        // Friday closes the first week; the trailing Wednesday is preview.
        assert_eq!(flags, vec![false, false, false, false, true, false, false, false]);
    }

    #[test]
    fn test_calendar_partial_end_flag() {
        let mut tf = TimeframeDefinition::calendar("1w-cal", 5, CalendarScheme::IsoWeek);
        tf.allow_partial_start = true;
        tf.allow_partial_end = true;

        let mut dates = consecutive_days(d(2024, 1, 1), 5);
        dates.extend(consecutive_days(d(2024, 1, 8), 3));

        let flags = canonical_flags(&dates, &tf);
        assert!(flags[4]);
        assert!(flags[7], "partial trailing bucket closes when allowed");
    }

    #[test]
    fn test_calendar_partial_start_suppressed() {
        // Series starts mid-week on Wednesday; first week's Friday must not
        // close a bucket unless partial starts are allowed.
        let tf = TimeframeDefinition::calendar("1w-cal", 5, CalendarScheme::IsoWeek);
        let mut dates = consecutive_days(d(2024, 1, 3), 3); // Wed..Fri
        dates.extend(consecutive_days(d(2024, 1, 8), 5)); // Mon..Fri
        dates.extend(consecutive_days(d(2024, 1, 15), 1)); // next Mon

        let flags = canonical_flags(&dates, &tf);
        assert_eq!(flags[2], false, "partial first week suppressed");
        assert_eq!(flags[7], true, "first complete week closes normally");
        assert_eq!(flags[8], false, "trailing still-forming week is preview");
    }

    #[test]
    fn test_month_scheme_boundaries() {
        let mut tf = TimeframeDefinition::calendar("1mo-cal", 21, CalendarScheme::Month);
        tf.allow_partial_start = true;

        let dates = vec![d(2024, 1, 30), d(2024, 1, 31), d(2024, 2, 1), d(2024, 2, 2)];
        let flags = canonical_flags(&dates, &tf);
        assert_eq!(flags, vec![false, true, false, false]);
    }

    #[test]
    fn test_full_series_derivatives() {
        let values: Vec<Option<Decimal>> =
            vec![Some(dec!(10)), Some(dec!(12)), Some(dec!(15)), Some(dec!(14))];
        let canonical = vec![false, true, false, true];

        let derivs = derivatives(&values, &canonical);

        assert_eq!(derivs.first, vec![None, Some(dec!(2)), Some(dec!(3)), Some(dec!(-1))]);
        assert_eq!(derivs.second, vec![None, None, Some(dec!(1)), Some(dec!(-4))]);
    }

    #[test]
    fn test_canonical_derivatives_null_on_preview_rows() {
        let values: Vec<Option<Decimal>> = vec![
            Some(dec!(10)),
            Some(dec!(12)),
            Some(dec!(15)),
            Some(dec!(14)),
            Some(dec!(18)),
            Some(dec!(20)),
        ];
        let canonical = vec![false, true, false, true, false, true];

        let derivs = derivatives(&values, &canonical);

        // Preview rows never carry canonical differences.
        for i in [0usize, 2, 4] {
            assert_eq!(derivs.first_canonical[i], None);
            assert_eq!(derivs.second_canonical[i], None);
        }
        // First canonical row has no predecessor.
        assert_eq!(derivs.first_canonical[1], None);
        // Second canonical observation: first difference appears.
        assert_eq!(derivs.first_canonical[3], Some(dec!(2)));
        assert_eq!(derivs.second_canonical[3], None);
        // Third canonical observation: second difference appears.
        assert_eq!(derivs.first_canonical[5], Some(dec!(6)));
        assert_eq!(derivs.second_canonical[5], Some(dec!(4)));
    }

    #[test]
    fn test_derivatives_skip_unvalued_prefix() {
        let values: Vec<Option<Decimal>> = vec![None, None, Some(dec!(10)), Some(dec!(13))];
        let canonical = vec![false, true, false, true];

        let derivs = derivatives(&values, &canonical);

        assert_eq!(derivs.first[2], None);
        assert_eq!(derivs.first[3], Some(dec!(3)));
        // Canonical row at index 1 carries no value, so the canonical chain
        // starts at index 3.
        assert_eq!(derivs.first_canonical[3], None);
    }
}
