//! Series computation pipeline
//!
//! Pure functions from one instrument's daily history to the full
//! theoretical output for one (timeframe, period, kind) key: the decay
//! recurrence, canonical classification, difference series, and the
//! seeding gate. The coordinator diffs this output against the stored
//! watermark; nothing here touches storage.

mod classifier;
mod computer;
mod gate;

pub use classifier::{canonical_flags, derivatives, SeriesDerivatives};
pub use computer::{alpha, compute_series};
pub use gate::first_emittable_index;

use crate::schema::{EmaObservation, PricePoint, SeriesKind};
use crate::timeframe::TimeframeDefinition;

/// Build the full theoretical output series for one key.
///
/// `prices` must be time-ordered with strictly increasing timestamps.
/// Differences are computed over the whole series before gating, so the
/// first emitted row already carries the derivatives its position implies.
/// Returns rows in ascending timestamp order; an empty vector means the
/// key's history is below its seeding threshold.
pub fn build_observations(
    prices: &[PricePoint],
    timeframe: &TimeframeDefinition,
    period: u32,
    kind: SeriesKind,
) -> Vec<EmaObservation> {
    if prices.is_empty() {
        return Vec::new();
    }

    let dates: Vec<_> = prices.iter().map(|p| p.ts).collect();
    let closes: Vec<_> = prices.iter().map(|p| p.close).collect();

    let canonical = canonical_flags(&dates, timeframe);
    let values = compute_series(&closes, &canonical, timeframe.bucket_days, period, kind);
    let derivs = derivatives(&values, &canonical);

    let Some(start) = first_emittable_index(
        prices.len(),
        &canonical,
        timeframe.bucket_days,
        period,
        kind,
    ) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(prices.len() - start);
    for i in start..prices.len() {
        let Some(value) = values[i] else { continue };
        out.push(EmaObservation {
            instrument_id: prices[i].instrument_id.clone(),
            ts: prices[i].ts,
            timeframe_label: timeframe.label.clone(),
            period,
            kind,
            value,
            bucket_days: timeframe.bucket_days,
            is_preview: !canonical[i],
            first_difference: derivs.first[i],
            second_difference: derivs.second[i],
            first_difference_canonical: derivs.first_canonical[i],
            second_difference_canonical: derivs.second_canonical[i],
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;

    fn daily_prices(start_close: i64, n: usize) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| PricePoint {
                instrument_id: "TEST".to_string(),
                ts: start + Duration::days(i as i64),
                close: Decimal::from(start_close + i as i64),
            })
            .collect()
    }

    #[test]
    fn test_reference_scenario_closes_100_to_109() {
        // Daily closes [100..109], bucket_days=2, period=3 (horizon=6):
        // first emitted row is the 6th observation (index 5), exactly 5 rows
        // emitted, canonical rows at indices 1,3,5,7,9.
        let prices = daily_prices(100, 10);
        let tf = TimeframeDefinition::fixed("2d", 2);

        let rows = build_observations(&prices, &tf, 3, SeriesKind::Recursive);

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].ts, prices[5].ts);
        assert_eq!(rows.last().unwrap().ts, prices[9].ts);

        // Indices 5,7,9 are canonical; 6,8 are previews.
        assert!(!rows[0].is_preview);
        assert!(rows[1].is_preview);
        assert!(!rows[2].is_preview);
        assert!(rows[3].is_preview);
        assert!(!rows[4].is_preview);

        // Seeded from the first raw close, recursing forward with alpha=2/7.
        let a = Decimal::TWO / Decimal::from(7u32);
        let mut expected = prices[0].close;
        for p in &prices[1..=5] {
            expected = p.close * a + expected * (Decimal::ONE - a);
        }
        assert_eq!(rows[0].value, expected);
    }

    #[test]
    fn test_emitted_row_count_property() {
        // count = max(n - horizon + 1, 0)
        let tf = TimeframeDefinition::fixed("3d", 3);
        for n in [0usize, 5, 6, 7, 20] {
            let prices = daily_prices(100, n);
            let rows = build_observations(&prices, &tf, 2, SeriesKind::Recursive);
            let horizon = 6usize;
            let expected = n.saturating_sub(horizon - 1).min(n);
            assert_eq!(rows.len(), expected, "n = {}", n);
        }
    }

    #[test]
    fn test_insufficient_history_emits_nothing() {
        let prices = daily_prices(100, 5);
        let tf = TimeframeDefinition::fixed("2d", 2);
        let rows = build_observations(&prices, &tf, 3, SeriesKind::Recursive);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_timestamps_strictly_increasing() {
        let prices = daily_prices(50, 30);
        let tf = TimeframeDefinition::fixed("2d", 2);
        let rows = build_observations(&prices, &tf, 3, SeriesKind::Recursive);

        for pair in rows.windows(2) {
            assert!(pair[0].ts < pair[1].ts);
        }
    }

    #[test]
    fn test_one_canonical_row_per_bucket() {
        let prices = daily_prices(100, 20);
        let tf = TimeframeDefinition::fixed("4d", 4);
        let rows = build_observations(&prices, &tf, 1, SeriesKind::Recursive);

        let canonical: Vec<&EmaObservation> = rows.iter().filter(|r| !r.is_preview).collect();
        // Buckets close at indices 3,7,11,15,19; gate starts at index 3.
        assert_eq!(canonical.len(), 5);
    }

    #[test]
    fn test_canonical_derivative_nullability_on_emitted_rows() {
        let prices = daily_prices(100, 10);
        let tf = TimeframeDefinition::fixed("2d", 2);
        let rows = build_observations(&prices, &tf, 3, SeriesKind::Recursive);

        for row in &rows {
            if row.is_preview {
                assert!(row.first_difference_canonical.is_none());
                assert!(row.second_difference_canonical.is_none());
            } else {
                // Emission starts at the third canonical position, so both
                // canonical differences are populated on every canonical row.
                assert!(row.first_difference_canonical.is_some());
                assert!(row.second_difference_canonical.is_some());
            }
            // Full-series differences are defined on every emitted row here.
            assert!(row.first_difference.is_some());
            assert!(row.second_difference.is_some());
        }
    }

    #[test]
    fn test_anchored_pipeline_gates_on_canonical_count() {
        let prices = daily_prices(100, 12);
        let tf = TimeframeDefinition::fixed("2d", 2);
        let rows = build_observations(&prices, &tf, 3, SeriesKind::Anchored);

        // Third canonical close is at index 5.
        assert_eq!(rows.first().map(|r| r.ts), Some(prices[5].ts));
        assert!(rows.iter().all(|r| r.ts >= prices[5].ts));

        // Seed equals the mean of the first three canonical closes.
        let seed = (prices[1].close + prices[3].close + prices[5].close) / Decimal::from(3u32);
        assert_eq!(rows[0].value, seed);
    }

    #[test]
    fn test_empty_history() {
        let tf = TimeframeDefinition::fixed("2d", 2);
        assert!(build_observations(&[], &tf, 3, SeriesKind::Recursive).is_empty());
    }
}
