//! The decay recurrence
//!
//! Pure, deterministic smoothing of one instrument's daily closes. The
//! incremental contract depends on determinism: recompute-all followed by
//! keep-only-new must be equivalent to a true incremental recurrence, so
//! identical inputs must always yield identical outputs. `Decimal`
//! arithmetic keeps the recurrence exactly reproducible across runs.

use rust_decimal::Decimal;

use crate::schema::SeriesKind;

/// Smoothing factor `alpha = 2 / (horizon + 1)` for
/// `horizon = bucket_days * period`.
pub fn alpha(bucket_days: u32, period: u32) -> Decimal {
    let horizon = bucket_days * period;
    Decimal::TWO / Decimal::from(horizon + 1)
}

/// Compute one decayed value per input row.
///
/// `canonical` must be the classification of the same rows (only consulted
/// by the anchored policy). Rows that cannot carry a value yet under the
/// anchored policy are `None`; the recursive policy values every row.
///
/// Recursive: seed from the first raw close, then
/// `v[i] = close[i] * alpha + v[i-1] * (1 - alpha)` across every row.
///
/// Anchored: seed at the `period`-th canonical close with the arithmetic
/// mean of the first `period` canonical closes, then recurse on canonical
/// closes only; interior rows recurse from the latest canonical value
/// without advancing it.
pub fn compute_series(
    closes: &[Decimal],
    canonical: &[bool],
    bucket_days: u32,
    period: u32,
    kind: SeriesKind,
) -> Vec<Option<Decimal>> {
    debug_assert_eq!(closes.len(), canonical.len());

    let a = alpha(bucket_days, period);
    let retain = Decimal::ONE - a;

    match kind {
        SeriesKind::Recursive => {
            let mut out = Vec::with_capacity(closes.len());
            let mut prev: Option<Decimal> = None;
            for &close in closes {
                let value = match prev {
                    None => close,
                    Some(p) => close * a + p * retain,
                };
                out.push(Some(value));
                prev = Some(value);
            }
            out
        }
        SeriesKind::Anchored => {
            let period = period as usize;
            let mut out = Vec::with_capacity(closes.len());
            let mut seed_window: Vec<Decimal> = Vec::with_capacity(period);
            let mut latest_canonical: Option<Decimal> = None;

            for (i, &close) in closes.iter().enumerate() {
                if canonical[i] {
                    match latest_canonical {
                        Some(prev) => {
                            let value = close * a + prev * retain;
                            latest_canonical = Some(value);
                            out.push(Some(value));
                        }
                        None => {
                            seed_window.push(close);
                            if seed_window.len() == period {
                                let sum: Decimal = seed_window.iter().sum();
                                let seed = sum / Decimal::from(period as u32);
                                latest_canonical = Some(seed);
                                out.push(Some(seed));
                            } else {
                                out.push(None);
                            }
                        }
                    }
                } else {
                    out.push(latest_canonical.map(|prev| close * a + prev * retain));
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn closes(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn test_alpha() {
        // horizon = 2 * 3 = 6, alpha = 2/7
        assert_eq!(alpha(2, 3), Decimal::TWO / Decimal::from(7u32));
        // horizon = 1 * 9 = 9, alpha = 0.2
        assert_eq!(alpha(1, 9), dec!(0.2));
    }

    #[test]
    fn test_recursive_seeds_from_first_close() {
        let prices = closes(&[100, 110]);
        let canonical = vec![false, true];
        let out = compute_series(&prices, &canonical, 1, 3, SeriesKind::Recursive);

        // alpha = 2/4 = 0.5; v0 = 100, v1 = 110*0.5 + 100*0.5 = 105
        assert_eq!(out, vec![Some(dec!(100)), Some(dec!(105))]);
    }

    #[test]
    fn test_recursive_values_every_row() {
        let prices = closes(&[100, 101, 102, 103, 104, 105, 106, 107, 108, 109]);
        let canonical: Vec<bool> = (0..10).map(|r| (r + 1) % 2 == 0).collect();
        let out = compute_series(&prices, &canonical, 2, 3, SeriesKind::Recursive);

        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|v| v.is_some()));

        // Spot-check the recurrence with alpha = 2/7.
        let a = Decimal::TWO / Decimal::from(7u32);
        let v0 = dec!(100);
        let v1 = dec!(101) * a + v0 * (Decimal::ONE - a);
        assert_eq!(out[1], Some(v1));
    }

    #[test]
    fn test_recursive_is_deterministic() {
        let prices = closes(&[100, 103, 99, 108, 104, 111, 107]);
        let canonical: Vec<bool> = (0..7).map(|r| (r + 1) % 2 == 0).collect();

        let once = compute_series(&prices, &canonical, 2, 2, SeriesKind::Recursive);
        let twice = compute_series(&prices, &canonical, 2, 2, SeriesKind::Recursive);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_anchored_seeds_from_canonical_mean() {
        // bucket_days=2, period=2: canonical rows at indices 1 and 3.
        let prices = closes(&[100, 110, 120, 130, 140, 150]);
        let canonical: Vec<bool> = (0..6).map(|r| (r + 1) % 2 == 0).collect();
        let out = compute_series(&prices, &canonical, 2, 2, SeriesKind::Anchored);

        // Nothing before the second canonical close.
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
        // Seed = mean(110, 130) = 120.
        assert_eq!(out[3], Some(dec!(120)));

        // alpha = 2/(4+1) = 0.4; interior row recurses from the seed.
        let a = dec!(0.4);
        let interior = dec!(140) * a + dec!(120) * (Decimal::ONE - a);
        assert_eq!(out[4], Some(interior));

        // Next canonical close advances the canonical chain from the seed,
        // not from the interior value.
        let canonical_next = dec!(150) * a + dec!(120) * (Decimal::ONE - a);
        assert_eq!(out[5], Some(canonical_next));
    }

    #[test]
    fn test_anchored_interior_rows_do_not_advance_chain() {
        let prices = closes(&[10, 20, 30, 40, 999, 60]);
        let canonical = vec![false, true, false, true, false, true];
        let out = compute_series(&prices, &canonical, 2, 2, SeriesKind::Anchored);

        // Seed at index 3 = mean(20, 40) = 30.
        assert_eq!(out[3], Some(dec!(30)));

        // The spike at index 4 is interior; index 5 must recurse from 30.
        let a = alpha(2, 2);
        let expected = Decimal::from(60u32) * a + dec!(30) * (Decimal::ONE - a);
        assert_eq!(out[5], Some(expected));
    }

    #[test]
    fn test_anchored_insufficient_canonical_closes() {
        let prices = closes(&[100, 110, 120]);
        let canonical = vec![false, true, false];
        let out = compute_series(&prices, &canonical, 2, 2, SeriesKind::Anchored);

        assert!(out.iter().all(|v| v.is_none()));
    }
}
