//! Minimum-history seeding gate
//!
//! Suppresses emission until enough history exists for a key. No
//! placeholder rows: gated rows are dropped entirely, and a key whose
//! history never reaches its threshold emits nothing.

use crate::schema::SeriesKind;

/// 0-based index of the first emittable row for a key, or `None` when the
/// available history is insufficient.
///
/// Recursive policy: with `horizon_days = bucket_days * period`, the first
/// `horizon_days - 1` rows are dropped, so the first emitted row is the
/// `horizon_days`-th daily observation.
///
/// Anchored policy: nothing emits before the row bearing the `period`-th
/// canonical close.
pub fn first_emittable_index(
    n_rows: usize,
    canonical: &[bool],
    bucket_days: u32,
    period: u32,
    kind: SeriesKind,
) -> Option<usize> {
    match kind {
        SeriesKind::Recursive => {
            let horizon = (bucket_days * period) as usize;
            if n_rows < horizon {
                None
            } else {
                Some(horizon - 1)
            }
        }
        SeriesKind::Anchored => {
            let mut seen = 0u32;
            for (i, &flag) in canonical.iter().enumerate() {
                if flag {
                    seen += 1;
                    if seen == period {
                        return Some(i);
                    }
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursive_gate_drops_horizon_minus_one_rows() {
        // bucket_days=2, period=3, horizon=6: first emitted row is the 6th
        // observation, index 5.
        let canonical: Vec<bool> = (0..10).map(|r| (r + 1) % 2 == 0).collect();
        let start = first_emittable_index(10, &canonical, 2, 3, SeriesKind::Recursive);
        assert_eq!(start, Some(5));
    }

    #[test]
    fn test_recursive_gate_exact_horizon() {
        let canonical = vec![false; 6];
        assert_eq!(
            first_emittable_index(6, &canonical, 2, 3, SeriesKind::Recursive),
            Some(5)
        );
    }

    #[test]
    fn test_recursive_gate_insufficient_history() {
        let canonical = vec![false; 5];
        assert_eq!(
            first_emittable_index(5, &canonical, 2, 3, SeriesKind::Recursive),
            None
        );
    }

    #[test]
    fn test_anchored_gate_waits_for_nth_canonical_close() {
        let canonical = vec![false, true, false, true, false, true];
        assert_eq!(
            first_emittable_index(6, &canonical, 2, 2, SeriesKind::Anchored),
            Some(3)
        );
        assert_eq!(
            first_emittable_index(6, &canonical, 2, 3, SeriesKind::Anchored),
            Some(5)
        );
    }

    #[test]
    fn test_anchored_gate_insufficient_canonical_closes() {
        let canonical = vec![false, true, false];
        assert_eq!(
            first_emittable_index(3, &canonical, 2, 2, SeriesKind::Anchored),
            None
        );
    }

    #[test]
    fn test_gate_independent_of_other_keys() {
        // Same history length gates differently per (bucket_days, period).
        let canonical_2d: Vec<bool> = (0..8).map(|r| (r + 1) % 2 == 0).collect();
        assert_eq!(
            first_emittable_index(8, &canonical_2d, 2, 2, SeriesKind::Recursive),
            Some(3)
        );
        assert_eq!(
            first_emittable_index(8, &canonical_2d, 2, 4, SeriesKind::Recursive),
            Some(7)
        );
        assert_eq!(
            first_emittable_index(8, &canonical_2d, 2, 5, SeriesKind::Recursive),
            None
        );
    }
}
