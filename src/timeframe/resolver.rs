//! Timeframe universe resolution
//!
//! Loads the timeframe dimension once per run into an explicitly
//! constructed cache, then resolves filtered, stably-sorted universes from
//! it. Lookups are exact; malformed dimension rows are skipped with a
//! warning at load time rather than failing the run.

use parking_lot::RwLock;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use super::definition::{AlignmentType, CalendarScheme, TimeframeDefinition};

/// Resolution errors. All variants are fatal configuration problems.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ResolverError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No timeframes resolve for the requested filter")]
    NoTimeframes,

    #[error("{resolved} timeframe(s) resolved but none carry a valid bucket size")]
    MissingBucketSize { resolved: usize },
}

pub type ResolverResult<T> = Result<T, ResolverError>;

/// Dimension entry as loaded, before bucket-size validation.
#[derive(Debug, Clone)]
struct CachedTimeframe {
    label: String,
    bucket_days: Option<u32>,
    alignment: AlignmentType,
    scheme: Option<CalendarScheme>,
    allow_partial_start: bool,
    allow_partial_end: bool,
    canonical: bool,
}

/// Process-wide timeframe metadata, constructed explicitly and passed by
/// reference.
///
/// Load once per run with [`TimeframeCache::load`]; tests and per-run
/// overrides construct one with [`TimeframeCache::from_definitions`].
/// `reload` replaces the contents in place for long-lived processes.
pub struct TimeframeCache {
    entries: RwLock<Vec<CachedTimeframe>>,
}

impl TimeframeCache {
    /// Empty cache; every resolve fails until loaded.
    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Build a cache from already-validated definitions (tests, overrides).
    pub fn from_definitions(defs: Vec<TimeframeDefinition>) -> Self {
        let entries = defs
            .into_iter()
            .map(|d| CachedTimeframe {
                label: d.label,
                bucket_days: Some(d.bucket_days),
                alignment: d.alignment,
                scheme: d.scheme,
                allow_partial_start: d.allow_partial_start,
                allow_partial_end: d.allow_partial_end,
                canonical: d.canonical,
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Load the timeframe dimension from the database.
    pub async fn load(pool: &PgPool) -> ResolverResult<Self> {
        let cache = Self::empty();
        cache.reload(pool).await?;
        Ok(cache)
    }

    /// Replace cached contents from the database.
    pub async fn reload(&self, pool: &PgPool) -> ResolverResult<()> {
        let rows = sqlx::query(
            r#"
            SELECT label, bucket_days, alignment_type, calendar_scheme,
                   allow_partial_start, allow_partial_end, is_canonical
            FROM timeframes
            ORDER BY label
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let label: String = row.get("label");

            let alignment_str: String = row.get("alignment_type");
            let alignment = match AlignmentType::from_str(&alignment_str) {
                Some(a) => a,
                None => {
                    warn!(
                        "Skipping timeframe '{}': unknown alignment type '{}'",
                        label, alignment_str
                    );
                    continue;
                }
            };

            let scheme_str: Option<String> = row.get("calendar_scheme");
            let scheme = match (&alignment, scheme_str.as_deref()) {
                (AlignmentType::Fixed, _) => None,
                (AlignmentType::Calendar, Some(s)) => match CalendarScheme::from_str(s) {
                    Some(scheme) => Some(scheme),
                    None => {
                        warn!("Skipping timeframe '{}': unknown calendar scheme '{}'", label, s);
                        continue;
                    }
                },
                (AlignmentType::Calendar, None) => {
                    warn!("Skipping timeframe '{}': calendar alignment without a scheme", label);
                    continue;
                }
            };

            let bucket_days: Option<i32> = row.get("bucket_days");
            let bucket_days = bucket_days.and_then(|b| u32::try_from(b).ok()).filter(|b| *b > 0);

            entries.push(CachedTimeframe {
                label,
                bucket_days,
                alignment,
                scheme,
                allow_partial_start: row.get("allow_partial_start"),
                allow_partial_end: row.get("allow_partial_end"),
                canonical: row.get("is_canonical"),
            });
        }

        debug!("Loaded {} timeframe dimension entries", entries.len());
        *self.entries.write() = entries;
        Ok(())
    }

    /// Resolve the timeframe universe for a run.
    ///
    /// `family` restricts to one alignment convention; `canonical_only`
    /// drops entries not flagged canonical in the dimension. The result is
    /// deterministic and stably sorted by (bucket_days, label).
    pub fn resolve(
        &self,
        family: Option<AlignmentType>,
        canonical_only: bool,
    ) -> ResolverResult<Vec<TimeframeDefinition>> {
        let entries = self.entries.read();

        let matched: Vec<&CachedTimeframe> = entries
            .iter()
            .filter(|e| family.map_or(true, |f| e.alignment == f))
            .filter(|e| !canonical_only || e.canonical)
            .collect();

        if matched.is_empty() {
            return Err(ResolverError::NoTimeframes);
        }

        let mut resolved: Vec<TimeframeDefinition> = Vec::with_capacity(matched.len());
        for entry in &matched {
            match entry.bucket_days {
                Some(bucket_days) => resolved.push(TimeframeDefinition {
                    label: entry.label.clone(),
                    bucket_days,
                    alignment: entry.alignment,
                    scheme: entry.scheme,
                    allow_partial_start: entry.allow_partial_start,
                    allow_partial_end: entry.allow_partial_end,
                    canonical: entry.canonical,
                }),
                None => {
                    warn!("Timeframe '{}' has no valid bucket size, skipping", entry.label);
                }
            }
        }

        if resolved.is_empty() {
            return Err(ResolverError::MissingBucketSize {
                resolved: matched.len(),
            });
        }

        resolved.sort_by(|a, b| a.bucket_days.cmp(&b.bucket_days).then_with(|| a.label.cmp(&b.label)));
        Ok(resolved)
    }

    /// Stable label -> bucket_days view of a resolved universe.
    pub fn bucket_sizes(
        &self,
        family: Option<AlignmentType>,
        canonical_only: bool,
    ) -> ResolverResult<BTreeMap<String, u32>> {
        Ok(self
            .resolve(family, canonical_only)?
            .into_iter()
            .map(|d| (d.label, d.bucket_days))
            .collect())
    }

    /// Number of cached dimension entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(defs: Vec<TimeframeDefinition>) -> TimeframeCache {
        TimeframeCache::from_definitions(defs)
    }

    #[test]
    fn test_resolve_sorted_by_bucket_then_label() {
        let cache = cache_with(vec![
            TimeframeDefinition::fixed("5d", 5),
            TimeframeDefinition::fixed("2d", 2),
            TimeframeDefinition::fixed("1w", 5),
        ]);

        let resolved = cache.resolve(Some(AlignmentType::Fixed), true).unwrap();
        let labels: Vec<&str> = resolved.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["2d", "1w", "5d"]);
    }

    #[test]
    fn test_resolve_filters_alignment_family() {
        let cache = cache_with(vec![
            TimeframeDefinition::fixed("2d", 2),
            TimeframeDefinition::calendar("1m-cal", 21, CalendarScheme::Month),
        ]);

        let fixed = cache.resolve(Some(AlignmentType::Fixed), true).unwrap();
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].label, "2d");

        let calendar = cache.resolve(Some(AlignmentType::Calendar), true).unwrap();
        assert_eq!(calendar.len(), 1);
        assert_eq!(calendar[0].label, "1m-cal");

        let all = cache.resolve(None, true).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_resolve_canonical_only() {
        let mut non_canonical = TimeframeDefinition::fixed("3d", 3);
        non_canonical.canonical = false;

        let cache = cache_with(vec![TimeframeDefinition::fixed("2d", 2), non_canonical]);

        let canonical = cache.resolve(None, true).unwrap();
        assert_eq!(canonical.len(), 1);

        let all = cache.resolve(None, false).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_empty_universe_is_configuration_error() {
        let cache = cache_with(vec![TimeframeDefinition::fixed("2d", 2)]);
        let err = cache.resolve(Some(AlignmentType::Calendar), true).unwrap_err();
        assert!(matches!(err, ResolverError::NoTimeframes));

        let empty = TimeframeCache::empty();
        assert!(matches!(empty.resolve(None, false), Err(ResolverError::NoTimeframes)));
    }

    #[test]
    fn test_missing_bucket_size_is_configuration_error() {
        let cache = TimeframeCache {
            entries: RwLock::new(vec![CachedTimeframe {
                label: "broken".to_string(),
                bucket_days: None,
                alignment: AlignmentType::Fixed,
                scheme: None,
                allow_partial_start: false,
                allow_partial_end: true,
                canonical: true,
            }]),
        };

        let err = cache.resolve(None, false).unwrap_err();
        assert!(matches!(err, ResolverError::MissingBucketSize { resolved: 1 }));
    }

    #[test]
    fn test_bucket_sizes_view() {
        let cache = cache_with(vec![
            TimeframeDefinition::fixed("2d", 2),
            TimeframeDefinition::fixed("5d", 5),
        ]);

        let sizes = cache.bucket_sizes(None, true).unwrap();
        assert_eq!(sizes.get("2d"), Some(&2));
        assert_eq!(sizes.get("5d"), Some(&5));
    }
}
