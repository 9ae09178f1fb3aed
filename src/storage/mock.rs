//! In-memory storage backend
//!
//! Implements the storage traits over plain maps so coordinator semantics
//! (idempotence, watermark monotonicity, failure isolation) can be tested
//! without a database. Mirrors the Postgres backend's contract exactly:
//! conflict-skip inserts and a monotonic watermark advanced with the batch
//! in one step.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::schema::{EmaObservation, PricePoint, SeriesKey};

use super::traits::{
    ObservationStore, PriceStore, StorageError, StorageResult, WatermarkStore,
};

#[derive(Default)]
struct MemoryState {
    prices: HashMap<String, Vec<PricePoint>>,
    observations: HashMap<(String, SeriesKey), BTreeMap<NaiveDate, EmaObservation>>,
    watermarks: HashMap<(String, SeriesKey), NaiveDate>,
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    /// Instruments whose history load should fail, for failure-isolation
    /// tests.
    failing_instruments: RwLock<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one instrument's daily history (kept sorted by date).
    pub fn set_prices(&self, instrument_id: &str, mut prices: Vec<PricePoint>) {
        prices.sort_by_key(|p| p.ts);
        self.state
            .write()
            .prices
            .insert(instrument_id.to_string(), prices);
    }

    /// Append further history to an instrument.
    pub fn extend_prices(&self, instrument_id: &str, more: Vec<PricePoint>) {
        let mut state = self.state.write();
        let prices = state.prices.entry(instrument_id.to_string()).or_default();
        prices.extend(more);
        prices.sort_by_key(|p| p.ts);
    }

    /// Make `load_daily_history` fail for an instrument.
    pub fn fail_instrument(&self, instrument_id: &str) {
        self.failing_instruments
            .write()
            .push(instrument_id.to_string());
    }

    /// Stored observations for one key, ascending by date.
    pub fn observations(&self, instrument_id: &str, key: &SeriesKey) -> Vec<EmaObservation> {
        self.state
            .read()
            .observations
            .get(&(instrument_id.to_string(), key.clone()))
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total stored observation rows across all keys.
    pub fn total_observations(&self) -> usize {
        self.state
            .read()
            .observations
            .values()
            .map(|m| m.len())
            .sum()
    }

    /// Stored watermark for one key.
    pub fn watermark(&self, instrument_id: &str, key: &SeriesKey) -> Option<NaiveDate> {
        self.state
            .read()
            .watermarks
            .get(&(instrument_id.to_string(), key.clone()))
            .copied()
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn load_daily_history(&self, instrument_id: &str) -> StorageResult<Vec<PricePoint>> {
        if self
            .failing_instruments
            .read()
            .iter()
            .any(|i| i == instrument_id)
        {
            return Err(StorageError::InvalidData(format!(
                "Simulated load failure for {}",
                instrument_id
            )));
        }

        Ok(self
            .state
            .read()
            .prices
            .get(instrument_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_instruments(&self) -> StorageResult<Vec<String>> {
        let mut instruments: Vec<String> = self.state.read().prices.keys().cloned().collect();
        instruments.sort();
        Ok(instruments)
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn read(&self, instrument_id: &str, key: &SeriesKey) -> StorageResult<Option<NaiveDate>> {
        Ok(self.watermark(instrument_id, key))
    }

    async fn read_all(&self, instrument_id: &str) -> StorageResult<HashMap<SeriesKey, NaiveDate>> {
        Ok(self
            .state
            .read()
            .watermarks
            .iter()
            .filter(|((id, _), _)| id == instrument_id)
            .map(|((_, key), ts)| (key.clone(), *ts))
            .collect())
    }

    async fn write(&self, instrument_id: &str, key: &SeriesKey, ts: NaiveDate) -> StorageResult<()> {
        let mut state = self.state.write();
        let entry = state
            .watermarks
            .entry((instrument_id.to_string(), key.clone()))
            .or_insert(ts);
        if ts > *entry {
            *entry = ts;
        }
        Ok(())
    }

    async fn clear(&self, instrument_id: &str, keys: &[SeriesKey]) -> StorageResult<u64> {
        let mut state = self.state.write();
        let mut removed = 0u64;
        for key in keys {
            if state
                .watermarks
                .remove(&(instrument_id.to_string(), key.clone()))
                .is_some()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn insert_and_advance(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        rows: &[EmaObservation],
    ) -> StorageResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let batch_max = rows[rows.len() - 1].ts;
        let mut state = self.state.write();

        let table = state
            .observations
            .entry((instrument_id.to_string(), key.clone()))
            .or_default();

        let mut inserted = 0;
        for row in rows {
            // Conflict-skip, matching ON CONFLICT DO NOTHING.
            if !table.contains_key(&row.ts) {
                table.insert(row.ts, row.clone());
                inserted += 1;
            }
        }

        let entry = state
            .watermarks
            .entry((instrument_id.to_string(), key.clone()))
            .or_insert(batch_max);
        if batch_max > *entry {
            *entry = batch_max;
        }

        Ok(inserted)
    }

    async fn find_observation(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        ts: NaiveDate,
    ) -> StorageResult<Option<EmaObservation>> {
        Ok(self
            .state
            .read()
            .observations
            .get(&(instrument_id.to_string(), key.clone()))
            .and_then(|m| m.get(&ts).cloned()))
    }

    async fn update_observation(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        row: &EmaObservation,
    ) -> StorageResult<()> {
        let mut state = self.state.write();
        let table = state
            .observations
            .entry((instrument_id.to_string(), key.clone()))
            .or_default();
        table.insert(row.ts, row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SeriesKind;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn obs(ts: NaiveDate) -> EmaObservation {
        EmaObservation {
            instrument_id: "TEST".to_string(),
            ts,
            timeframe_label: "2d".to_string(),
            period: 3,
            kind: SeriesKind::Recursive,
            value: dec!(100),
            bucket_days: 2,
            is_preview: false,
            first_difference: None,
            second_difference: None,
            first_difference_canonical: None,
            second_difference_canonical: None,
        }
    }

    fn key() -> SeriesKey {
        SeriesKey::new("2d", 3, SeriesKind::Recursive)
    }

    #[tokio::test]
    async fn test_insert_skips_conflicts() {
        let store = MemoryStore::new();
        let rows = vec![obs(d(1)), obs(d(2))];

        let first = store.insert_and_advance("TEST", &key(), &rows).await.unwrap();
        assert_eq!(first, 2);

        let second = store.insert_and_advance("TEST", &key(), &rows).await.unwrap();
        assert_eq!(second, 0, "re-inserting identical rows inserts nothing");
        assert_eq!(store.total_observations(), 2);
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic() {
        let store = MemoryStore::new();
        store.write("TEST", &key(), d(10)).await.unwrap();
        store.write("TEST", &key(), d(5)).await.unwrap();

        assert_eq!(store.read("TEST", &key()).await.unwrap(), Some(d(10)));

        store.write("TEST", &key(), d(12)).await.unwrap();
        assert_eq!(store.read("TEST", &key()).await.unwrap(), Some(d(12)));
    }

    #[tokio::test]
    async fn test_insert_advances_watermark_to_batch_max() {
        let store = MemoryStore::new();
        let rows = vec![obs(d(1)), obs(d(3))];
        store.insert_and_advance("TEST", &key(), &rows).await.unwrap();

        assert_eq!(store.watermark("TEST", &key()), Some(d(3)));
    }

    #[tokio::test]
    async fn test_empty_batch_leaves_watermark_untouched() {
        let store = MemoryStore::new();
        store.write("TEST", &key(), d(7)).await.unwrap();

        let inserted = store.insert_and_advance("TEST", &key(), &[]).await.unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(store.watermark("TEST", &key()), Some(d(7)));
    }

    #[tokio::test]
    async fn test_update_observation_replaces_in_place() {
        let store = MemoryStore::new();
        store
            .insert_and_advance("TEST", &key(), &[obs(d(1))])
            .await
            .unwrap();

        let mut settled = obs(d(1));
        settled.is_preview = true;
        settled.first_difference_canonical = Some(dec!(2));
        store
            .update_observation("TEST", &key(), &settled)
            .await
            .unwrap();

        assert_eq!(
            store.find_observation("TEST", &key(), d(1)).await.unwrap(),
            Some(settled)
        );
        assert_eq!(store.total_observations(), 1);
    }

    #[tokio::test]
    async fn test_clear_is_per_key() {
        let store = MemoryStore::new();
        let other = SeriesKey::new("5d", 2, SeriesKind::Recursive);
        store.write("TEST", &key(), d(4)).await.unwrap();
        store.write("TEST", &other, d(4)).await.unwrap();

        let removed = store.clear("TEST", &[key()]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.read("TEST", &key()).await.unwrap(), None);
        assert_eq!(store.read("TEST", &other).await.unwrap(), Some(d(4)));
    }
}
