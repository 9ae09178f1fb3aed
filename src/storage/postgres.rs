//! Postgres storage backend
//!
//! Implements the storage traits over sqlx, including schema management
//! for the output relations. Observation inserts and the matching
//! watermark advance run in one transaction per key, so a crash between
//! the two can never produce duplicate canonical rows or lost watermark
//! progress.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseSettings;
use crate::schema::{EmaObservation, PricePoint, SeriesKey, SeriesKind, Watermark};

use super::traits::{
    ObservationStore, PriceStore, StorageError, StorageResult, WatermarkStore,
};

/// Postgres-backed store for prices, observations, and watermarks.
#[derive(Debug)]
pub struct EmaRepository {
    pool: PgPool,
    batch_size: usize,
}

impl EmaRepository {
    /// Create a repository with an existing pool.
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self { pool, batch_size }
    }

    /// Create a repository from settings.
    pub async fn from_settings(settings: &DatabaseSettings) -> StorageResult<Self> {
        if settings.url.is_empty() {
            return Err(StorageError::Configuration(
                "database URL is not set".to_string(),
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&settings.url)
            .await?;

        Ok(Self::new(pool, settings.batch_insert_size))
    }

    /// Get the database pool reference.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the output and dimension relations if they do not exist.
    ///
    /// The daily price relation is upstream-owned; it is created here only
    /// so a fresh development database is runnable end to end.
    pub async fn init_schema(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_prices (
                instrument_id TEXT NOT NULL,
                ts DATE NOT NULL,
                close NUMERIC NOT NULL,
                PRIMARY KEY (instrument_id, ts)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS timeframes (
                label TEXT PRIMARY KEY,
                bucket_days INTEGER,
                alignment_type TEXT NOT NULL,
                calendar_scheme TEXT,
                allow_partial_start BOOLEAN NOT NULL DEFAULT FALSE,
                allow_partial_end BOOLEAN NOT NULL DEFAULT FALSE,
                is_canonical BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ema_observations (
                instrument_id TEXT NOT NULL,
                ts DATE NOT NULL,
                timeframe_label TEXT NOT NULL,
                period INTEGER NOT NULL,
                series_kind TEXT NOT NULL,
                value NUMERIC NOT NULL,
                bucket_days INTEGER NOT NULL,
                is_preview BOOLEAN NOT NULL,
                first_difference NUMERIC,
                second_difference NUMERIC,
                first_difference_canonical NUMERIC,
                second_difference_canonical NUMERIC,
                ingested_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (instrument_id, ts, timeframe_label, period, series_kind)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ema_watermarks (
                instrument_id TEXT NOT NULL,
                timeframe_label TEXT NOT NULL,
                period INTEGER NOT NULL,
                series_kind TEXT NOT NULL,
                last_emitted_ts DATE NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (instrument_id, timeframe_label, period, series_kind)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Schema initialized");
        Ok(())
    }

    /// Idempotently seed the timeframe dimension with the default universe.
    pub async fn seed_default_timeframes(&self) -> StorageResult<u64> {
        let defaults: &[(&str, i32, &str, Option<&str>)] = &[
            ("2d", 2, "fixed", None),
            ("3d", 3, "fixed", None),
            ("5d", 5, "fixed", None),
            ("10d", 10, "fixed", None),
            ("21d", 21, "fixed", None),
            ("1w-iso", 5, "calendar", Some("iso_week")),
            ("1w-us", 5, "calendar", Some("us_week")),
            ("1mo", 21, "calendar", Some("month")),
            ("3mo", 63, "calendar", Some("quarter")),
            ("1y", 252, "calendar", Some("year")),
        ];

        let mut inserted = 0u64;
        for (label, bucket_days, alignment, scheme) in defaults {
            let result = sqlx::query(
                r#"
                INSERT INTO timeframes (label, bucket_days, alignment_type, calendar_scheme)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (label) DO NOTHING
                "#,
            )
            .bind(label)
            .bind(bucket_days)
            .bind(alignment)
            .bind(scheme)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }

        debug!("Seeded {} timeframe dimension entries", inserted);
        Ok(inserted)
    }

    /// Overall output statistics.
    pub async fn get_stats(&self) -> StorageResult<EngineStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_observations,
                COUNT(DISTINCT instrument_id) AS total_instruments,
                MIN(ts) AS earliest_ts,
                MAX(ts) AS latest_ts
            FROM ema_observations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let watermark_row = sqlx::query("SELECT COUNT(*) AS total_watermarks FROM ema_watermarks")
            .fetch_one(&self.pool)
            .await?;

        Ok(EngineStats {
            total_observations: row.get::<i64, _>("total_observations") as u64,
            total_instruments: row.get::<i64, _>("total_instruments") as u64,
            earliest_ts: row.get("earliest_ts"),
            latest_ts: row.get("latest_ts"),
            total_watermarks: watermark_row.get::<i64, _>("total_watermarks") as u64,
        })
    }

    /// Full watermark records for one instrument, for inspection.
    pub async fn list_watermarks(&self, instrument_id: &str) -> StorageResult<Vec<Watermark>> {
        let rows = sqlx::query(
            r#"
            SELECT timeframe_label, period, series_kind, last_emitted_ts, updated_at
            FROM ema_watermarks
            WHERE instrument_id = $1
            ORDER BY timeframe_label, period, series_kind
            "#,
        )
        .bind(instrument_id)
        .fetch_all(&self.pool)
        .await?;

        let mut watermarks = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_str: String = row.get("series_kind");
            let Some(kind) = SeriesKind::from_str(&kind_str) else {
                return Err(StorageError::InvalidData(format!(
                    "Unknown series kind '{}' in watermark row",
                    kind_str
                )));
            };
            watermarks.push(Watermark {
                instrument_id: instrument_id.to_string(),
                key: SeriesKey::new(
                    row.get::<String, _>("timeframe_label"),
                    row.get::<i32, _>("period") as u32,
                    kind,
                ),
                last_emitted_ts: row.get("last_emitted_ts"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(watermarks)
    }

    fn insert_values_clause(rows: usize, columns: usize) -> String {
        let mut clause = String::new();
        let mut param = 1;
        for i in 0..rows {
            if i > 0 {
                clause.push_str(", ");
            }
            clause.push('(');
            for c in 0..columns {
                if c > 0 {
                    clause.push_str(", ");
                }
                clause.push_str(&format!("${}", param));
                param += 1;
            }
            clause.push(')');
        }
        clause
    }

    async fn insert_observation_chunk(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        rows: &[EmaObservation],
    ) -> StorageResult<usize> {
        let mut query = String::from(
            r#"
            INSERT INTO ema_observations (
                instrument_id, ts, timeframe_label, period, series_kind,
                value, bucket_days, is_preview,
                first_difference, second_difference,
                first_difference_canonical, second_difference_canonical
            ) VALUES
            "#,
        );
        query.push_str(&Self::insert_values_clause(rows.len(), 12));
        query.push_str(" ON CONFLICT DO NOTHING");

        let mut sqlx_query = sqlx::query(&query);
        for row in rows {
            sqlx_query = sqlx_query
                .bind(&row.instrument_id)
                .bind(row.ts)
                .bind(&row.timeframe_label)
                .bind(row.period as i32)
                .bind(row.kind.as_str())
                .bind(row.value)
                .bind(row.bucket_days as i32)
                .bind(row.is_preview)
                .bind(row.first_difference)
                .bind(row.second_difference)
                .bind(row.first_difference_canonical)
                .bind(row.second_difference_canonical);
        }

        let result = sqlx_query.execute(&mut **tx).await?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl PriceStore for EmaRepository {
    async fn load_daily_history(&self, instrument_id: &str) -> StorageResult<Vec<PricePoint>> {
        let rows = sqlx::query(
            r#"
            SELECT instrument_id, ts, close
            FROM daily_prices
            WHERE instrument_id = $1
            ORDER BY ts ASC
            "#,
        )
        .bind(instrument_id)
        .fetch_all(&self.pool)
        .await?;

        let prices: Vec<PricePoint> = rows
            .iter()
            .map(|row| PricePoint {
                instrument_id: row.get("instrument_id"),
                ts: row.get("ts"),
                close: row.get("close"),
            })
            .collect();

        debug!("Loaded {} daily prices for {}", prices.len(), instrument_id);
        Ok(prices)
    }

    async fn list_instruments(&self) -> StorageResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT instrument_id
            FROM daily_prices
            ORDER BY instrument_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("instrument_id")).collect())
    }
}

#[async_trait]
impl WatermarkStore for EmaRepository {
    async fn read(&self, instrument_id: &str, key: &SeriesKey) -> StorageResult<Option<NaiveDate>> {
        let row = sqlx::query(
            r#"
            SELECT last_emitted_ts
            FROM ema_watermarks
            WHERE instrument_id = $1 AND timeframe_label = $2
              AND period = $3 AND series_kind = $4
            "#,
        )
        .bind(instrument_id)
        .bind(&key.timeframe_label)
        .bind(key.period as i32)
        .bind(key.kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("last_emitted_ts")))
    }

    async fn read_all(&self, instrument_id: &str) -> StorageResult<HashMap<SeriesKey, NaiveDate>> {
        let rows = sqlx::query(
            r#"
            SELECT timeframe_label, period, series_kind, last_emitted_ts
            FROM ema_watermarks
            WHERE instrument_id = $1
            "#,
        )
        .bind(instrument_id)
        .fetch_all(&self.pool)
        .await?;

        let mut watermarks = HashMap::with_capacity(rows.len());
        for row in rows {
            let kind_str: String = row.get("series_kind");
            let Some(kind) = SeriesKind::from_str(&kind_str) else {
                return Err(StorageError::InvalidData(format!(
                    "Unknown series kind '{}' in watermark row",
                    kind_str
                )));
            };
            let key = SeriesKey::new(
                row.get::<String, _>("timeframe_label"),
                row.get::<i32, _>("period") as u32,
                kind,
            );
            watermarks.insert(key, row.get("last_emitted_ts"));
        }

        Ok(watermarks)
    }

    async fn write(&self, instrument_id: &str, key: &SeriesKey, ts: NaiveDate) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ema_watermarks (
                instrument_id, timeframe_label, period, series_kind,
                last_emitted_ts, updated_at
            ) VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (instrument_id, timeframe_label, period, series_kind)
            DO UPDATE SET
                last_emitted_ts = GREATEST(ema_watermarks.last_emitted_ts, EXCLUDED.last_emitted_ts),
                updated_at = now()
            "#,
        )
        .bind(instrument_id)
        .bind(&key.timeframe_label)
        .bind(key.period as i32)
        .bind(key.kind.as_str())
        .bind(ts)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, instrument_id: &str, keys: &[SeriesKey]) -> StorageResult<u64> {
        let mut removed = 0u64;
        for key in keys {
            let result = sqlx::query(
                r#"
                DELETE FROM ema_watermarks
                WHERE instrument_id = $1 AND timeframe_label = $2
                  AND period = $3 AND series_kind = $4
                "#,
            )
            .bind(instrument_id)
            .bind(&key.timeframe_label)
            .bind(key.period as i32)
            .bind(key.kind.as_str())
            .execute(&self.pool)
            .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}

#[async_trait]
impl ObservationStore for EmaRepository {
    async fn insert_and_advance(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        rows: &[EmaObservation],
    ) -> StorageResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        // Rows arrive in ascending timestamp order; the batch maximum is the
        // last element.
        let batch_max = rows[rows.len() - 1].ts;

        let mut tx = self.pool.begin().await?;

        let mut inserted = 0;
        for chunk in rows.chunks(self.batch_size) {
            inserted += self.insert_observation_chunk(&mut tx, chunk).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO ema_watermarks (
                instrument_id, timeframe_label, period, series_kind,
                last_emitted_ts, updated_at
            ) VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (instrument_id, timeframe_label, period, series_kind)
            DO UPDATE SET
                last_emitted_ts = GREATEST(ema_watermarks.last_emitted_ts, EXCLUDED.last_emitted_ts),
                updated_at = now()
            "#,
        )
        .bind(instrument_id)
        .bind(&key.timeframe_label)
        .bind(key.period as i32)
        .bind(key.kind.as_str())
        .bind(batch_max)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Persisted {} of {} rows for {}/{}",
            inserted,
            rows.len(),
            instrument_id,
            key
        );
        Ok(inserted)
    }

    async fn find_observation(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        ts: NaiveDate,
    ) -> StorageResult<Option<EmaObservation>> {
        let row = sqlx::query(
            r#"
            SELECT value, bucket_days, is_preview,
                   first_difference, second_difference,
                   first_difference_canonical, second_difference_canonical
            FROM ema_observations
            WHERE instrument_id = $1 AND ts = $2 AND timeframe_label = $3
              AND period = $4 AND series_kind = $5
            "#,
        )
        .bind(instrument_id)
        .bind(ts)
        .bind(&key.timeframe_label)
        .bind(key.period as i32)
        .bind(key.kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| EmaObservation {
            instrument_id: instrument_id.to_string(),
            ts,
            timeframe_label: key.timeframe_label.clone(),
            period: key.period,
            kind: key.kind,
            value: r.get("value"),
            bucket_days: r.get::<i32, _>("bucket_days") as u32,
            is_preview: r.get("is_preview"),
            first_difference: r.get("first_difference"),
            second_difference: r.get("second_difference"),
            first_difference_canonical: r.get("first_difference_canonical"),
            second_difference_canonical: r.get("second_difference_canonical"),
        }))
    }

    async fn update_observation(
        &self,
        instrument_id: &str,
        key: &SeriesKey,
        row: &EmaObservation,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE ema_observations
            SET value = $6, is_preview = $7,
                first_difference = $8, second_difference = $9,
                first_difference_canonical = $10, second_difference_canonical = $11
            WHERE instrument_id = $1 AND ts = $2 AND timeframe_label = $3
              AND period = $4 AND series_kind = $5
            "#,
        )
        .bind(instrument_id)
        .bind(row.ts)
        .bind(&key.timeframe_label)
        .bind(key.period as i32)
        .bind(key.kind.as_str())
        .bind(row.value)
        .bind(row.is_preview)
        .bind(row.first_difference)
        .bind(row.second_difference)
        .bind(row.first_difference_canonical)
        .bind(row.second_difference_canonical)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Overall output statistics.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub total_observations: u64,
    pub total_instruments: u64,
    pub earliest_ts: Option<NaiveDate>,
    pub latest_ts: Option<NaiveDate>,
    pub total_watermarks: u64,
}
