//! # EMA Engine
//!
//! Incremental multi-timeframe exponential smoothing over daily price
//! series, with per-key watermark tracking for crash-safe, idempotent
//! refresh.
//!
//! ## Features
//!
//! - **Multi-timeframe series**: Fixed-day and calendar-aligned bucketing
//!   over a database-driven timeframe dimension
//! - **Two seeding policies**: Recursive (every-row recurrence) and
//!   anchored (canonical-close recurrence with a mean seed)
//! - **Canonical/preview rows**: Every trading day gets a value; bucket
//!   boundaries are flagged canonical, interior rows preview
//! - **Watermark refresh**: Per-key high-water marks make reruns cheap and
//!   idempotent, and surface retroactive history mutation loudly
//!
//! ## Architecture
//!
//! Computation is a pure pipeline (classify, smooth, difference, gate) over
//! a full reload of each instrument's daily history. The coordinator diffs
//! the recomputed series against stored watermarks and persists only new
//! rows, advancing each watermark in the same transaction.

pub mod cli;
pub mod config;
pub mod refresh;
pub mod schema;
pub mod series;
pub mod storage;
pub mod timeframe;

// Re-export commonly used types
pub use config::Settings;
pub use refresh::{RefreshCoordinator, RefreshError, RefreshOptions, RefreshReport};
pub use schema::{EmaObservation, PricePoint, SeriesKey, SeriesKind, Watermark};
pub use series::build_observations;
pub use storage::{
    EmaRepository, MemoryStore, ObservationStore, PriceStore, StorageError, WatermarkStore,
};
pub use timeframe::{AlignmentType, CalendarScheme, TimeframeCache, TimeframeDefinition};
