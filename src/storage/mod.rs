//! Storage layer
//!
//! Trait seams for prices, observations, and watermarks, with a Postgres
//! backend for production and an in-memory backend for tests.

pub mod mock;
mod postgres;
mod traits;

pub use mock::MemoryStore;
pub use postgres::{EmaRepository, EngineStats};
pub use traits::{
    ObservationStore, PriceStore, StorageError, StorageResult, WatermarkStore,
};
