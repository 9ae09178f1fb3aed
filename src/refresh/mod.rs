//! Incremental refresh
//!
//! The coordinator drives LOAD -> COMPUTE -> DIFF -> PERSIST -> ADVANCE
//! per instrument; the report collects per-instrument outcomes.

mod coordinator;
mod report;

pub use coordinator::{RefreshCoordinator, RefreshError, RefreshOptions};
pub use report::{InstrumentOutcome, RefreshReport};
