//! Configuration loading
//!
//! Layered settings: config files (default, RUN_MODE, local) then
//! environment variables with the `EMA_ENGINE__` prefix.

mod settings;

pub use settings::{DatabaseSettings, RefreshSettings, Settings};
