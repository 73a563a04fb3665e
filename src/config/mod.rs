//! Plant Configuration Module
//!
//! Operator-tunable settings for the alerting pipeline, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` CLI flag
//! 2. `PLANTWATCH_CONFIG` environment variable (path to TOML file)
//! 3. `plantwatch.toml` in the current working directory
//! 4. Built-in defaults (see `defaults`)
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(PlantConfig::load());
//!
//! // Anywhere in the binary:
//! let threshold = config::get().policy.critical_confidence;
//! ```
//!
//! Library components take their section by value at construction, so tests
//! never need the global.

mod plant_config;
pub mod defaults;
pub mod validation;

pub use plant_config::*;

use std::sync::OnceLock;

/// Global plant configuration, initialized once at startup.
static PLANT_CONFIG: OnceLock<PlantConfig> = OnceLock::new();

/// Initialize the global plant configuration. Later calls are ignored.
pub fn init(config: PlantConfig) {
    if PLANT_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global plant configuration, or `None` before `init()`.
pub fn try_get() -> Option<&'static PlantConfig> {
    PLANT_CONFIG.get()
}

/// Get the global plant configuration.
///
/// Falls back to a process-wide default copy when `init()` has not run.
pub fn get() -> &'static PlantConfig {
    static FALLBACK: OnceLock<PlantConfig> = OnceLock::new();
    PLANT_CONFIG
        .get()
        .unwrap_or_else(|| FALLBACK.get_or_init(PlantConfig::default))
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    PLANT_CONFIG.get().is_some()
}
