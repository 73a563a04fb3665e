//! Plant Configuration - operator-tunable TOML values for the alerting pipeline
//!
//! Every section implements `Default` with the values in `defaults.rs`, so a
//! missing file or a partial file behaves exactly like the built-in setup.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::types::EquipmentId;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a plant deployment.
///
/// Load with `PlantConfig::load()` which searches:
/// 1. `$PLANTWATCH_CONFIG` env var
/// 2. `./plantwatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlantConfig {
    #[serde(default)]
    pub plant: PlantInfo,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-equipment anomaly model
    #[serde(default)]
    pub model: ModelConfig,

    /// Verdict -> status mapping and recovery
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Recommendation rule thresholds and failure horizon
    #[serde(default)]
    pub alerts: AlertRulesConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Synthetic load generator
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl PlantConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PLANTWATCH_CONFIG` environment variable
    /// 2. `./plantwatch.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_PATH_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), plant = %config.plant.name, "Loaded plant config from {}", defaults::CONFIG_PATH_ENV);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_PATH_ENV);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_PATH_ENV);
            }
        }

        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(plant = %config.plant.name, "Loaded plant config from ./{}", defaults::LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", defaults::LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from an explicit path (the `--config` flag), falling back to the
    /// search order when no path is given. An explicit path that fails to load
    /// is an error, not a fallback.
    pub fn load_with_override(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                let config = Self::load_from_file(p)?;
                info!(path = %p.display(), plant = %config.plant.name, "Loaded plant config from --config");
                Ok(config)
            }
            None => Ok(Self::load()),
        }
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are warned about, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all sections for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.parse::<SocketAddr>().is_err() {
            errors.push(format!("server.addr '{}' is not a valid socket address", self.server.addr));
        }

        if self.storage.backend == StorageBackend::Sled && self.storage.path.trim().is_empty() {
            errors.push("storage.path must be set for the sled backend".to_string());
        }

        let m = &self.model;
        if m.min_training_samples < 2 {
            errors.push("model.min_training_samples must be >= 2".to_string());
        }
        if m.window_size < m.min_training_samples {
            errors.push(format!(
                "model.window_size ({}) must be >= min_training_samples ({})",
                m.window_size, m.min_training_samples
            ));
        }
        if m.retrain_every == 0 {
            errors.push("model.retrain_every must be > 0".to_string());
        }
        if m.n_trees == 0 {
            errors.push("model.n_trees must be > 0".to_string());
        }
        if m.max_samples < 2 {
            errors.push("model.max_samples must be >= 2".to_string());
        }
        if !(m.contamination > 0.0 && m.contamination <= 0.5) {
            errors.push(format!(
                "model.contamination ({}) must be in (0, 0.5]",
                m.contamination
            ));
        }

        let p = &self.policy;
        if !(0.0..=100.0).contains(&p.critical_confidence) {
            errors.push(format!(
                "policy.critical_confidence ({}) must be in [0, 100]",
                p.critical_confidence
            ));
        }
        if p.recovery_clean_samples == Some(0) {
            errors.push("policy.recovery_clean_samples must be > 0 when set".to_string());
        }

        let a = &self.alerts;
        for (name, value) in [
            ("alerts.temperature_max", a.temperature_max),
            ("alerts.vibration_max", a.vibration_max),
            ("alerts.pressure_max", a.pressure_max),
            ("alerts.efficiency_min", a.efficiency_min),
        ] {
            if !value.is_finite() {
                errors.push(format!("{name} must be a finite number"));
            }
        }
        if a.failure_horizon_min_days == 0 {
            errors.push("alerts.failure_horizon_min_days must be > 0".to_string());
        }
        if a.failure_horizon_max_days < a.failure_horizon_min_days {
            errors.push(format!(
                "alerts.failure_horizon_max_days ({}) must be >= failure_horizon_min_days ({})",
                a.failure_horizon_max_days, a.failure_horizon_min_days
            ));
        }

        let n = &self.notifications;
        if n.status_interval_secs == 0 {
            errors.push("notifications.status_interval_secs must be > 0".to_string());
        }
        if n.delivery_timeout_ms == 0 {
            errors.push("notifications.delivery_timeout_ms must be > 0".to_string());
        }
        if n.observer_buffer == 0 {
            errors.push("notifications.observer_buffer must be > 0".to_string());
        }

        if self.generator.spike_every == 0 {
            errors.push("generator.spike_every must be > 0".to_string());
        }

        let (range_errors, range_warnings) = super::validation::validate_operating_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({0:?}): {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({0:?}): {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Plant Info
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantInfo {
    #[serde(default = "default_plant_name")]
    pub name: String,

    /// Dashboard figure: estimated cost avoided per prediction
    #[serde(default = "default_savings_per_prediction")]
    pub savings_per_prediction: f64,

    /// Look-back window for the savings estimate (days)
    #[serde(default = "default_savings_window_days")]
    pub savings_window_days: i64,
}

fn default_plant_name() -> String {
    "PlantWatch".to_string()
}
fn default_savings_per_prediction() -> f64 { defaults::SAVINGS_PER_PREDICTION }
fn default_savings_window_days() -> i64 { defaults::SAVINGS_WINDOW_DAYS }

impl Default for PlantInfo {
    fn default() -> Self {
        Self {
            name: default_plant_name(),
            savings_per_prediction: default_savings_per_prediction(),
            savings_window_days: default_savings_window_days(),
        }
    }
}

// ============================================================================
// Server / Storage
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by the `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// sled database directory (ignored by the memory backend)
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    defaults::STORAGE_PATH.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Training window bound (oldest evicted first)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Window length required before fitting
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,

    /// Refit every N observed samples (1 = every sample)
    #[serde(default = "default_retrain_every")]
    pub retrain_every: usize,

    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    #[serde(default = "default_contamination")]
    pub contamination: f64,

    /// Forest seed. `None` draws from entropy on every fit.
    #[serde(default = "default_forest_seed", skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Re-seed cold models from stored readings at first use
    #[serde(default = "default_true")]
    pub seed_from_history: bool,
}

fn default_window_size() -> usize { defaults::MODEL_WINDOW_SIZE }
fn default_min_training_samples() -> usize { defaults::MIN_TRAINING_SAMPLES }
fn default_retrain_every() -> usize { defaults::RETRAIN_EVERY }
fn default_n_trees() -> usize { defaults::FOREST_TREES }
fn default_max_samples() -> usize { defaults::FOREST_MAX_SAMPLES }
fn default_contamination() -> f64 { defaults::FOREST_CONTAMINATION }
fn default_forest_seed() -> Option<u64> { Some(defaults::FOREST_SEED) }
fn default_true() -> bool { true }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            min_training_samples: default_min_training_samples(),
            retrain_every: default_retrain_every(),
            n_trees: default_n_trees(),
            max_samples: default_max_samples(),
            contamination: default_contamination(),
            seed: default_forest_seed(),
            seed_from_history: default_true(),
        }
    }
}

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    /// Anomalous verdicts above this confidence are critical
    #[serde(default = "default_critical_confidence")]
    pub critical_confidence: f64,

    /// Consecutive clean samples that return a degraded unit to healthy.
    /// `None` keeps the status until an operator resolves it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_clean_samples: Option<u32>,
}

fn default_critical_confidence() -> f64 { defaults::CRITICAL_CONFIDENCE }

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            critical_confidence: default_critical_confidence(),
            recovery_clean_samples: None,
        }
    }
}

// ============================================================================
// Alert Rules
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRulesConfig {
    #[serde(default = "default_temperature_max")]
    pub temperature_max: f64,

    #[serde(default = "default_vibration_max")]
    pub vibration_max: f64,

    #[serde(default = "default_pressure_max")]
    pub pressure_max: f64,

    #[serde(default = "default_efficiency_min")]
    pub efficiency_min: f64,

    #[serde(default = "default_horizon_min")]
    pub failure_horizon_min_days: u32,

    #[serde(default = "default_horizon_max")]
    pub failure_horizon_max_days: u32,
}

fn default_temperature_max() -> f64 { defaults::TEMPERATURE_MAX }
fn default_vibration_max() -> f64 { defaults::VIBRATION_MAX }
fn default_pressure_max() -> f64 { defaults::PRESSURE_MAX }
fn default_efficiency_min() -> f64 { defaults::EFFICIENCY_MIN }
fn default_horizon_min() -> u32 { defaults::FAILURE_HORIZON_MIN_DAYS }
fn default_horizon_max() -> u32 { defaults::FAILURE_HORIZON_MAX_DAYS }

impl Default for AlertRulesConfig {
    fn default() -> Self {
        Self {
            temperature_max: default_temperature_max(),
            vibration_max: default_vibration_max(),
            pressure_max: default_pressure_max(),
            efficiency_min: default_efficiency_min(),
            failure_horizon_min_days: default_horizon_min(),
            failure_horizon_max_days: default_horizon_max(),
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationConfig {
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_ms: u64,

    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,
}

fn default_status_interval() -> u64 { defaults::STATUS_INTERVAL_SECS }
fn default_delivery_timeout() -> u64 { defaults::DELIVERY_TIMEOUT_MS }
fn default_observer_buffer() -> usize { defaults::OBSERVER_BUFFER }

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: default_status_interval(),
            delivery_timeout_ms: default_delivery_timeout(),
            observer_buffer: default_observer_buffer(),
        }
    }
}

// ============================================================================
// Generator
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    /// Can be overridden by the `--no-generator` CLI flag.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,

    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    #[serde(default = "default_unit_spacing")]
    pub unit_spacing_ms: u64,

    #[serde(default = "default_spike_every")]
    pub spike_every: u64,

    #[serde(default = "default_spike_units")]
    pub spike_units: Vec<EquipmentId>,

    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    /// RNG seed for reproducible runs. `None` seeds from entropy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_startup_delay() -> u64 { defaults::GENERATOR_STARTUP_DELAY_SECS }
fn default_cycle_interval() -> u64 { defaults::GENERATOR_CYCLE_INTERVAL_SECS }
fn default_unit_spacing() -> u64 { defaults::GENERATOR_UNIT_SPACING_MS }
fn default_spike_every() -> u64 { defaults::GENERATOR_SPIKE_EVERY }
fn default_spike_units() -> Vec<EquipmentId> { defaults::GENERATOR_SPIKE_UNITS.to_vec() }
fn default_error_backoff() -> u64 { defaults::GENERATOR_ERROR_BACKOFF_SECS }

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            startup_delay_secs: default_startup_delay(),
            cycle_interval_secs: default_cycle_interval(),
            unit_spacing_ms: default_unit_spacing(),
            spike_every: default_spike_every(),
            spike_units: default_spike_units(),
            error_backoff_secs: default_error_backoff(),
            seed: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
