//! System-wide default constants.
//!
//! Every tunable here has a matching `PlantConfig` field; the constants are
//! the values used when no config file sets them. Grouped by subsystem.

// ============================================================================
// Server
// ============================================================================

/// HTTP server bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8000";

/// Environment variable holding a comma-separated CORS origin allow-list.
pub const CORS_ORIGINS_ENV: &str = "PLANTWATCH_CORS_ORIGINS";

/// Environment variable pointing at a TOML config file.
pub const CONFIG_PATH_ENV: &str = "PLANTWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "plantwatch.toml";

// ============================================================================
// Storage
// ============================================================================

/// sled database path.
pub const STORAGE_PATH: &str = "./data/plantwatch.db";

// ============================================================================
// Anomaly Model
// ============================================================================

/// Training window bound per equipment unit (feature vectors).
pub const MODEL_WINDOW_SIZE: usize = 200;

/// Minimum window length before the first fit.
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Refit after every N observed samples once the minimum is met.
pub const RETRAIN_EVERY: usize = 1;

/// Trees in the isolation forest.
pub const FOREST_TREES: usize = 100;

/// Sub-sample size per tree (capped at the window length).
pub const FOREST_MAX_SAMPLES: usize = 256;

/// Expected outlier share in the training window.
pub const FOREST_CONTAMINATION: f64 = 0.1;

/// Deterministic forest seed.
pub const FOREST_SEED: u64 = 42;

/// Confidence reported while no fitted model exists.
pub const NEUTRAL_CONFIDENCE: f64 = 50.0;

// ============================================================================
// Classification
// ============================================================================

/// Anomalous verdicts with confidence strictly above this are critical.
pub const CRITICAL_CONFIDENCE: f64 = 85.0;

// ============================================================================
// Recommendation Rules
// ============================================================================

/// Temperature above which cooling is flagged (°C).
pub const TEMPERATURE_MAX: f64 = 80.0;

/// Vibration above which bearings are flagged (mm/s).
pub const VIBRATION_MAX: f64 = 7.0;

/// Pressure above which seals are flagged (PSI).
pub const PRESSURE_MAX: f64 = 140.0;

/// Efficiency below which maintenance is suggested (%).
pub const EFFICIENCY_MIN: f64 = 80.0;

/// Placeholder failure horizon bounds (days after the observation).
pub const FAILURE_HORIZON_MIN_DAYS: u32 = 1;
pub const FAILURE_HORIZON_MAX_DAYS: u32 = 7;

// ============================================================================
// Notifications
// ============================================================================

/// Interval between periodic status updates (seconds).
pub const STATUS_INTERVAL_SECS: u64 = 5;

/// Upper bound on a single observer delivery (milliseconds).
pub const DELIVERY_TIMEOUT_MS: u64 = 2_000;

/// Per-connection queue depth for channel-backed observers.
pub const OBSERVER_BUFFER: usize = 64;

// ============================================================================
// Load Generator
// ============================================================================

/// Delay before the first generator cycle (seconds).
pub const GENERATOR_STARTUP_DELAY_SECS: u64 = 5;

/// Delay between generator cycles (seconds).
pub const GENERATOR_CYCLE_INTERVAL_SECS: u64 = 10;

/// Delay between units inside one cycle (milliseconds).
pub const GENERATOR_UNIT_SPACING_MS: u64 = 500;

/// Spike injection period in cycles, counted from cycle 0.
pub const GENERATOR_SPIKE_EVERY: u64 = 20;

/// Units that receive injected spikes.
pub const GENERATOR_SPIKE_UNITS: [u32; 2] = [1, 5];

/// Back-off after a failing cycle (seconds).
pub const GENERATOR_ERROR_BACKOFF_SECS: u64 = 5;

// ============================================================================
// API
// ============================================================================

/// Readings returned by the equipment detail endpoint.
pub const RECENT_READINGS_LIMIT: usize = 100;

/// Rows returned by list endpoints (predictions, alerts).
pub const LIST_LIMIT: usize = 50;

/// Estimated cost avoided per prediction (dashboard figure).
pub const SAVINGS_PER_PREDICTION: f64 = 3_500.0;

/// Look-back window for the savings estimate (days).
pub const SAVINGS_WINDOW_DAYS: i64 = 30;
