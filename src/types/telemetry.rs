//! Telemetry samples and the model feature vector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::EquipmentId;

/// Number of features in a [`FeatureVector`]
pub const FEATURE_COUNT: usize = 5;

/// Feature names in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temperature",
    "vibration",
    "pressure",
    "power_consumption",
    "efficiency",
];

/// Fixed-order numeric tuple fed to the anomaly model:
/// `[temperature, vibration, pressure, power_consumption, efficiency]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, index: usize) -> f64 {
        self.0[index]
    }
}

impl From<[f64; FEATURE_COUNT]> for FeatureVector {
    fn from(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }
}

// ============================================================================
// Telemetry Sample
// ============================================================================

/// One validated multivariate reading from an equipment unit. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub equipment_id: EquipmentId,
    pub timestamp: DateTime<Utc>,
    /// Temperature (°C)
    pub temperature: f64,
    /// Vibration (mm/s)
    pub vibration: f64,
    /// Pressure (PSI). `None` for equipment without a pressure sensor.
    pub pressure: Option<f64>,
    /// Power draw (kW)
    pub power_consumption: f64,
    /// Efficiency (%)
    pub efficiency: f64,
}

impl TelemetrySample {
    /// Model feature vector.
    ///
    /// Lossy: absent pressure becomes `0.0` here. Storage keeps the `None`.
    pub fn features(&self) -> FeatureVector {
        FeatureVector([
            self.temperature,
            self.vibration,
            self.pressure.unwrap_or(0.0),
            self.power_consumption,
            self.efficiency,
        ])
    }
}

// ============================================================================
// Inbound Reading (unvalidated)
// ============================================================================

/// Validation failures for an inbound reading
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {0} is not a finite number")]
    NonFinite(&'static str),
}

/// Reading as submitted by a caller (HTTP body or load generator).
///
/// Every field except `pressure` is required; they are optional here only so
/// that a missing field is reported as a validation error instead of a
/// deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub equipment_id: EquipmentId,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub vibration: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub power_consumption: Option<f64>,
    #[serde(default)]
    pub efficiency: Option<f64>,
}

impl SensorReading {
    /// Convenience constructor with all required fields present
    pub fn new(
        equipment_id: EquipmentId,
        temperature: f64,
        vibration: f64,
        pressure: Option<f64>,
        power_consumption: f64,
        efficiency: f64,
    ) -> Self {
        Self {
            equipment_id,
            temperature: Some(temperature),
            vibration: Some(vibration),
            pressure,
            power_consumption: Some(power_consumption),
            efficiency: Some(efficiency),
        }
    }

    /// Validate and stamp the reading.
    pub fn validate(&self, timestamp: DateTime<Utc>) -> Result<TelemetrySample, ValidationError> {
        let pressure = match self.pressure {
            Some(p) if !p.is_finite() => return Err(ValidationError::NonFinite("pressure")),
            other => other,
        };

        Ok(TelemetrySample {
            equipment_id: self.equipment_id,
            timestamp,
            temperature: required("temperature", self.temperature)?,
            vibration: required("vibration", self.vibration)?,
            pressure,
            power_consumption: required("power_consumption", self.power_consumption)?,
            efficiency: required("efficiency", self.efficiency)?,
        })
    }
}

fn required(name: &'static str, value: Option<f64>) -> Result<f64, ValidationError> {
    match value {
        None => Err(ValidationError::MissingField(name)),
        Some(v) if !v.is_finite() => Err(ValidationError::NonFinite(name)),
        Some(v) => Ok(v),
    }
}
