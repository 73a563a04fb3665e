//! Alert and prediction record builder
//!
//! Turns one anomalous verdict into the `Prediction` + `Alert` pair the
//! pipeline commits. Recommendation rules fire independently in a fixed order
//! and are joined with a single space.
//!
//! The predicted failure date is a uniform placeholder horizon after the
//! observation. It is not a calibrated forecast.

use chrono::Duration;
use rand::Rng;

use crate::config::AlertRulesConfig;
use crate::types::{
    Alert, Prediction, Severity, TelemetrySample, PREDICTION_ANOMALY_DETECTED,
};

const TEMPERATURE_NOTE: &str = "Temperature exceeds normal range. Check cooling system.";
const VIBRATION_NOTE: &str = "High vibration detected. Inspect bearings and alignment.";
const PRESSURE_NOTE: &str = "Pressure levels elevated. Check seals and valves.";
const EFFICIENCY_NOTE: &str = "Efficiency below optimal. Schedule maintenance.";
const CRITICAL_FALLBACK: &str =
    "Multiple parameters show concerning trends. Immediate inspection recommended.";
const WARNING_FALLBACK: &str = "Minor deviation detected. Monitor closely.";

/// Records produced for one anomalous verdict (ids unassigned)
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyRecords {
    pub prediction: Prediction,
    pub alert: Alert,
}

#[derive(Debug, Clone)]
pub struct AlertAndPredictionEmitter {
    rules: AlertRulesConfig,
}

impl AlertAndPredictionEmitter {
    pub fn new(rules: AlertRulesConfig) -> Self {
        Self { rules }
    }

    pub fn recommendation(&self, sample: &TelemetrySample, severity: Severity) -> String {
        let mut notes: Vec<&str> = Vec::new();
        if sample.temperature > self.rules.temperature_max {
            notes.push(TEMPERATURE_NOTE);
        }
        if sample.vibration > self.rules.vibration_max {
            notes.push(VIBRATION_NOTE);
        }
        if sample.pressure.is_some_and(|p| p > self.rules.pressure_max) {
            notes.push(PRESSURE_NOTE);
        }
        if sample.efficiency < self.rules.efficiency_min {
            notes.push(EFFICIENCY_NOTE);
        }

        if notes.is_empty() {
            notes.push(match severity {
                Severity::Critical => CRITICAL_FALLBACK,
                Severity::Warning => WARNING_FALLBACK,
            });
        }
        notes.join(" ")
    }

    pub fn build<R: Rng>(
        &self,
        equipment_name: &str,
        sample: &TelemetrySample,
        severity: Severity,
        confidence: f64,
        rng: &mut R,
    ) -> AnomalyRecords {
        let recommendation = self.recommendation(sample, severity);
        let horizon_days = rng.gen_range(
            self.rules.failure_horizon_min_days..=self.rules.failure_horizon_max_days,
        );

        let prediction = Prediction {
            id: 0,
            equipment_id: sample.equipment_id,
            timestamp: sample.timestamp,
            prediction_type: PREDICTION_ANOMALY_DETECTED.to_string(),
            confidence,
            predicted_failure_date: sample.timestamp + Duration::days(i64::from(horizon_days)),
            recommendation: recommendation.clone(),
        };
        let alert = Alert {
            id: 0,
            equipment_id: sample.equipment_id,
            timestamp: sample.timestamp,
            severity,
            title: format!("{equipment_name} - Anomaly Detected"),
            description: format!("AI detected unusual patterns. {recommendation}"),
            acknowledged: false,
        };

        AnomalyRecords { prediction, alert }
    }
}

impl Default for AlertAndPredictionEmitter {
    fn default() -> Self {
        Self::new(AlertRulesConfig::default())
    }
}
