//! PersistenceLayer trait - pluggable storage backend
//!
//! The pipeline and the HTTP surface talk to storage only through this trait:
//! - `SledStore`: durable embedded store (default)
//! - `InMemoryStore`: volatile store for tests and `--memory` runs

mod memory;
mod sled_store;

pub use memory::InMemoryStore;
pub use sled_store::SledStore;

use chrono::{DateTime, Utc};

use crate::types::{
    Alert, AlertId, EquipmentId, EquipmentStatus, EquipmentUnit, FeatureVector, MaintenanceTask,
    Prediction, PredictionId, ReadingId, StoredReading, TelemetrySample,
};

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("{0} not found")]
    NotFound(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

impl From<sled::Error> for PersistenceError {
    fn from(err: sled::Error) -> Self {
        PersistenceError::Storage(err.to_string())
    }
}

/// Ids assigned by one `record_anomaly` commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyIds {
    pub reading_id: ReadingId,
    pub prediction_id: PredictionId,
    pub alert_id: AlertId,
}

/// Trait for pluggable persistence backends
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks. Listing methods return the most recent record first.
pub trait PersistenceLayer: Send + Sync {
    // ------------------------------------------------------------------
    // Equipment
    // ------------------------------------------------------------------

    /// Insert the units whose ids are not yet stored. Returns how many were added.
    fn seed_equipment(&self, units: &[EquipmentUnit]) -> Result<usize, PersistenceError>;

    /// All units ordered by id
    fn list_equipment(&self) -> Result<Vec<EquipmentUnit>, PersistenceError>;

    fn get_equipment(&self, id: EquipmentId) -> Result<Option<EquipmentUnit>, PersistenceError>;

    /// Mirror a health transition. Unknown ids are `NotFound`.
    fn set_equipment_status(
        &self,
        id: EquipmentId,
        status: EquipmentStatus,
    ) -> Result<(), PersistenceError>;

    // ------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------

    fn save_reading(&self, sample: &TelemetrySample) -> Result<ReadingId, PersistenceError>;

    fn recent_readings(
        &self,
        id: EquipmentId,
        limit: usize,
    ) -> Result<Vec<StoredReading>, PersistenceError>;

    /// Feature vectors of the most recent readings, most recent first.
    /// Used to re-seed a cold model after a restart.
    fn load_recent_features(
        &self,
        id: EquipmentId,
        limit: usize,
    ) -> Result<Vec<FeatureVector>, PersistenceError> {
        Ok(self
            .recent_readings(id, limit)?
            .iter()
            .map(|r| r.sample.features())
            .collect())
    }

    // ------------------------------------------------------------------
    // Predictions & alerts
    // ------------------------------------------------------------------

    fn save_prediction(&self, prediction: &Prediction) -> Result<PredictionId, PersistenceError>;

    fn latest_prediction(&self, id: EquipmentId) -> Result<Option<Prediction>, PersistenceError>;

    fn list_predictions(&self, limit: usize) -> Result<Vec<Prediction>, PersistenceError>;

    fn count_predictions_since(&self, since: DateTime<Utc>) -> Result<usize, PersistenceError>;

    fn save_alert(&self, alert: &Alert) -> Result<AlertId, PersistenceError>;

    /// Most recent alerts, optionally filtered on the acknowledged flag
    fn list_alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> Result<Vec<Alert>, PersistenceError>;

    /// Set the acknowledged flag. Unknown ids are `NotFound`.
    fn acknowledge_alert(&self, id: AlertId) -> Result<Alert, PersistenceError>;

    /// Unacknowledged alerts, for one unit or across the fleet
    fn count_unacknowledged_alerts(
        &self,
        equipment: Option<EquipmentId>,
    ) -> Result<usize, PersistenceError>;

    /// Commit an anomalous reading together with its prediction, alert and
    /// status change. Backends with transactions override this so the four
    /// writes land together or not at all; the default writes them in order.
    fn record_anomaly(
        &self,
        sample: &TelemetrySample,
        prediction: &Prediction,
        alert: &Alert,
        status: EquipmentStatus,
    ) -> Result<AnomalyIds, PersistenceError> {
        let reading_id = self.save_reading(sample)?;
        let prediction_id = self.save_prediction(prediction)?;
        let alert_id = self.save_alert(alert)?;
        self.set_equipment_status(alert.equipment_id, status)?;
        Ok(AnomalyIds {
            reading_id,
            prediction_id,
            alert_id,
        })
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    fn create_maintenance_task(
        &self,
        task: &MaintenanceTask,
    ) -> Result<MaintenanceTask, PersistenceError>;

    /// Tasks not yet completed, ordered by scheduled date
    fn list_open_maintenance(&self) -> Result<Vec<MaintenanceTask>, PersistenceError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, Utc};

    use crate::types::{
        Alert, EquipmentId, Prediction, SensorReading, Severity, TelemetrySample,
        PREDICTION_ANOMALY_DETECTED,
    };

    pub fn sample(equipment_id: EquipmentId, temperature: f64) -> TelemetrySample {
        SensorReading::new(equipment_id, temperature, 3.0, Some(120.0), 85.0, 92.0)
            .validate(Utc::now())
            .unwrap()
    }

    pub fn prediction(equipment_id: EquipmentId) -> Prediction {
        let now = Utc::now();
        Prediction {
            id: 0,
            equipment_id,
            timestamp: now,
            prediction_type: PREDICTION_ANOMALY_DETECTED.to_string(),
            confidence: 70.0,
            predicted_failure_date: now + Duration::days(3),
            recommendation: "Minor deviation detected. Monitor closely.".to_string(),
        }
    }

    pub fn alert(equipment_id: EquipmentId) -> Alert {
        Alert {
            id: 0,
            equipment_id,
            timestamp: Utc::now(),
            severity: Severity::Warning,
            title: "Unit - Anomaly Detected".to_string(),
            description: "AI detected unusual patterns. Minor deviation detected. Monitor closely."
                .to_string(),
            acknowledged: false,
        }
    }
}
