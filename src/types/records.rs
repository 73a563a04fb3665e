//! Persisted records: predictions, alerts, maintenance tasks

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{EquipmentId, Severity, TelemetrySample};

pub type ReadingId = u64;
pub type PredictionId = u64;
pub type AlertId = u64;
pub type MaintenanceId = u64;

/// Prediction type recorded for every anomalous verdict
pub const PREDICTION_ANOMALY_DETECTED: &str = "anomaly_detected";

/// A telemetry sample as read back from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub id: ReadingId,
    #[serde(flatten)]
    pub sample: TelemetrySample,
}

// ============================================================================
// Prediction
// ============================================================================

/// Forward-looking record emitted on an anomalous verdict. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Assigned by the store; `0` until persisted
    #[serde(default)]
    pub id: PredictionId,
    pub equipment_id: EquipmentId,
    pub timestamp: DateTime<Utc>,
    pub prediction_type: String,
    /// Confidence in [0, 100]
    pub confidence: f64,
    /// Placeholder horizon, not a calibrated forecast
    pub predicted_failure_date: DateTime<Utc>,
    pub recommendation: String,
}

// ============================================================================
// Alert
// ============================================================================

/// Operator-facing alert. Acknowledgment is the only mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Assigned by the store; `0` until persisted
    #[serde(default)]
    pub id: AlertId,
    pub equipment_id: EquipmentId,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub acknowledged: bool,
}

// ============================================================================
// Maintenance
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceStatus {
    #[default]
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaintenancePriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceTask {
    #[serde(default)]
    pub id: MaintenanceId,
    pub equipment_id: EquipmentId,
    pub task: String,
    pub scheduled_date: NaiveDate,
    pub priority: MaintenancePriority,
    pub status: MaintenanceStatus,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/maintenance`
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceRequest {
    pub equipment_id: EquipmentId,
    pub task: String,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub priority: MaintenancePriority,
}

impl MaintenanceRequest {
    pub fn into_task(self, created_at: DateTime<Utc>) -> MaintenanceTask {
        MaintenanceTask {
            id: 0,
            equipment_id: self.equipment_id,
            task: self.task,
            scheduled_date: self.scheduled_date,
            priority: self.priority,
            status: MaintenanceStatus::Pending,
            created_at,
        }
    }
}
