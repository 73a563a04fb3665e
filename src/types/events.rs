//! Notification payloads pushed to live observers (never persisted)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EquipmentId, EquipmentStatus};

/// One row of a periodic status update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentStatusEntry {
    pub id: EquipmentId,
    pub name: String,
    pub status: EquipmentStatus,
}

/// Event delivered to every registered observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Emitted once per anomalous verdict
    Alert {
        equipment_id: EquipmentId,
        status: EquipmentStatus,
        confidence: f64,
    },
    /// Emitted on a fixed interval regardless of anomalies
    StatusUpdate {
        data: Vec<EquipmentStatusEntry>,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::Alert { .. } => "alert",
            NotificationEvent::StatusUpdate { .. } => "status_update",
        }
    }
}
