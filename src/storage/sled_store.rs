//! Durable sled-backed store
//!
//! One named tree per record type:
//!
//! | tree                    | key                                   | value      |
//! |-------------------------|---------------------------------------|------------|
//! | `equipment`             | equipment id (u32 BE)                 | JSON unit  |
//! | `readings`              | equipment id (u32 BE) ++ id (u64 BE)  | JSON row   |
//! | `predictions`           | id (u64 BE)                           | JSON row   |
//! | `equipment_predictions` | equipment id (u32 BE) ++ id (u64 BE)  | empty      |
//! | `alerts`                | id (u64 BE)                           | JSON row   |
//! | `maintenance`           | id (u64 BE)                           | JSON row   |
//!
//! Big-endian keys sort chronologically, so a reverse scan yields the most
//! recent record first. Writes are not flushed individually; sled flushes in
//! the background and `flush()` runs on shutdown.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sled::transaction::{
    abort, ConflictableTransactionError, TransactionError, TransactionResult,
};
use sled::{Transactional, Tree};
use tracing::{info, warn};

use super::{AnomalyIds, PersistenceError, PersistenceLayer};
use crate::types::{
    Alert, AlertId, EquipmentId, EquipmentStatus, EquipmentUnit, MaintenanceStatus,
    MaintenanceTask, Prediction, PredictionId, ReadingId, StoredReading, TelemetrySample,
};

const EQUIPMENT_TREE: &str = "equipment";
const READINGS_TREE: &str = "readings";
const PREDICTIONS_TREE: &str = "predictions";
const EQUIPMENT_PREDICTIONS_TREE: &str = "equipment_predictions";
const ALERTS_TREE: &str = "alerts";
const MAINTENANCE_TREE: &str = "maintenance";

type TxResult<T> = Result<T, ConflictableTransactionError<PersistenceError>>;

/// sled store implementing [`PersistenceLayer`]
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    equipment: Tree,
    readings: Tree,
    predictions: Tree,
    equipment_predictions: Tree,
    alerts: Tree,
    maintenance: Tree,
}

impl SledStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let store = Self {
            equipment: db.open_tree(EQUIPMENT_TREE)?,
            readings: db.open_tree(READINGS_TREE)?,
            predictions: db.open_tree(PREDICTIONS_TREE)?,
            equipment_predictions: db.open_tree(EQUIPMENT_PREDICTIONS_TREE)?,
            alerts: db.open_tree(ALERTS_TREE)?,
            maintenance: db.open_tree(MAINTENANCE_TREE)?,
            db,
        };
        info!(path = ?path_ref, readings = store.readings.len(), "sled store opened");
        Ok(store)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }

    /// Ids start at 1 so that 0 can mean "not yet persisted"
    fn next_id(&self) -> Result<u64, PersistenceError> {
        Ok(self.db.generate_id()? + 1)
    }
}

// ============================================================================
// Key & Codec Helpers
// ============================================================================

fn equipment_key(id: EquipmentId) -> [u8; 4] {
    id.to_be_bytes()
}

fn scoped_key(equipment_id: EquipmentId, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&equipment_id.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn id_from_scoped_key(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.get(4..12)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistenceError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn tx_decode<T: DeserializeOwned>(bytes: &[u8]) -> TxResult<T> {
    serde_json::from_slice(bytes).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn tx_encode<T: serde::Serialize>(value: &T) -> TxResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn unwrap_tx<T>(result: TransactionResult<T, PersistenceError>) -> Result<T, PersistenceError> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => PersistenceError::Storage(e.to_string()),
    })
}

fn missing_equipment(id: EquipmentId) -> PersistenceError {
    PersistenceError::NotFound(format!("equipment {id}"))
}

/// Decode every value of an iterator, skipping (and logging) corrupt entries
fn collect_rows<T, I>(iter: I, limit: usize, tree: &str) -> Result<Vec<T>, PersistenceError>
where
    T: DeserializeOwned,
    I: Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
{
    let mut rows = Vec::new();
    for item in iter {
        if rows.len() >= limit {
            break;
        }
        let (_key, value) = item?;
        match decode::<T>(&value) {
            Ok(row) => rows.push(row),
            Err(e) => warn!(tree, error = %e, "Skipping undecodable row"),
        }
    }
    Ok(rows)
}

// ============================================================================
// PersistenceLayer
// ============================================================================

impl PersistenceLayer for SledStore {
    fn seed_equipment(&self, units: &[EquipmentUnit]) -> Result<usize, PersistenceError> {
        let mut added = 0;
        for unit in units {
            let key = equipment_key(unit.id);
            if !self.equipment.contains_key(key)? {
                self.equipment.insert(key, serde_json::to_vec(unit)?)?;
                added += 1;
            }
        }
        if added > 0 {
            self.db.flush()?;
        }
        Ok(added)
    }

    fn list_equipment(&self) -> Result<Vec<EquipmentUnit>, PersistenceError> {
        collect_rows(self.equipment.iter(), usize::MAX, EQUIPMENT_TREE)
    }

    fn get_equipment(&self, id: EquipmentId) -> Result<Option<EquipmentUnit>, PersistenceError> {
        self.equipment
            .get(equipment_key(id))?
            .map(|raw| decode(&raw))
            .transpose()
    }

    fn set_equipment_status(
        &self,
        id: EquipmentId,
        status: EquipmentStatus,
    ) -> Result<(), PersistenceError> {
        let key = equipment_key(id);
        unwrap_tx(self.equipment.transaction(|equipment| {
            let Some(raw) = equipment.get(key)? else {
                return abort(missing_equipment(id));
            };
            let mut unit: EquipmentUnit = tx_decode(&raw)?;
            unit.status = status;
            equipment.insert(&key[..], tx_encode(&unit)?)?;
            Ok(())
        }))
    }

    fn save_reading(&self, sample: &TelemetrySample) -> Result<ReadingId, PersistenceError> {
        let id = self.next_id()?;
        let row = StoredReading {
            id,
            sample: sample.clone(),
        };
        self.readings
            .insert(scoped_key(sample.equipment_id, id), serde_json::to_vec(&row)?)?;
        Ok(id)
    }

    fn recent_readings(
        &self,
        id: EquipmentId,
        limit: usize,
    ) -> Result<Vec<StoredReading>, PersistenceError> {
        collect_rows(
            self.readings.scan_prefix(equipment_key(id)).rev(),
            limit,
            READINGS_TREE,
        )
    }

    fn save_prediction(&self, prediction: &Prediction) -> Result<PredictionId, PersistenceError> {
        let id = self.next_id()?;
        let row = Prediction {
            id,
            ..prediction.clone()
        };
        self.predictions.insert(id.to_be_bytes(), serde_json::to_vec(&row)?)?;
        self.equipment_predictions
            .insert(scoped_key(prediction.equipment_id, id), &[] as &[u8])?;
        Ok(id)
    }

    fn latest_prediction(&self, id: EquipmentId) -> Result<Option<Prediction>, PersistenceError> {
        let Some(entry) = self
            .equipment_predictions
            .scan_prefix(equipment_key(id))
            .next_back()
        else {
            return Ok(None);
        };
        let (key, _) = entry?;
        let Some(prediction_id) = id_from_scoped_key(&key) else {
            return Err(PersistenceError::Storage(format!(
                "malformed key in {EQUIPMENT_PREDICTIONS_TREE}"
            )));
        };
        self.predictions
            .get(prediction_id.to_be_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    fn list_predictions(&self, limit: usize) -> Result<Vec<Prediction>, PersistenceError> {
        collect_rows(self.predictions.iter().rev(), limit, PREDICTIONS_TREE)
    }

    fn count_predictions_since(&self, since: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let rows: Vec<Prediction> = collect_rows(self.predictions.iter(), usize::MAX, PREDICTIONS_TREE)?;
        Ok(rows.iter().filter(|p| p.timestamp >= since).count())
    }

    fn save_alert(&self, alert: &Alert) -> Result<AlertId, PersistenceError> {
        let id = self.next_id()?;
        let row = Alert {
            id,
            ..alert.clone()
        };
        self.alerts.insert(id.to_be_bytes(), serde_json::to_vec(&row)?)?;
        Ok(id)
    }

    fn list_alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> Result<Vec<Alert>, PersistenceError> {
        let mut rows = Vec::new();
        for item in self.alerts.iter().rev() {
            if rows.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            let alert: Alert = match decode(&value) {
                Ok(alert) => alert,
                Err(e) => {
                    warn!(tree = ALERTS_TREE, error = %e, "Skipping undecodable row");
                    continue;
                }
            };
            if acknowledged.map_or(true, |flag| alert.acknowledged == flag) {
                rows.push(alert);
            }
        }
        Ok(rows)
    }

    fn acknowledge_alert(&self, id: AlertId) -> Result<Alert, PersistenceError> {
        let key = id.to_be_bytes();
        unwrap_tx(self.alerts.transaction(|alerts| {
            let Some(raw) = alerts.get(key)? else {
                return abort(PersistenceError::NotFound(format!("alert {id}")));
            };
            let mut alert: Alert = tx_decode(&raw)?;
            alert.acknowledged = true;
            alerts.insert(&key[..], tx_encode(&alert)?)?;
            Ok(alert)
        }))
    }

    fn count_unacknowledged_alerts(
        &self,
        equipment: Option<EquipmentId>,
    ) -> Result<usize, PersistenceError> {
        let rows: Vec<Alert> = collect_rows(self.alerts.iter(), usize::MAX, ALERTS_TREE)?;
        Ok(rows
            .iter()
            .filter(|a| !a.acknowledged)
            .filter(|a| equipment.map_or(true, |id| a.equipment_id == id))
            .count())
    }

    /// Reading, prediction, alert, index entry and status change in one
    /// multi-tree transaction: either all are visible or none is.
    fn record_anomaly(
        &self,
        sample: &TelemetrySample,
        prediction: &Prediction,
        alert: &Alert,
        status: EquipmentStatus,
    ) -> Result<AnomalyIds, PersistenceError> {
        let equipment_id = alert.equipment_id;
        let ids = AnomalyIds {
            reading_id: self.next_id()?,
            prediction_id: self.next_id()?,
            alert_id: self.next_id()?,
        };

        let reading_row = serde_json::to_vec(&StoredReading {
            id: ids.reading_id,
            sample: sample.clone(),
        })?;
        let prediction_row = serde_json::to_vec(&Prediction {
            id: ids.prediction_id,
            ..prediction.clone()
        })?;
        let alert_row = serde_json::to_vec(&Alert {
            id: ids.alert_id,
            ..alert.clone()
        })?;
        let unit_key = equipment_key(equipment_id);
        let reading_key = scoped_key(sample.equipment_id, ids.reading_id);
        let index_key = scoped_key(prediction.equipment_id, ids.prediction_id);

        let trees = (
            &self.equipment,
            &self.readings,
            &self.predictions,
            &self.equipment_predictions,
            &self.alerts,
        );
        unwrap_tx(trees.transaction(
            |(equipment, readings, predictions, index, alerts)| {
                let Some(raw) = equipment.get(unit_key)? else {
                    return abort(missing_equipment(equipment_id));
                };
                let mut unit: EquipmentUnit = tx_decode(&raw)?;
                unit.status = status;
                equipment.insert(&unit_key[..], tx_encode(&unit)?)?;
                readings.insert(reading_key.as_slice(), reading_row.as_slice())?;
                predictions.insert(&ids.prediction_id.to_be_bytes()[..], prediction_row.as_slice())?;
                index.insert(index_key.as_slice(), &[] as &[u8])?;
                alerts.insert(&ids.alert_id.to_be_bytes()[..], alert_row.as_slice())?;
                Ok(())
            },
        ))?;

        Ok(ids)
    }

    fn create_maintenance_task(
        &self,
        task: &MaintenanceTask,
    ) -> Result<MaintenanceTask, PersistenceError> {
        if !self.equipment.contains_key(equipment_key(task.equipment_id))? {
            return Err(missing_equipment(task.equipment_id));
        }
        let stored = MaintenanceTask {
            id: self.next_id()?,
            ..task.clone()
        };
        self.maintenance
            .insert(stored.id.to_be_bytes(), serde_json::to_vec(&stored)?)?;
        Ok(stored)
    }

    fn list_open_maintenance(&self) -> Result<Vec<MaintenanceTask>, PersistenceError> {
        let mut open: Vec<MaintenanceTask> =
            collect_rows(self.maintenance.iter(), usize::MAX, MAINTENANCE_TREE)?;
        open.retain(|t| t.status != MaintenanceStatus::Completed);
        open.sort_by_key(|t| (t.scheduled_date, t.id));
        Ok(open)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
