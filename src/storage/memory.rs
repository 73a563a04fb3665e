//! In-memory persistence for tests and `--memory` runs
//!
//! Thread-safe via a single `RwLock` over all tables, so `record_anomaly`
//! is atomic here too. Not durable: data is lost on restart.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::{AnomalyIds, PersistenceError, PersistenceLayer};
use crate::types::{
    Alert, AlertId, EquipmentId, EquipmentStatus, EquipmentUnit, MaintenanceStatus,
    MaintenanceTask, Prediction, PredictionId, ReadingId, StoredReading, TelemetrySample,
};

#[derive(Default)]
struct Tables {
    equipment: BTreeMap<EquipmentId, EquipmentUnit>,
    readings: Vec<StoredReading>,
    predictions: Vec<Prediction>,
    alerts: Vec<Alert>,
    maintenance: Vec<MaintenanceTask>,
    last_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Volatile store backed by plain collections
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, PersistenceError> {
        self.tables
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, PersistenceError> {
        self.tables
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))
    }
}

fn missing_equipment(id: EquipmentId) -> PersistenceError {
    PersistenceError::NotFound(format!("equipment {id}"))
}

impl PersistenceLayer for InMemoryStore {
    fn seed_equipment(&self, units: &[EquipmentUnit]) -> Result<usize, PersistenceError> {
        let mut tables = self.write()?;
        let mut added = 0;
        for unit in units {
            if !tables.equipment.contains_key(&unit.id) {
                tables.equipment.insert(unit.id, unit.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    fn list_equipment(&self) -> Result<Vec<EquipmentUnit>, PersistenceError> {
        Ok(self.read()?.equipment.values().cloned().collect())
    }

    fn get_equipment(&self, id: EquipmentId) -> Result<Option<EquipmentUnit>, PersistenceError> {
        Ok(self.read()?.equipment.get(&id).cloned())
    }

    fn set_equipment_status(
        &self,
        id: EquipmentId,
        status: EquipmentStatus,
    ) -> Result<(), PersistenceError> {
        let mut tables = self.write()?;
        let unit = tables
            .equipment
            .get_mut(&id)
            .ok_or_else(|| missing_equipment(id))?;
        unit.status = status;
        Ok(())
    }

    fn save_reading(&self, sample: &TelemetrySample) -> Result<ReadingId, PersistenceError> {
        let mut tables = self.write()?;
        let id = tables.next_id();
        tables.readings.push(StoredReading {
            id,
            sample: sample.clone(),
        });
        Ok(id)
    }

    fn recent_readings(
        &self,
        id: EquipmentId,
        limit: usize,
    ) -> Result<Vec<StoredReading>, PersistenceError> {
        Ok(self
            .read()?
            .readings
            .iter()
            .rev()
            .filter(|r| r.sample.equipment_id == id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn save_prediction(&self, prediction: &Prediction) -> Result<PredictionId, PersistenceError> {
        let mut tables = self.write()?;
        let id = tables.next_id();
        tables.predictions.push(Prediction {
            id,
            ..prediction.clone()
        });
        Ok(id)
    }

    fn latest_prediction(&self, id: EquipmentId) -> Result<Option<Prediction>, PersistenceError> {
        Ok(self
            .read()?
            .predictions
            .iter()
            .rev()
            .find(|p| p.equipment_id == id)
            .cloned())
    }

    fn list_predictions(&self, limit: usize) -> Result<Vec<Prediction>, PersistenceError> {
        Ok(self.read()?.predictions.iter().rev().take(limit).cloned().collect())
    }

    fn count_predictions_since(&self, since: DateTime<Utc>) -> Result<usize, PersistenceError> {
        Ok(self
            .read()?
            .predictions
            .iter()
            .filter(|p| p.timestamp >= since)
            .count())
    }

    fn save_alert(&self, alert: &Alert) -> Result<AlertId, PersistenceError> {
        let mut tables = self.write()?;
        let id = tables.next_id();
        tables.alerts.push(Alert {
            id,
            ..alert.clone()
        });
        Ok(id)
    }

    fn list_alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> Result<Vec<Alert>, PersistenceError> {
        Ok(self
            .read()?
            .alerts
            .iter()
            .rev()
            .filter(|a| acknowledged.map_or(true, |flag| a.acknowledged == flag))
            .take(limit)
            .cloned()
            .collect())
    }

    fn acknowledge_alert(&self, id: AlertId) -> Result<Alert, PersistenceError> {
        let mut tables = self.write()?;
        let alert = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| PersistenceError::NotFound(format!("alert {id}")))?;
        alert.acknowledged = true;
        Ok(alert.clone())
    }

    fn count_unacknowledged_alerts(
        &self,
        equipment: Option<EquipmentId>,
    ) -> Result<usize, PersistenceError> {
        Ok(self
            .read()?
            .alerts
            .iter()
            .filter(|a| !a.acknowledged)
            .filter(|a| equipment.map_or(true, |id| a.equipment_id == id))
            .count())
    }

    fn record_anomaly(
        &self,
        sample: &TelemetrySample,
        prediction: &Prediction,
        alert: &Alert,
        status: EquipmentStatus,
    ) -> Result<AnomalyIds, PersistenceError> {
        let mut tables = self.write()?;
        let Some(unit) = tables.equipment.get_mut(&alert.equipment_id) else {
            return Err(missing_equipment(alert.equipment_id));
        };
        unit.status = status;

        let reading_id = tables.next_id();
        tables.readings.push(StoredReading {
            id: reading_id,
            sample: sample.clone(),
        });
        let prediction_id = tables.next_id();
        tables.predictions.push(Prediction {
            id: prediction_id,
            ..prediction.clone()
        });
        let alert_id = tables.next_id();
        tables.alerts.push(Alert {
            id: alert_id,
            ..alert.clone()
        });
        Ok(AnomalyIds {
            reading_id,
            prediction_id,
            alert_id,
        })
    }

    fn create_maintenance_task(
        &self,
        task: &MaintenanceTask,
    ) -> Result<MaintenanceTask, PersistenceError> {
        let mut tables = self.write()?;
        if !tables.equipment.contains_key(&task.equipment_id) {
            return Err(missing_equipment(task.equipment_id));
        }
        let stored = MaintenanceTask {
            id: tables.next_id(),
            ..task.clone()
        };
        tables.maintenance.push(stored.clone());
        Ok(stored)
    }

    fn list_open_maintenance(&self) -> Result<Vec<MaintenanceTask>, PersistenceError> {
        let mut open: Vec<_> = self
            .read()?
            .maintenance
            .iter()
            .filter(|t| t.status != MaintenanceStatus::Completed)
            .cloned()
            .collect();
        open.sort_by_key(|t| (t.scheduled_date, t.id));
        Ok(open)
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{alert, prediction, sample};
    use crate::types::default_fleet;

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.seed_equipment(&default_fleet()).unwrap();
        store
    }

    #[test]
    fn test_seed_is_idempotent() {
        let store = InMemoryStore::new();
        assert_eq!(store.seed_equipment(&default_fleet()).unwrap(), 6);
        assert_eq!(store.seed_equipment(&default_fleet()).unwrap(), 0);
        assert_eq!(store.list_equipment().unwrap().len(), 6);
    }

    #[test]
    fn test_recent_readings_most_recent_first() {
        let store = seeded();
        store.save_reading(&sample(1, 70.0)).unwrap();
        store.save_reading(&sample(2, 99.0)).unwrap();
        store.save_reading(&sample(1, 71.0)).unwrap();

        let readings = store.recent_readings(1, 10).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].sample.temperature, 71.0);

        let features = store.load_recent_features(1, 1).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].get(0), 71.0);
    }

    #[test]
    fn test_record_anomaly_commits_every_record() {
        let store = seeded();
        let ids = store
            .record_anomaly(&sample(2, 95.0), &prediction(2), &alert(2), EquipmentStatus::Warning)
            .unwrap();

        assert_eq!(store.recent_readings(2, 10).unwrap()[0].id, ids.reading_id);
        assert_eq!(store.latest_prediction(2).unwrap().unwrap().id, ids.prediction_id);
        assert_eq!(store.list_alerts(None, 10).unwrap()[0].id, ids.alert_id);
        assert_eq!(
            store.get_equipment(2).unwrap().unwrap().status,
            EquipmentStatus::Warning
        );
    }

    #[test]
    fn test_record_anomaly_unknown_equipment_writes_nothing() {
        let store = seeded();
        let result = store.record_anomaly(
            &sample(99, 95.0),
            &prediction(99),
            &alert(99),
            EquipmentStatus::Critical,
        );
        assert!(matches!(result, Err(PersistenceError::NotFound(_))));
        assert!(store.recent_readings(99, 10).unwrap().is_empty());
        assert!(store.list_predictions(10).unwrap().is_empty());
        assert!(store.list_alerts(None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_acknowledge_and_filter() {
        let store = seeded();
        let first = store.save_alert(&alert(1)).unwrap();
        store.save_alert(&alert(3)).unwrap();

        let acked = store.acknowledge_alert(first).unwrap();
        assert!(acked.acknowledged);
        assert_eq!(store.list_alerts(Some(true), 10).unwrap().len(), 1);
        assert_eq!(store.list_alerts(Some(false), 10).unwrap().len(), 1);
        assert_eq!(store.count_unacknowledged_alerts(None).unwrap(), 1);
        assert_eq!(store.count_unacknowledged_alerts(Some(1)).unwrap(), 0);

        assert!(matches!(
            store.acknowledge_alert(12_345),
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[test]
    fn test_trait_object() {
        let store: Box<dyn PersistenceLayer> = Box::new(seeded());
        assert_eq!(store.backend_name(), "InMemory");
        assert!(store.set_equipment_status(42, EquipmentStatus::Critical).is_err());
    }
}
