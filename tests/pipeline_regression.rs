//! Pipeline Regression Tests
//!
//! Drives `IngestionPipeline` end to end against the in-memory and sled
//! stores: training on a clustered window, flagging a far reading, alert and
//! prediction persistence, observer delivery, failure isolation and cold
//! start from stored history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use plantwatch::config::PlantConfig;
use plantwatch::notify::{ChannelObserver, NotificationFanout};
use plantwatch::storage::{
    AnomalyIds, InMemoryStore, PersistenceError, PersistenceLayer, SledStore,
};
use plantwatch::types::{
    default_fleet, Alert, AlertId, EquipmentId, EquipmentStatus, EquipmentUnit, FeatureVector,
    MaintenanceTask, NotificationEvent, Prediction, PredictionId, ReadingId, SensorReading,
    StoredReading, TelemetrySample,
};
use plantwatch::{EquipmentHealthRegistry, IngestError, IngestionPipeline};
use tokio::sync::mpsc;

// ============================================================================
// Helpers
// ============================================================================

fn build_pipeline(config: &PlantConfig, store: Arc<dyn PersistenceLayer>) -> IngestionPipeline {
    if store.list_equipment().unwrap().is_empty() {
        store.seed_equipment(&default_fleet()).unwrap();
    }
    let health = Arc::new(EquipmentHealthRegistry::from_units(
        &store.list_equipment().unwrap(),
        config.policy.recovery_clean_samples,
    ));
    IngestionPipeline::new(
        config,
        store,
        health,
        Arc::new(NotificationFanout::new(&config.notifications)),
    )
}

fn memory_pipeline() -> (IngestionPipeline, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let pipeline = build_pipeline(&PlantConfig::default(), store.clone());
    (pipeline, store)
}

/// Tight cluster around unit 1's operating point
fn clustered(equipment_id: EquipmentId, i: usize) -> SensorReading {
    #[allow(clippy::cast_precision_loss)]
    let d = (i % 5) as f64 * 0.2;
    SensorReading::new(
        equipment_id,
        70.0 + d,
        3.0 + d * 0.1,
        Some(120.0 - d),
        85.0 + d,
        92.0 - d,
    )
}

fn far_reading(equipment_id: EquipmentId) -> SensorReading {
    SensorReading::new(equipment_id, 100.0, 12.0, None, 85.0, 60.0)
}

fn drain(rx: &mut mpsc::Receiver<NotificationEvent>) -> Vec<NotificationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_far_reading_after_clustered_window_raises_alert() {
    let (pipeline, store) = memory_pipeline();
    let (observer, mut rx) = ChannelObserver::pair(256);
    pipeline.fanout().register(Arc::new(observer));

    for i in 0..25 {
        pipeline.ingest(clustered(1, i)).await.unwrap();
    }
    let alerts_before = store.list_alerts(None, 100).unwrap().len();

    let outcome = pipeline.ingest(far_reading(1)).await.unwrap();
    assert!(outcome.model_trained);
    assert!(outcome.anomaly_detected, "{outcome:?}");
    assert!(matches!(
        outcome.equipment_status,
        EquipmentStatus::Warning | EquipmentStatus::Critical
    ));
    assert_eq!(pipeline.health().current(1), Some(outcome.equipment_status));

    // Alert and prediction committed with the status mirror
    let alert_id = outcome.alert_id.unwrap();
    let alerts = store.list_alerts(None, 100).unwrap();
    assert_eq!(alerts.len(), alerts_before + 1);
    let alert = alerts.iter().find(|a| a.id == alert_id).unwrap();
    assert_eq!(alert.title, "Hydraulic Press #1 - Anomaly Detected");
    assert!(alert.description.contains("Check cooling system."));
    assert!(alert.description.contains("Inspect bearings and alignment."));
    assert!(alert.description.contains("Schedule maintenance."));
    assert!(!alert.acknowledged);

    let prediction = store.latest_prediction(1).unwrap().unwrap();
    assert_eq!(Some(prediction.id), outcome.prediction_id);
    assert_eq!(prediction.prediction_type, "anomaly_detected");
    assert_eq!(prediction.confidence, outcome.confidence);
    assert_eq!(
        store.get_equipment(1).unwrap().unwrap().status,
        outcome.equipment_status
    );

    // The observer saw the alert event for this reading last
    let events = drain(&mut rx);
    match events.last() {
        Some(NotificationEvent::Alert {
            equipment_id,
            status,
            confidence,
        }) => {
            assert_eq!(*equipment_id, 1);
            assert_eq!(*status, outcome.equipment_status);
            assert_eq!(*confidence, outcome.confidence);
        }
        other => panic!("expected alert event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_same_reading_twice_is_two_readings() {
    let (pipeline, store) = memory_pipeline();
    let reading = SensorReading::new(2, 68.0, 2.8, Some(95.0), 78.0, 94.0);

    let first = pipeline.ingest(reading.clone()).await.unwrap();
    let second = pipeline.ingest(reading).await.unwrap();

    assert_ne!(first.reading_id, second.reading_id);
    assert_eq!(store.recent_readings(2, 10).unwrap().len(), 2);
    assert_eq!(pipeline.model_summary(2).await.unwrap().window_len, 2);
    assert_eq!(pipeline.stats().ingested, 2);
}

#[tokio::test]
async fn test_invalid_reading_has_no_side_effects() {
    let (pipeline, store) = memory_pipeline();

    let nan = SensorReading::new(3, f64::NAN, 2.0, Some(110.0), 88.0, 96.0);
    assert!(matches!(
        pipeline.ingest(nan).await,
        Err(IngestError::Invalid(_))
    ));
    assert!(matches!(
        pipeline.ingest(clustered(42, 0)).await,
        Err(IngestError::UnknownEquipment(42))
    ));

    assert!(store.recent_readings(3, 10).unwrap().is_empty());
    assert!(store.recent_readings(42, 10).unwrap().is_empty());
    assert!(store.list_alerts(None, 10).unwrap().is_empty());
    assert_eq!(pipeline.stats().rejected, 2);
    assert_eq!(pipeline.stats().ingested, 0);
}

#[tokio::test]
async fn test_units_are_independent_and_ordered() {
    let (pipeline, store) = memory_pipeline();
    let pipeline = Arc::new(pipeline);

    let mut handles = Vec::new();
    for unit in [2, 3] {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for i in 0..20 {
                ids.push(pipeline.ingest(clustered(unit, i)).await.unwrap().reading_id);
            }
            ids
        }));
    }
    for handle in handles {
        let ids = handle.await.unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    for unit in [2, 3] {
        let readings = store.recent_readings(unit, 100).unwrap();
        assert_eq!(readings.len(), 20);
        assert!(readings.windows(2).all(|w| w[0].id > w[1].id));
        assert!(readings.iter().all(|r| r.sample.equipment_id == unit));
        assert_eq!(pipeline.model_summary(unit).await.unwrap().window_len, 20);
    }
    assert!(pipeline.model_summary(1).await.is_none());
}

#[tokio::test]
async fn test_recovery_after_clean_streak() {
    let mut config = PlantConfig::default();
    config.policy.recovery_clean_samples = Some(2);
    let store = Arc::new(InMemoryStore::new());
    let pipeline = build_pipeline(&config, store.clone());

    pipeline.health().transition(4, EquipmentStatus::Critical);
    store
        .set_equipment_status(4, EquipmentStatus::Critical)
        .unwrap();

    // Untrained model: neutral, non-anomalous verdicts
    let reading = SensorReading::new(4, 58.0, 1.5, None, 45.0, 95.0);
    let first = pipeline.ingest(reading.clone()).await.unwrap();
    assert_eq!(first.equipment_status, EquipmentStatus::Critical);
    let second = pipeline.ingest(reading).await.unwrap();
    assert_eq!(second.equipment_status, EquipmentStatus::Healthy);

    assert_eq!(pipeline.health().current(4), Some(EquipmentStatus::Healthy));
    assert_eq!(
        store.get_equipment(4).unwrap().unwrap().status,
        EquipmentStatus::Healthy
    );
}

#[tokio::test]
async fn test_no_recovery_without_policy() {
    let (pipeline, _store) = memory_pipeline();
    pipeline.health().transition(6, EquipmentStatus::Warning);
    for _ in 0..5 {
        let outcome = pipeline
            .ingest(SensorReading::new(6, 62.0, 2.3, None, 55.0, 97.0))
            .await
            .unwrap();
        assert_eq!(outcome.equipment_status, EquipmentStatus::Warning);
    }
    assert_eq!(pipeline.resolve(6).unwrap(), EquipmentStatus::Warning);
    assert_eq!(pipeline.health().current(6), Some(EquipmentStatus::Healthy));
}

// ============================================================================
// Failure isolation
// ============================================================================

/// In-memory store with switchable write failures
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    fail_readings: AtomicBool,
    fail_anomalies: AtomicBool,
}

impl FlakyStore {
    fn unavailable() -> PersistenceError {
        PersistenceError::Storage("disk unavailable".to_string())
    }
}

impl PersistenceLayer for FlakyStore {
    fn seed_equipment(&self, units: &[EquipmentUnit]) -> Result<usize, PersistenceError> {
        self.inner.seed_equipment(units)
    }

    fn list_equipment(&self) -> Result<Vec<EquipmentUnit>, PersistenceError> {
        self.inner.list_equipment()
    }

    fn get_equipment(&self, id: EquipmentId) -> Result<Option<EquipmentUnit>, PersistenceError> {
        self.inner.get_equipment(id)
    }

    fn set_equipment_status(
        &self,
        id: EquipmentId,
        status: EquipmentStatus,
    ) -> Result<(), PersistenceError> {
        self.inner.set_equipment_status(id, status)
    }

    fn save_reading(&self, sample: &TelemetrySample) -> Result<ReadingId, PersistenceError> {
        if self.fail_readings.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.save_reading(sample)
    }

    fn recent_readings(
        &self,
        id: EquipmentId,
        limit: usize,
    ) -> Result<Vec<StoredReading>, PersistenceError> {
        self.inner.recent_readings(id, limit)
    }

    fn load_recent_features(
        &self,
        id: EquipmentId,
        limit: usize,
    ) -> Result<Vec<FeatureVector>, PersistenceError> {
        self.inner.load_recent_features(id, limit)
    }

    fn save_prediction(&self, prediction: &Prediction) -> Result<PredictionId, PersistenceError> {
        self.inner.save_prediction(prediction)
    }

    fn latest_prediction(&self, id: EquipmentId) -> Result<Option<Prediction>, PersistenceError> {
        self.inner.latest_prediction(id)
    }

    fn list_predictions(&self, limit: usize) -> Result<Vec<Prediction>, PersistenceError> {
        self.inner.list_predictions(limit)
    }

    fn count_predictions_since(&self, since: DateTime<Utc>) -> Result<usize, PersistenceError> {
        self.inner.count_predictions_since(since)
    }

    fn save_alert(&self, alert: &Alert) -> Result<AlertId, PersistenceError> {
        self.inner.save_alert(alert)
    }

    fn list_alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> Result<Vec<Alert>, PersistenceError> {
        self.inner.list_alerts(acknowledged, limit)
    }

    fn acknowledge_alert(&self, id: AlertId) -> Result<Alert, PersistenceError> {
        self.inner.acknowledge_alert(id)
    }

    fn count_unacknowledged_alerts(
        &self,
        equipment: Option<EquipmentId>,
    ) -> Result<usize, PersistenceError> {
        self.inner.count_unacknowledged_alerts(equipment)
    }

    fn record_anomaly(
        &self,
        sample: &TelemetrySample,
        prediction: &Prediction,
        alert: &Alert,
        status: EquipmentStatus,
    ) -> Result<AnomalyIds, PersistenceError> {
        if self.fail_anomalies.load(Ordering::SeqCst) || self.fail_readings.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.record_anomaly(sample, prediction, alert, status)
    }

    fn create_maintenance_task(
        &self,
        task: &MaintenanceTask,
    ) -> Result<MaintenanceTask, PersistenceError> {
        self.inner.create_maintenance_task(task)
    }

    fn list_open_maintenance(&self) -> Result<Vec<MaintenanceTask>, PersistenceError> {
        self.inner.list_open_maintenance()
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test]
async fn test_failed_reading_write_skips_scoring() {
    let store = Arc::new(FlakyStore::default());
    let pipeline = build_pipeline(&PlantConfig::default(), store.clone());
    let (observer, mut rx) = ChannelObserver::pair(16);
    pipeline.fanout().register(Arc::new(observer));

    store.fail_readings.store(true, Ordering::SeqCst);
    let err = pipeline.ingest(far_reading(5)).await.unwrap_err();
    assert!(matches!(err, IngestError::Persistence(_)));

    assert_eq!(pipeline.model_summary(5).await.unwrap().window_len, 0);
    assert!(store.list_alerts(None, 10).unwrap().is_empty());
    assert!(store.list_predictions(10).unwrap().is_empty());
    assert_eq!(pipeline.health().current(5), Some(EquipmentStatus::Healthy));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(pipeline.stats().persistence_failures, 1);

    store.fail_readings.store(false, Ordering::SeqCst);
    assert!(pipeline.ingest(far_reading(5)).await.is_ok());
}

#[tokio::test]
async fn test_failed_anomaly_commit_stores_nothing() {
    let store = Arc::new(FlakyStore::default());
    let pipeline = build_pipeline(&PlantConfig::default(), store.clone());
    for i in 0..25 {
        pipeline.ingest(clustered(1, i)).await.unwrap();
    }
    let status_before = pipeline.health().current(1);
    let alerts_before = store.list_alerts(None, 100).unwrap().len();
    let fits_before = pipeline.model_summary(1).await.unwrap().fits;

    store.fail_anomalies.store(true, Ordering::SeqCst);
    let err = pipeline.ingest(far_reading(1)).await.unwrap_err();
    assert!(matches!(err, IngestError::Persistence(_)));

    assert_eq!(pipeline.health().current(1), status_before);
    assert_eq!(store.list_alerts(None, 100).unwrap().len(), alerts_before);
    assert_eq!(store.recent_readings(1, 100).unwrap().len(), 25);
    let summary = pipeline.model_summary(1).await.unwrap();
    assert_eq!(summary.window_len, 25);
    assert_eq!(summary.fits, fits_before);

    // A retry after the store recovers is ingested exactly once
    store.fail_anomalies.store(false, Ordering::SeqCst);
    let outcome = pipeline.ingest(far_reading(1)).await.unwrap();
    assert!(outcome.anomaly_detected);
    assert_eq!(store.recent_readings(1, 100).unwrap().len(), 26);
    assert_eq!(pipeline.model_summary(1).await.unwrap().window_len, 26);
    assert_eq!(store.list_alerts(None, 100).unwrap().len(), alerts_before + 1);
}

// ============================================================================
// Durable store
// ============================================================================

#[tokio::test]
async fn test_cold_start_reseeds_window_from_sled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plantwatch.db");

    {
        let store = Arc::new(SledStore::open(&path).unwrap());
        let pipeline = build_pipeline(&PlantConfig::default(), store.clone());
        for i in 0..15 {
            pipeline.ingest(clustered(2, i)).await.unwrap();
        }
        store.flush().unwrap();
    }

    let store = Arc::new(SledStore::open(&path).unwrap());
    assert_eq!(store.list_equipment().unwrap().len(), 6);
    let pipeline = build_pipeline(&PlantConfig::default(), store.clone());

    let outcome = pipeline.ingest(clustered(2, 3)).await.unwrap();
    assert!(outcome.model_trained);
    assert_eq!(pipeline.model_summary(2).await.unwrap().window_len, 16);
    assert_eq!(store.recent_readings(2, 100).unwrap().len(), 16);
}

#[tokio::test]
async fn test_history_seeding_can_be_disabled() {
    let store = Arc::new(InMemoryStore::new());
    store.seed_equipment(&default_fleet()).unwrap();
    for i in 0..15 {
        let sample = clustered(3, i).validate(Utc::now()).unwrap();
        store.save_reading(&sample).unwrap();
    }

    let mut config = PlantConfig::default();
    config.model.seed_from_history = false;
    let pipeline = build_pipeline(&config, store);

    let outcome = pipeline.ingest(clustered(3, 0)).await.unwrap();
    assert!(!outcome.model_trained);
    assert_eq!(pipeline.model_summary(3).await.unwrap().window_len, 1);
}
