//! Ingestion Pipeline
//!
//! ```text
//! SensorReading
//!   -> validate (fields + known unit)          reject: no side effects
//!   -> window append, retrain if due, score, classify
//!   -> commit: clean     -> save_reading
//!              anomalous -> record_anomaly (reading + records + status)
//!      fail: model update rolled back, nothing stored, no alert
//!   -> anomalous: registry transition + `alert` broadcast
//!   -> clean:     recovery policy (optional)
//! ```
//!
//! The unit's model mutex is held for the whole sequence, so samples for one
//! unit are handled strictly in arrival order while other units run in
//! parallel.

mod sink;
mod stats;

pub use sink::ReadingSink;
pub use stats::{PipelineStats, PipelineStatsSnapshot};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ModelConfig, PlantConfig};
use crate::emitter::AlertAndPredictionEmitter;
use crate::health::EquipmentHealthRegistry;
use crate::model::{AdaptiveAnomalyModel, ModelRegistry, ModelSummary};
use crate::notify::NotificationFanout;
use crate::policy::ClassificationPolicy;
use crate::storage::{PersistenceError, PersistenceLayer};
use crate::types::{
    AlertId, EquipmentId, EquipmentStatus, NotificationEvent, PredictionId, ReadingId,
    SensorReading, ValidationError,
};

// ============================================================================
// Errors & Outcome
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid reading: {0}")]
    Invalid(#[from] ValidationError),

    #[error("unknown equipment id {0}")]
    UnknownEquipment(EquipmentId),

    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Result of ingesting one reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub reading_id: ReadingId,
    pub anomaly_detected: bool,
    pub confidence: f64,
    pub equipment_status: EquipmentStatus,
    pub alert_id: Option<AlertId>,
    pub prediction_id: Option<PredictionId>,
    /// Whether a fitted model produced the verdict
    pub model_trained: bool,
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct IngestionPipeline {
    store: Arc<dyn PersistenceLayer>,
    models: ModelRegistry,
    policy: ClassificationPolicy,
    health: Arc<EquipmentHealthRegistry>,
    emitter: AlertAndPredictionEmitter,
    fanout: Arc<NotificationFanout>,
    model_config: ModelConfig,
    stats: PipelineStats,
}

impl IngestionPipeline {
    pub fn new(
        config: &PlantConfig,
        store: Arc<dyn PersistenceLayer>,
        health: Arc<EquipmentHealthRegistry>,
        fanout: Arc<NotificationFanout>,
    ) -> Self {
        Self {
            store,
            models: ModelRegistry::new(config.model.clone()),
            policy: ClassificationPolicy::new(&config.policy),
            health,
            emitter: AlertAndPredictionEmitter::new(config.alerts.clone()),
            fanout,
            model_config: config.model.clone(),
            stats: PipelineStats::default(),
        }
    }

    /// Run one reading through the full pipeline.
    pub async fn ingest(&self, reading: SensorReading) -> Result<IngestOutcome, IngestError> {
        let sample = match reading.validate(Utc::now()) {
            Ok(sample) => sample,
            Err(e) => {
                self.stats.record_rejected();
                return Err(e.into());
            }
        };
        let equipment_id = sample.equipment_id;
        if !self.health.contains(equipment_id) {
            self.stats.record_rejected();
            return Err(IngestError::UnknownEquipment(equipment_id));
        }

        let handle = self.models.handle(equipment_id);
        let mut model = handle.lock().await;
        if !model.history_loaded() {
            self.load_history(equipment_id, &mut model);
        }

        let features = sample.features();
        let checkpoint = model.checkpoint();
        model.observe(features);
        if model.retrain_if_due() {
            debug!(equipment_id, window = model.window_len(), "Model retrained");
        }
        let verdict = model.score(&features);
        let classification = self.policy.classify(&verdict);

        // One store call per reading; the model update is undone if it fails
        let committed = match classification.severity {
            Some(severity) => {
                let name = self
                    .health
                    .name(equipment_id)
                    .unwrap_or_else(|| format!("Equipment {equipment_id}"));
                let records = {
                    let mut rng = rand::thread_rng();
                    self.emitter
                        .build(&name, &sample, severity, verdict.confidence, &mut rng)
                };
                self.store
                    .record_anomaly(
                        &sample,
                        &records.prediction,
                        &records.alert,
                        classification.status,
                    )
                    .map(|ids| (ids.reading_id, Some(ids)))
            }
            None => self.store.save_reading(&sample).map(|id| (id, None)),
        };
        let (reading_id, anomaly) = match committed {
            Ok(committed) => committed,
            Err(e) => {
                model.rollback(checkpoint);
                self.stats.record_persistence_failure();
                warn!(equipment_id, error = %e, "Failed to persist reading, model update undone");
                return Err(e.into());
            }
        };
        self.stats.record_ingested();

        let mut outcome = IngestOutcome {
            reading_id,
            anomaly_detected: verdict.anomalous,
            confidence: verdict.confidence,
            equipment_status: self.health.current(equipment_id).unwrap_or_default(),
            alert_id: None,
            prediction_id: None,
            model_trained: model.is_trained(),
        };

        if let Some(ids) = anomaly {
            self.health.transition(equipment_id, classification.status);
            self.stats.record_anomaly();
            info!(
                equipment_id,
                status = %classification.status,
                confidence = verdict.confidence,
                alert_id = ids.alert_id,
                "Anomaly detected"
            );

            let report = self
                .fanout
                .broadcast(&NotificationEvent::Alert {
                    equipment_id,
                    status: classification.status,
                    confidence: verdict.confidence,
                })
                .await;
            debug!(
                delivered = report.delivered,
                dropped = report.dropped,
                "Alert broadcast"
            );

            outcome.equipment_status = classification.status;
            outcome.alert_id = Some(ids.alert_id);
            outcome.prediction_id = Some(ids.prediction_id);
        } else if let Some(recovered) = self.health.record_clean(equipment_id) {
            info!(equipment_id, "Equipment recovered after clean streak");
            if let Err(e) = self.store.set_equipment_status(equipment_id, recovered) {
                warn!(equipment_id, error = %e, "Failed to persist recovered status");
            }
            outcome.equipment_status = recovered;
        }

        Ok(outcome)
    }

    /// Pre-fill a cold model from stored readings
    fn load_history(&self, equipment_id: EquipmentId, model: &mut AdaptiveAnomalyModel) {
        if !self.model_config.seed_from_history {
            model.skip_history();
            return;
        }
        match self
            .store
            .load_recent_features(equipment_id, self.model_config.window_size)
        {
            Ok(mut history) => {
                history.reverse();
                let count = history.len();
                model.seed_history(history);
                if count > 0 {
                    info!(equipment_id, samples = count, "Seeded model window from history");
                }
            }
            Err(e) => {
                warn!(equipment_id, error = %e, "Could not load history, starting cold");
                model.skip_history();
            }
        }
    }

    /// Operator resolve: return a unit to healthy. Returns the previous status.
    pub fn resolve(&self, equipment_id: EquipmentId) -> Result<EquipmentStatus, IngestError> {
        let previous = self
            .health
            .transition(equipment_id, EquipmentStatus::Healthy)
            .ok_or(IngestError::UnknownEquipment(equipment_id))?;
        self.store
            .set_equipment_status(equipment_id, EquipmentStatus::Healthy)?;
        info!(equipment_id, previous = %previous, "Equipment resolved by operator");
        Ok(previous)
    }

    pub async fn model_summary(&self, equipment_id: EquipmentId) -> Option<ModelSummary> {
        self.models.summary(equipment_id).await
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn health(&self) -> &Arc<EquipmentHealthRegistry> {
        &self.health
    }

    pub fn fanout(&self) -> &Arc<NotificationFanout> {
        &self.fanout
    }

    pub fn store(&self) -> &Arc<dyn PersistenceLayer> {
        &self.store
    }
}

#[async_trait]
impl ReadingSink for IngestionPipeline {
    async fn submit(&self, reading: SensorReading) -> Result<IngestOutcome, IngestError> {
        self.ingest(reading).await
    }
}
