//! HTTP handlers for the plant dashboard.
//!
//! Handlers return `Result<Response, ApiError>`; storage and pipeline errors
//! convert with `?`. Equipment status always comes from the health registry;
//! the stored status is only a mirror.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::{ApiError, ApiResponse};
use crate::config::{defaults, PlantConfig};
use crate::model::ModelSummary;
use crate::pipeline::IngestionPipeline;
use crate::storage::PersistenceLayer;
use crate::types::{
    Alert, AlertId, EquipmentId, EquipmentStatus, EquipmentUnit, MaintenanceRequest,
    MaintenanceTask, Prediction, SensorReading, StoredReading,
};

// ============================================================================
// State
// ============================================================================

/// Shared state for every handler
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<IngestionPipeline>,
    pub config: Arc<PlantConfig>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(pipeline: Arc<IngestionPipeline>, config: Arc<PlantConfig>) -> Self {
        Self {
            pipeline,
            config,
            started_at: Instant::now(),
        }
    }

    fn store(&self) -> &Arc<dyn PersistenceLayer> {
        self.pipeline.store()
    }

    fn equipment_name(&self, id: EquipmentId) -> String {
        self.pipeline
            .health()
            .name(id)
            .unwrap_or_else(|| format!("Equipment {id}"))
    }

    /// Stored unit with the registry's current status
    fn with_live_status(&self, mut unit: EquipmentUnit) -> EquipmentUnit {
        if let Some(status) = self.pipeline.health().current(unit.id) {
            unit.status = status;
        }
        unit
    }
}

type ApiResult = Result<Response, ApiError>;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct EquipmentSummary {
    #[serde(flatten)]
    pub unit: EquipmentUnit,
    pub alert_count: usize,
}

#[derive(Debug, Serialize)]
pub struct EquipmentDetail {
    pub equipment: EquipmentUnit,
    pub recent_readings: Vec<StoredReading>,
    pub latest_prediction: Option<Prediction>,
    pub model: ModelSummary,
}

#[derive(Debug, Serialize)]
pub struct ResolveResult {
    pub equipment_id: EquipmentId,
    pub previous_status: EquipmentStatus,
    pub status: EquipmentStatus,
}

#[derive(Debug, Serialize)]
pub struct NamedPrediction {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub equipment_name: String,
}

#[derive(Debug, Serialize)]
pub struct NamedAlert {
    #[serde(flatten)]
    pub alert: Alert,
    pub equipment_name: String,
}

#[derive(Debug, Serialize)]
pub struct NamedTask {
    #[serde(flatten)]
    pub task: MaintenanceTask,
    pub equipment_name: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    /// `healthy/total`
    pub equipment_online: String,
    pub active_alerts: usize,
    pub estimated_savings: f64,
    /// Savings formatted in thousands, e.g. `$10.5K`
    pub cost_saved_mtd: String,
    pub total_equipment: usize,
    pub healthy_count: usize,
    pub warning_count: usize,
    pub critical_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub acknowledged: Option<bool>,
}

// ============================================================================
// Service
// ============================================================================

/// GET /
pub async fn index(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(serde_json::json!({
        "message": format!("{} predictive maintenance API", state.config.plant.name),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "equipment": "/api/equipment",
            "sensor_data": "/api/sensor-data",
            "predictions": "/api/predictions",
            "alerts": "/api/alerts",
            "maintenance": "/api/maintenance",
            "dashboard_stats": "/api/dashboard-stats",
            "config": "/api/config",
            "websocket": "/ws",
        }
    }))
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "storage": state.store().backend_name(),
        "equipment": state.pipeline.health().len(),
        "observers": state.pipeline.fanout().len(),
        "pipeline": state.pipeline.stats(),
    }))
}

/// GET /api/config
pub async fn get_config(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.config.as_ref().clone())
}

// ============================================================================
// Equipment
// ============================================================================

/// GET /api/equipment
pub async fn list_equipment(State(state): State<ApiState>) -> ApiResult {
    let units = state.store().list_equipment()?;
    let mut summaries = Vec::with_capacity(units.len());
    for unit in units {
        let alert_count = state.store().count_unacknowledged_alerts(Some(unit.id))?;
        summaries.push(EquipmentSummary {
            unit: state.with_live_status(unit),
            alert_count,
        });
    }
    Ok(ApiResponse::ok(summaries))
}

/// GET /api/equipment/:id
pub async fn equipment_detail(
    State(state): State<ApiState>,
    Path(id): Path<EquipmentId>,
) -> ApiResult {
    let unit = state
        .store()
        .get_equipment(id)?
        .ok_or_else(|| ApiError::NotFound(format!("equipment {id} not found")))?;
    let recent_readings = state
        .store()
        .recent_readings(id, defaults::RECENT_READINGS_LIMIT)?;
    let latest_prediction = state.store().latest_prediction(id)?;
    let model = state
        .pipeline
        .model_summary(id)
        .await
        .unwrap_or_else(|| ModelSummary {
            trained: false,
            window_len: 0,
            window_capacity: state.config.model.window_size,
            fits: 0,
            last_fit_at: None,
        });

    Ok(ApiResponse::ok(EquipmentDetail {
        equipment: state.with_live_status(unit),
        recent_readings,
        latest_prediction,
        model,
    }))
}

/// POST /api/equipment/:id/resolve
pub async fn resolve_equipment(
    State(state): State<ApiState>,
    Path(id): Path<EquipmentId>,
) -> ApiResult {
    let previous_status = state.pipeline.resolve(id)?;
    Ok(ApiResponse::ok(ResolveResult {
        equipment_id: id,
        previous_status,
        status: EquipmentStatus::Healthy,
    }))
}

// ============================================================================
// Ingestion
// ============================================================================

/// POST /api/sensor-data
pub async fn submit_reading(
    State(state): State<ApiState>,
    axum::Json(reading): axum::Json<SensorReading>,
) -> ApiResult {
    let outcome = state.pipeline.ingest(reading).await?;
    Ok(ApiResponse::ok(outcome))
}

// ============================================================================
// Predictions & Alerts
// ============================================================================

/// GET /api/predictions
pub async fn list_predictions(State(state): State<ApiState>) -> ApiResult {
    let predictions: Vec<_> = state
        .store()
        .list_predictions(defaults::LIST_LIMIT)?
        .into_iter()
        .map(|prediction| NamedPrediction {
            equipment_name: state.equipment_name(prediction.equipment_id),
            prediction,
        })
        .collect();
    Ok(ApiResponse::ok(predictions))
}

/// GET /api/alerts?acknowledged=false
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(q): Query<AlertsQuery>,
) -> ApiResult {
    let alerts: Vec<_> = state
        .store()
        .list_alerts(q.acknowledged, defaults::LIST_LIMIT)?
        .into_iter()
        .map(|alert| NamedAlert {
            equipment_name: state.equipment_name(alert.equipment_id),
            alert,
        })
        .collect();
    Ok(ApiResponse::ok(alerts))
}

/// POST /api/alerts/:id/acknowledge
pub async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(id): Path<AlertId>,
) -> ApiResult {
    let alert = state.store().acknowledge_alert(id)?;
    Ok(ApiResponse::ok(alert))
}

// ============================================================================
// Maintenance
// ============================================================================

/// GET /api/maintenance
pub async fn list_maintenance(State(state): State<ApiState>) -> ApiResult {
    let tasks: Vec<_> = state
        .store()
        .list_open_maintenance()?
        .into_iter()
        .map(|task| NamedTask {
            equipment_name: state.equipment_name(task.equipment_id),
            task,
        })
        .collect();
    Ok(ApiResponse::ok(tasks))
}

/// POST /api/maintenance
pub async fn create_maintenance(
    State(state): State<ApiState>,
    axum::Json(request): axum::Json<MaintenanceRequest>,
) -> ApiResult {
    if request.task.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Task description must not be empty".to_string(),
        ));
    }
    let task = state
        .store()
        .create_maintenance_task(&request.into_task(Utc::now()))?;
    Ok(ApiResponse::created(task))
}

// ============================================================================
// Dashboard
// ============================================================================

/// GET /api/dashboard-stats
pub async fn dashboard_stats(State(state): State<ApiState>) -> ApiResult {
    let counts = state.pipeline.health().counts();
    let total = state.pipeline.health().len();

    let active_alerts = state.store().count_unacknowledged_alerts(None)?;
    let since = Utc::now() - Duration::days(state.config.plant.savings_window_days);
    let recent_predictions = state.store().count_predictions_since(since)?;
    #[allow(clippy::cast_precision_loss)]
    let estimated_savings = recent_predictions as f64 * state.config.plant.savings_per_prediction;

    Ok(ApiResponse::ok(DashboardStats {
        equipment_online: format!("{}/{}", counts.healthy, total),
        active_alerts,
        estimated_savings,
        cost_saved_mtd: format!("${:.1}K", estimated_savings / 1000.0),
        total_equipment: total,
        healthy_count: counts.healthy,
        warning_count: counts.warning,
        critical_count: counts.critical,
    }))
}
