//! API route table

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};
use super::ws;

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        // Equipment
        .route("/api/equipment", get(handlers::list_equipment))
        .route("/api/equipment/:id", get(handlers::equipment_detail))
        .route("/api/equipment/:id/resolve", post(handlers::resolve_equipment))
        // Ingestion
        .route("/api/sensor-data", post(handlers::submit_reading))
        // Predictions & alerts
        .route("/api/predictions", get(handlers::list_predictions))
        .route("/api/alerts", get(handlers::list_alerts))
        .route("/api/alerts/:id/acknowledge", post(handlers::acknowledge_alert))
        // Maintenance
        .route(
            "/api/maintenance",
            get(handlers::list_maintenance).post(handlers::create_maintenance),
        )
        // Dashboard
        .route("/api/dashboard-stats", get(handlers::dashboard_stats))
        .route("/api/config", get(handlers::get_config))
        // Live notifications
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
