//! REST + WebSocket API using Axum
//!
//! Endpoints for the plant dashboard: fleet and unit views, reading
//! ingestion, predictions, alerts, maintenance, aggregate stats, and a
//! WebSocket stream of live notifications. JSON responses use the
//! envelope in [`envelope`].

pub mod envelope;
pub mod handlers;
mod routes;
mod ws;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::defaults;

/// Request bodies are single readings or maintenance tasks
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `PLANTWATCH_CORS_ORIGINS` to a comma-separated list of allowed
/// origins for a dashboard served from elsewhere.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    match std::env::var(defaults::CORS_ORIGINS_ENV) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    routes::api_routes(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer())
}
