//! Response envelope shared by every JSON endpoint.
//!
//! Success is `{ "data": T, "meta": { ... } }`, failure is
//! `{ "error": { "code", "message" }, "meta": { ... } }`. Handlers return
//! `Result<Response, ApiError>` and lean on the `From` conversions below, so
//! the status code for each pipeline or storage failure is decided here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::pipeline::IngestError;
use crate::storage::PersistenceError;

pub const API_VERSION: &str = "1";

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

impl ResponseMeta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            version: API_VERSION,
        }
    }
}

fn json_response<B: Serialize>(status: StatusCode, body: B) -> Response {
    (status, axum::Json(body)).into_response()
}

// ============================================================================
// Success
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    fn wrap(data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta::now(),
        }
    }

    pub fn ok(data: T) -> Response {
        json_response(StatusCode::OK, Self::wrap(data))
    }

    /// 201, for `POST` endpoints that create a record
    pub fn created(data: T) -> Response {
        json_response(StatusCode::CREATED, Self::wrap(data))
    }
}

// ============================================================================
// Failure
// ============================================================================

/// Every way a handler can fail
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(PersistenceError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Storage(_) => "INTERNAL_ERROR",
        }
    }
}

/// A missing row is the caller's problem; anything else is ours.
impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            other => Self::Storage(other),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Invalid(_) => Self::BadRequest(err.to_string()),
            IngestError::UnknownEquipment(id) => Self::NotFound(format!("equipment {id} not found")),
            IngestError::Persistence(inner) => inner.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Storage(e) = &self {
            warn!(error = %e, "Storage error while serving request");
        }
        let body = ApiErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
            meta: ResponseMeta::now(),
        };
        json_response(self.status(), body)
    }
}
