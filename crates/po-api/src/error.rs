//! Converts every crate's error enum into an HTTP response at the boundary,
//! matching the teacher's `.map_err(|e| { tracing::error!(...); StatusCode
//! ::... })` idiom but expressed as one `IntoResponse` impl per error type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] po_db::GatewayError),
    #[error(transparent)]
    Queue(#[from] po_queue::QueueError),
    #[error(transparent)]
    Runtime(#[from] po_runtime::RuntimeError),
    #[error(transparent)]
    Orchestrator(#[from] po_orchestrator::OrchestratorError),
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Orchestrator(po_orchestrator::OrchestratorError::WorkflowNotFound(_)) => StatusCode::NOT_FOUND,
            _ => {
                tracing::error!(error = %self, "internal error at the HTTP boundary");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
