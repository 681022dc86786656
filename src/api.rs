pub(crate) mod classify;
pub(crate) mod contribute;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod model;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;

use crate::app::AppState;
use crate::pipeline::PipelineError;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/classify", post(classify::classify))
        .route("/v1/contribute", post(contribute::contribute))
        .route("/v1/model/status", get(model::status))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    detail: String,
}

impl ErrorBody {
    pub(crate) fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

pub(crate) type ApiError = (StatusCode, Json<ErrorBody>);

pub(crate) fn bad_request(detail: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorBody::new(detail)))
}

pub(crate) fn internal_error(detail: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(detail)),
    )
}

/// Maps core pipeline failures onto HTTP responses. Everything the caller can
/// fix (unfitted model, malformed input, configuration mismatch) is a 400
/// with the stage-identifying message; the degenerate-numerics case never
/// escapes the core.
pub(crate) fn pipeline_error(error: &PipelineError) -> ApiError {
    match error {
        PipelineError::NotFitted { .. }
        | PipelineError::Configuration(_)
        | PipelineError::DegenerateInput(_) => bad_request(error.to_string()),
        PipelineError::Stage { .. } => internal_error(format!("{error:#}")),
    }
}
