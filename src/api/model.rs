use axum::{Json, extract::State};
use std::sync::PoisonError;

use crate::app::AppState;
use crate::pipeline::PipelineStatus;

pub(crate) async fn status(State(state): State<AppState>) -> Json<PipelineStatus> {
    let pipeline = state.pipeline();
    let guard = pipeline.read().unwrap_or_else(PoisonError::into_inner);
    Json(guard.status())
}
