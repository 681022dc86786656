use axum::extract::State;
use tracing::error;

use super::{ApiError, internal_error};
use crate::app::AppState;

pub(crate) async fn exporter(State(state): State<AppState>) -> Result<String, ApiError> {
    state.telemetry().export().map_err(|err| {
        error!(error = %err, "metrics export failed");
        internal_error("metrics export failed")
    })
}
