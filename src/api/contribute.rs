use std::sync::PoisonError;

use axum::{
    Json,
    extract::{Multipart, State},
};
use serde::Serialize;
use tracing::error;

use super::classify::decode_image;
use super::{ApiError, bad_request, internal_error, pipeline_error};
use crate::app::AppState;

#[derive(Debug, Serialize)]
pub(crate) struct ContributeResponse {
    status: &'static str,
    message: &'static str,
}

/// `POST /v1/contribute`: multipart upload of one labeled image, absorbed
/// into the model via the update path.
pub(crate) async fn contribute(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ContributeResponse>, ApiError> {
    let mut image = None;
    let mut season: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("malformed multipart body: {err}")))?
    {
        match field.name() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| bad_request(format!("unreadable upload: {err}")))?;
                image = Some(decode_image(&bytes)?);
            }
            Some("season") => {
                season = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| bad_request(format!("unreadable season field: {err}")))?,
                );
            }
            // The reference client also posts an optional confidence field;
            // it is accepted and ignored.
            _ => {}
        }
    }

    let image = image.ok_or_else(|| bad_request("missing multipart field: file"))?;
    let season = season
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| bad_request("missing multipart field: season"))?;

    let metrics = state.telemetry().metrics().clone();
    metrics.contribute_requests.inc();

    let pipeline = state.pipeline();
    let timer = metrics.update_duration.start_timer();
    let task_metrics = metrics.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut guard = pipeline.write().unwrap_or_else(PoisonError::into_inner);
        // Anything but a fitted nearest-neighbor classifier absorbs the
        // contribution through a full pipeline fit.
        let full_fit = guard.update_refits();
        if full_fit {
            task_metrics.fit_requests.inc();
        }
        let outcome = guard.update(&[image], &[season]);
        if full_fit && outcome.is_err() {
            task_metrics.fit_failures.inc();
        }
        let samples = guard.status().training_samples;
        outcome.map(|()| samples)
    })
    .await;
    timer.observe_duration();

    match result {
        Ok(Ok(samples)) => {
            if let Some(samples) = samples {
                metrics.training_samples.set(samples as f64);
            }
            Ok(Json(ContributeResponse {
                status: "success",
                message: "image contributed successfully",
            }))
        }
        Ok(Err(err)) => {
            metrics.contribute_failures.inc();
            Err(pipeline_error(&err))
        }
        Err(join_error) => {
            metrics.contribute_failures.inc();
            error!(error = %join_error, "update task panicked");
            Err(internal_error("update task failed"))
        }
    }
}
