use std::sync::PoisonError;

use axum::{
    Json,
    extract::{Multipart, State},
};
use image::RgbImage;
use tracing::error;

use super::{ApiError, bad_request, internal_error, pipeline_error};
use crate::app::AppState;
use crate::classifier::Prediction;

/// `POST /v1/classify`: multipart upload of one image, classified against the
/// currently fitted pipeline.
pub(crate) async fn classify(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Prediction>, ApiError> {
    let image = read_image_field(multipart).await?;

    let metrics = state.telemetry().metrics().clone();
    metrics.classify_requests.inc();

    let pipeline = state.pipeline();
    let timer = metrics.predict_duration.start_timer();
    let result = tokio::task::spawn_blocking(move || {
        let guard = pipeline.read().unwrap_or_else(PoisonError::into_inner);
        guard.predict(&image)
    })
    .await;
    timer.observe_duration();

    match result {
        Ok(Ok(prediction)) => Ok(Json(prediction)),
        Ok(Err(err)) => {
            metrics.classify_failures.inc();
            Err(pipeline_error(&err))
        }
        Err(join_error) => {
            metrics.classify_failures.inc();
            error!(error = %join_error, "prediction task panicked");
            Err(internal_error("prediction task failed"))
        }
    }
}

/// Pulls the `file` field out of the multipart body and decodes it. Decoding
/// happens here at the ingestion boundary; the core only ever sees a valid
/// raster.
pub(crate) async fn read_image_field(mut multipart: Multipart) -> Result<RgbImage, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("malformed multipart body: {err}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| bad_request(format!("unreadable upload: {err}")))?;
            return decode_image(&bytes);
        }
    }

    Err(bad_request("missing multipart field: file"))
}

pub(crate) fn decode_image(bytes: &[u8]) -> Result<RgbImage, ApiError> {
    image::load_from_memory(bytes)
        .map(|decoded| decoded.to_rgb8())
        .map_err(|err| bad_request(format!("unreadable image: {err}")))
}
