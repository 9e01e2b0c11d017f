//! Image upload prediction endpoint

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use inference_engine::PredictionResult;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use upload_validator::UploadedImage;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

/// Successful prediction response
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: PredictionResult,
    #[serde(rename = "processingTime")]
    pub processing_time: f64,
}

/// Classify the uploaded leaf image
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let span = info_span!("predict", request_id = %Uuid::new_v4());
    let outcome = run(state, multipart).instrument(span).await;

    match &outcome {
        Ok(response) => {
            metrics::counter!("leafscan_predictions_total", "outcome" => "success", "code" => "OK")
                .increment(1);
            metrics::histogram!("leafscan_prediction_seconds").record(response.processing_time);
        }
        Err(err) => {
            let label = if err.status().is_client_error() { "rejected" } else { "error" };
            metrics::counter!("leafscan_predictions_total", "outcome" => label, "code" => err.code())
                .increment(1);
        }
    }

    outcome.map(Json)
}

async fn run(
    state: Arc<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictResponse, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        debug!("Request is not multipart: {}", rejection);
        ApiError::NoImage
    })?;

    let upload = read_upload(&mut multipart, state.service.max_upload_bytes()).await?;
    info!(
        "Processing image: {} ({:.1} KB)",
        upload.filename,
        upload.len() as f64 / 1024.0
    );

    let service = Arc::clone(&state.service);
    let outcome = tokio::task::spawn_blocking(move || service.predict(&upload))
        .await
        .map_err(|e| {
            error!("Prediction worker failed: {}", e);
            ApiError::Prediction("Prediction worker failed".to_string())
        })?;

    match outcome {
        Ok(report) => {
            let response = PredictResponse {
                success: true,
                processing_time: report.processing_time_secs(),
                prediction: report.result,
            };
            info!(
                "Prediction: {} ({:.2}%) in {:.1} ms",
                response.prediction.class_vi,
                response.prediction.confidence,
                report.elapsed.as_secs_f64() * 1000.0
            );
            Ok(response)
        }
        Err(failure) => {
            let err = ApiError::from(failure.error);
            if err.status().is_client_error() {
                warn!("Upload rejected after {}: {}", failure.last_completed, err);
            } else {
                error!(
                    "Prediction failed after {} ({:.1} ms): {}",
                    failure.last_completed,
                    failure.elapsed.as_secs_f64() * 1000.0,
                    err
                );
            }
            Err(err)
        }
    }
}

/// Stream the `image` file part into memory, stopping at `max_bytes`.
///
/// Parts without a filename are form values, not files, and are skipped.
async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> Result<UploadedImage, ApiError> {
    let to_api_error = |e| multipart_error(e, max_bytes);

    while let Some(mut field) = multipart.next_field().await.map_err(to_api_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(to_api_error)? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(ApiError::FileTooLarge { max_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok(UploadedImage::new(filename, bytes));
    }

    Err(ApiError::NoImage)
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::FileTooLarge { max_bytes }
    } else {
        debug!("Malformed multipart body: {}", err);
        ApiError::NoImage
    }
}
