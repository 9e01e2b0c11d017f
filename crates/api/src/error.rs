//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use upload_validator::ValidationError;

use crate::service::PredictionError;

/// Errors returned by `/predict`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No image file provided")]
    NoImage,

    #[error("Empty filename")]
    EmptyFilename,

    #[error("Invalid file type. Allowed: png, jpg, jpeg, webp")]
    InvalidFileType,

    #[error("File too large (max {})", display_size(*max_bytes))]
    FileTooLarge { max_bytes: usize },

    #[error("{0}")]
    Prediction(String),
}

/// `10MB`, `512KB` or `1500 bytes`, whichever unit divides evenly
fn display_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;
    match bytes {
        0 => "0 bytes".to_string(),
        b if b % MB == 0 => format!("{}MB", b / MB),
        b if b % KB == 0 => format!("{}KB", b / KB),
        b => format!("{} bytes", b),
    }
}

/// JSON body of an error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoImage | ApiError::EmptyFilename | ApiError::InvalidFileType => {
                StatusCode::BAD_REQUEST
            }
            ApiError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NoImage => "NO_IMAGE",
            ApiError::EmptyFilename => "EMPTY_FILENAME",
            ApiError::InvalidFileType => "INVALID_FILE_TYPE",
            ApiError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ApiError::Prediction(_) => "PREDICTION_ERROR",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            code: self.code(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::EmptyFilename => ApiError::EmptyFilename,
            ValidationError::MissingExtension(_) | ValidationError::InvalidFileType { .. } => {
                ApiError::InvalidFileType
            }
            ValidationError::PayloadTooLarge { max, .. } => ApiError::FileTooLarge { max_bytes: max },
        }
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        match err.validation() {
            Some(v) => v.clone().into(),
            None => ApiError::Prediction(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::InferenceError;

    #[test]
    fn test_validation_mapping() {
        assert_eq!(ApiError::from(ValidationError::EmptyFilename).code(), "EMPTY_FILENAME");
        assert_eq!(
            ApiError::from(ValidationError::MissingExtension("leaf".into())).code(),
            "INVALID_FILE_TYPE"
        );
        let too_large = ApiError::from(ValidationError::PayloadTooLarge { size: 11, max: 10 });
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(too_large.to_string(), "File too large (max 10 bytes)");
    }

    #[test]
    fn test_file_too_large_message_follows_limit() {
        let message = |max_bytes| ApiError::FileTooLarge { max_bytes }.to_string();
        assert_eq!(message(10 * 1024 * 1024), "File too large (max 10MB)");
        assert_eq!(message(512 * 1024), "File too large (max 512KB)");
        assert_eq!(message(1500), "File too large (max 1500 bytes)");
    }

    #[test]
    fn test_pipeline_errors_are_500() {
        let err = ApiError::from(PredictionError::Inference(InferenceError::ModelNotLoaded));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "PREDICTION_ERROR");
        assert_eq!(err.to_string(), "Model not loaded");
    }

    #[test]
    fn test_nested_validation_error_keeps_its_code() {
        let err = PredictionError::Image(ValidationError::EmptyFilename.into());
        assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
    }
}
