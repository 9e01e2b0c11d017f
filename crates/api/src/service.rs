//! Prediction pipeline
//!
//! Runs one upload through validation, decoding, preprocessing, scoring and
//! formatting. Every stage is synchronous; callers on the async runtime move
//! the whole run onto a blocking thread.

use std::fmt;
use std::time::{Duration, Instant};

use image_pipeline::{ImageDecoder, ImageProcessingError, Preprocessor};
use inference_engine::{ClassCatalog, InferenceEngine, InferenceError, PredictionResult, ResultFormatter};
use thiserror::Error;
use tracing::debug;
use upload_validator::{UploadedImage, ValidationError};

use crate::config::ServiceConfig;

/// Pipeline failures, one variant per failing stage
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Image(#[from] ImageProcessingError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("Prediction exceeded its {0} ms deadline")]
    DeadlineExceeded(u64),
}

impl PredictionError {
    /// Upload validation error, whichever stage raised it
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            PredictionError::Validation(e) => Some(e),
            PredictionError::Image(ImageProcessingError::Validation(e)) => Some(e),
            _ => None,
        }
    }
}

/// Stages of a single prediction, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Received,
    Validated,
    Decoded,
    Preprocessed,
    Scored,
    Formatted,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Validated => "validated",
            PipelineStage::Decoded => "decoded",
            PipelineStage::Preprocessed => "preprocessed",
            PipelineStage::Scored => "scored",
            PipelineStage::Formatted => "formatted",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful prediction with its wall-clock cost
#[derive(Debug, Clone)]
pub struct PredictionReport {
    pub result: PredictionResult,
    pub elapsed: Duration,
}

impl PredictionReport {
    /// Elapsed time in seconds, 2 decimals
    pub fn processing_time_secs(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100.0).round() / 100.0
    }
}

/// Failed prediction: the last stage that completed and the error that stopped the run
#[derive(Debug)]
pub struct PredictionFailure {
    pub last_completed: PipelineStage,
    pub error: PredictionError,
    pub elapsed: Duration,
}

/// Owns the pipeline components for the lifetime of the process
#[derive(Debug, Clone)]
pub struct PredictionService {
    decoder: ImageDecoder,
    preprocessor: Preprocessor,
    engine: InferenceEngine,
    formatter: ResultFormatter,
    deadline: Option<Duration>,
}

impl PredictionService {
    /// Assemble a service from its components
    pub fn new(decoder: ImageDecoder, preprocessor: Preprocessor, engine: InferenceEngine) -> Self {
        Self {
            decoder,
            preprocessor,
            engine,
            formatter: ResultFormatter::default(),
            deadline: None,
        }
    }

    /// Build the pipeline described by `config` around `engine`
    pub fn from_config(config: &ServiceConfig, engine: InferenceEngine) -> Self {
        Self::new(
            ImageDecoder::new(config.validation()),
            Preprocessor::new(config.preprocessing),
            engine,
        )
        .with_deadline(config.deadline())
    }

    /// Set the cooperative deadline, checked between stages
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn catalog(&self) -> &ClassCatalog {
        self.formatter.catalog()
    }

    /// Upload ceiling enforced by the validator
    pub fn max_upload_bytes(&self) -> usize {
        self.decoder.validator().max_bytes()
    }

    /// Run the full pipeline on one upload
    pub fn predict(&self, upload: &UploadedImage) -> Result<PredictionReport, PredictionFailure> {
        let start = Instant::now();
        let mut stage = PipelineStage::Received;

        match self.run(upload, start, &mut stage) {
            Ok(result) => Ok(PredictionReport {
                result,
                elapsed: start.elapsed(),
            }),
            Err(error) => Err(PredictionFailure {
                last_completed: stage,
                error,
                elapsed: start.elapsed(),
            }),
        }
    }

    fn run(
        &self,
        upload: &UploadedImage,
        start: Instant,
        stage: &mut PipelineStage,
    ) -> Result<PredictionResult, PredictionError> {
        self.decoder.validator().validate(upload)?;
        self.advance(stage, PipelineStage::Validated, start)?;

        let bitmap = self.decoder.decode_bytes(&upload.bytes)?;
        debug!(
            "Decoded {}x{} {:?}",
            bitmap.width(),
            bitmap.height(),
            bitmap.source_format()
        );
        self.advance(stage, PipelineStage::Decoded, start)?;

        let tensor = self.preprocessor.preprocess(&bitmap)?;
        self.advance(stage, PipelineStage::Preprocessed, start)?;

        let scores = self.engine.score(&tensor)?;
        self.advance(stage, PipelineStage::Scored, start)?;

        let result = self.formatter.format(&scores)?;
        *stage = PipelineStage::Formatted;
        Ok(result)
    }

    fn advance(
        &self,
        stage: &mut PipelineStage,
        next: PipelineStage,
        start: Instant,
    ) -> Result<(), PredictionError> {
        *stage = next;
        let elapsed = start.elapsed();
        debug!("Stage {} reached after {:.1} ms", next, elapsed.as_secs_f64() * 1000.0);

        match self.deadline {
            Some(limit) if elapsed >= limit => {
                Err(PredictionError::DeadlineExceeded(limit.as_millis() as u64))
            }
            _ => Ok(()),
        }
    }
}
