//! Inference Engine Implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image_pipeline::{InputTensor, MODEL_INPUT_SIZE};
use tracing::{debug, info, warn};

use crate::backend::{ModelFormat, ScoringBackend, StubBackend, TractBackend};
use crate::catalog::ClassCatalog;
use crate::InferenceError;

/// Tolerance on the output sum before scores are treated as logits
const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

/// Default `[1, 224, 224, 3]` input shape
fn default_input_shape() -> [usize; 4] {
    [1, MODEL_INPUT_SIZE as usize, MODEL_INPUT_SIZE as usize, 3]
}

/// Loaded model plus its descriptors. Immutable once built.
pub struct ModelHandle {
    backend: Box<dyn ScoringBackend>,
    source: PathBuf,
    load_time: Duration,
}

impl ModelHandle {
    /// Load the model file at `path`, pinning its input to `input_shape`
    pub fn load(path: impl AsRef<Path>, input_shape: [usize; 4]) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let start = Instant::now();
        let backend = TractBackend::load(path, input_shape)?;
        let load_time = start.elapsed();

        info!(
            "Model loaded from {} in {:.2}s (input={:?})",
            path.display(),
            load_time.as_secs_f64(),
            backend.input_shape()
        );

        Ok(Self {
            backend: Box::new(backend),
            source: path.to_path_buf(),
            load_time,
        })
    }

    /// Wrap an already constructed backend
    pub fn from_backend(backend: Box<dyn ScoringBackend>, source: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            source: source.into(),
            load_time: Duration::ZERO,
        }
    }

    /// Declared input shape
    pub fn input_shape(&self) -> &[usize] {
        self.backend.input_shape()
    }

    /// Declared output length, if known
    pub fn output_len(&self) -> Option<usize> {
        self.backend.output_len()
    }

    /// Model format
    pub fn format(&self) -> ModelFormat {
        self.backend.format()
    }

    /// Path the model was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Time spent loading and planning the model
    pub fn load_time(&self) -> Duration {
        self.load_time
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("format", &self.format())
            .field("source", &self.source)
            .field("input_shape", &self.input_shape())
            .field("output_len", &self.output_len())
            .finish()
    }
}

/// Probability vector aligned with the class catalog
#[derive(Debug, Clone, PartialEq)]
pub struct RawScores(Vec<f32>);

impl RawScores {
    /// Wrap a score vector
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    /// Scores in catalog order
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of scores
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the vector is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index and value of the first maximum
    pub fn argmax(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &score) in self.0.iter().enumerate() {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((i, score)),
            }
        }
        best
    }
}

/// Classifier front-end. Holds the shared model handle, or nothing when the
/// startup load failed.
#[derive(Debug, Clone, Default)]
pub struct InferenceEngine {
    handle: Option<Arc<ModelHandle>>,
}

impl InferenceEngine {
    /// Create an engine around a loaded model
    pub fn new(handle: ModelHandle) -> Self {
        Self::from_shared(Arc::new(handle))
    }

    /// Create an engine around a shared model
    pub fn from_shared(handle: Arc<ModelHandle>) -> Self {
        let catalog_len = ClassCatalog::rice_leaf().len();
        if let Some(len) = handle.output_len() {
            if len != catalog_len {
                warn!(
                    "Model declares {} outputs but the catalog has {} classes",
                    len, catalog_len
                );
            }
        }
        Self {
            handle: Some(handle),
        }
    }

    /// Engine with no model; every `score` call fails with `ModelNotLoaded`
    pub fn unloaded() -> Self {
        Self { handle: None }
    }

    /// Engine backed by the deterministic stub model
    pub fn stub() -> Self {
        info!("Creating stub inference engine");
        let backend = StubBackend::new(default_input_shape(), ClassCatalog::rice_leaf().len());
        Self::new(ModelHandle::from_backend(Box::new(backend), "stub"))
    }

    /// Load the model at `path` with the default input shape
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        ModelHandle::load(path, default_input_shape()).map(Self::new)
    }

    /// Check if a model is loaded
    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Loaded model, if any
    pub fn handle(&self) -> Option<&ModelHandle> {
        self.handle.as_deref()
    }

    /// Score one input tensor
    pub fn score(&self, input: &InputTensor) -> Result<RawScores, InferenceError> {
        let handle = self.handle.as_ref().ok_or(InferenceError::ModelNotLoaded)?;

        if handle.input_shape() != input.shape() {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{:?}", handle.input_shape()),
                actual: format!("{:?}", input.shape()),
            });
        }

        let start = Instant::now();
        let raw = handle.backend.run(input)?;
        debug!("Inference completed in {:.3}s", start.elapsed().as_secs_f64());

        to_probabilities(raw).map(RawScores)
    }
}

/// Pass probability vectors through; softmax anything else
fn to_probabilities(raw: Vec<f32>) -> Result<Vec<f32>, InferenceError> {
    if raw.is_empty() {
        return Err(InferenceError::InferenceFailed("model produced no scores".to_string()));
    }
    if raw.iter().any(|s| !s.is_finite()) {
        return Err(InferenceError::InferenceFailed(
            "model produced non-finite scores".to_string(),
        ));
    }

    let sum: f32 = raw.iter().sum();
    if raw.iter().all(|s| *s >= 0.0) && (sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE {
        return Ok(raw);
    }

    debug!("Model output is not a distribution (sum={}), applying softmax", sum);
    let max = raw.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / total).collect())
}
