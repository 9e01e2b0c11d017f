//! Leaf Disease Inference Engine
//!
//! Owns the loaded classifier and turns model input tensors into ranked,
//! human-readable predictions.

mod backend;
mod catalog;
mod engine;
mod formatter;

pub use backend::{ModelFormat, ScoringBackend, StubBackend, TractBackend};
pub use catalog::{ClassCatalog, LeafDisease};
pub use engine::{InferenceEngine, ModelHandle, RawScores};
pub use formatter::{ClassBreakdown, PredictionResult, ResultFormatter};

use thiserror::Error;

/// Errors during model loading, inference and result formatting
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Model not loaded")]
    ModelNotLoaded,
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Model produced {outputs} scores but the catalog has {classes} classes")]
    UnknownClass { outputs: usize, classes: usize },
}
