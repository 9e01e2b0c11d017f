//! Scoring backends: tract-backed models and a deterministic stub

use std::fmt;
use std::path::Path;

use image_pipeline::InputTensor;
use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::InferenceError;

/// On-disk model format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// TensorFlow Lite flatbuffer
    Tflite,
    /// ONNX protobuf
    Onnx,
    /// In-process stub, no model file
    Stub,
}

impl ModelFormat {
    /// Infer the format from a model file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tflite" => Some(ModelFormat::Tflite),
            "onnx" => Some(ModelFormat::Onnx),
            _ => None,
        }
    }

    /// Display name used by the API
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::Tflite => "TFLite",
            ModelFormat::Onnx => "ONNX",
            ModelFormat::Stub => "Stub",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded scoring function.
///
/// Implementations must be safe to call from several threads at once and must
/// not carry state between calls.
pub trait ScoringBackend: Send + Sync {
    /// Format of the underlying model
    fn format(&self) -> ModelFormat;

    /// Declared input shape
    fn input_shape(&self) -> &[usize];

    /// Declared output length, when the model states it
    fn output_len(&self) -> Option<usize>;

    /// Run the model on one input tensor, returning the flattened first output
    fn run(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError>;
}

type Plan = TypedRunnableModel<TypedModel>;

/// tract runnable plan. `SimplePlan::run` builds a fresh state per call, so the
/// plan is shared across threads without locking.
pub struct TractBackend {
    plan: Plan,
    format: ModelFormat,
    input_shape: Vec<usize>,
    output_len: Option<usize>,
}

fn load_err(e: impl fmt::Display) -> InferenceError {
    InferenceError::ModelLoadError(e.to_string())
}

impl TractBackend {
    /// Load, optimize and plan the model at `path`
    pub fn load(path: &Path, input_shape: [usize; 4]) -> Result<Self, InferenceError> {
        if !path.is_file() {
            return Err(InferenceError::ModelLoadError(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        let format = ModelFormat::from_path(path).ok_or_else(|| {
            InferenceError::ModelLoadError(format!(
                "unsupported model format: {} (expected .tflite or .onnx)",
                path.display()
            ))
        })?;

        info!("Loading {} model from {}", format, path.display());

        let typed = match format {
            ModelFormat::Onnx => tract_onnx::onnx()
                .model_for_path(path)
                .and_then(|m| {
                    m.with_input_fact(
                        0,
                        InferenceFact::dt_shape(f32::datum_type(), tvec!(
                            input_shape[0],
                            input_shape[1],
                            input_shape[2],
                            input_shape[3]
                        )),
                    )
                })
                .and_then(|m| m.into_optimized())
                .map_err(load_err)?,
            ModelFormat::Tflite => Self::load_tflite(path)?,
            ModelFormat::Stub => {
                return Err(InferenceError::ModelLoadError(
                    "stub models are not loaded from disk".to_string(),
                ))
            }
        };

        let plan = typed.into_runnable().map_err(load_err)?;

        let declared_input = plan
            .model()
            .input_fact(0)
            .map_err(load_err)?
            .shape
            .as_concrete()
            .map(|s| s.to_vec())
            .unwrap_or_else(|| input_shape.to_vec());

        let output_len = plan
            .model()
            .output_fact(0)
            .map_err(load_err)?
            .shape
            .as_concrete()
            .map(|s| s.iter().product());

        debug!(
            "Model plan ready: input={:?}, output_len={:?}",
            declared_input, output_len
        );

        Ok(Self {
            plan,
            format,
            input_shape: declared_input,
            output_len,
        })
    }

    #[cfg(feature = "tflite")]
    fn load_tflite(path: &Path) -> Result<TypedModel, InferenceError> {
        tract_tflite::tflite()
            .model_for_path(path)
            .and_then(|m| m.into_optimized())
            .map_err(load_err)
    }

    #[cfg(not(feature = "tflite"))]
    fn load_tflite(path: &Path) -> Result<TypedModel, InferenceError> {
        Err(InferenceError::ModelLoadError(format!(
            "{}: TFLite support is disabled in this build",
            path.display()
        )))
    }
}

impl ScoringBackend for TractBackend {
    fn format(&self) -> ModelFormat {
        self.format
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_len(&self) -> Option<usize> {
        self.output_len
    }

    fn run(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        let failed = |e: TractError| InferenceError::InferenceFailed(e.to_string());

        let tensor = Tensor::from_shape::<f32>(input.shape(), input.as_slice()).map_err(failed)?;
        let outputs = self.plan.run(tvec!(tensor.into())).map_err(failed)?;
        let first = outputs
            .first()
            .ok_or_else(|| InferenceError::InferenceFailed("model produced no outputs".to_string()))?;
        let scores = first.cast_to::<f32>().map_err(failed)?;
        let scores = scores.as_slice::<f32>().map_err(failed)?.to_vec();
        Ok(scores)
    }
}

/// Per-class weights over the (R, G, B) channel means used by [`StubBackend`]
const STUB_WEIGHTS: [[f32; 3]; 4] = [
    [1.0, 1.0, -1.0],  // yellowing
    [0.5, -1.0, 0.5],  // grey lesions
    [1.0, -0.5, -1.0], // brown
    [-1.0, 1.5, -1.0], // green
];

/// Deterministic stand-in for a real model.
///
/// Scores are a softmax over a fixed linear map of the per-channel means of the
/// input, so identical inputs always yield identical probabilities.
#[derive(Debug, Clone)]
pub struct StubBackend {
    input_shape: Vec<usize>,
    classes: usize,
}

impl StubBackend {
    /// Stub accepting `input_shape` and producing `classes` scores
    pub fn new(input_shape: [usize; 4], classes: usize) -> Self {
        Self {
            input_shape: input_shape.to_vec(),
            classes,
        }
    }
}

impl ScoringBackend for StubBackend {
    fn format(&self) -> ModelFormat {
        ModelFormat::Stub
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_len(&self) -> Option<usize> {
        Some(self.classes)
    }

    fn run(&self, input: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        let data = input.as_slice();
        if data.is_empty() {
            return Err(InferenceError::InferenceFailed("empty input tensor".to_string()));
        }

        let mut sums = [0f64; 3];
        for px in data.chunks_exact(3) {
            for (sum, v) in sums.iter_mut().zip(px) {
                *sum += *v as f64;
            }
        }
        let count = (data.len() / 3).max(1) as f64;
        let means = sums.map(|s| s / count);
        let scale = means.iter().map(|m| m.abs()).sum::<f64>() + 1e-6;

        let logits: Vec<f64> = (0..self.classes)
            .map(|k| {
                let w = STUB_WEIGHTS[k % STUB_WEIGHTS.len()];
                4.0 * (0..3).map(|c| w[c] as f64 * means[c] / scale).sum::<f64>()
            })
            .collect();

        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        Ok(exps.iter().map(|e| (e / total) as f32).collect())
    }
}
