//! Resizing and normalization into the model input tensor

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DecodedBitmap, ImageProcessingError, InputTensor};

/// Edge length of the square model input
pub const MODEL_INPUT_SIZE: u32 = 224;

/// ImageNet channel means (RGB, 0..1 scale)
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB, 0..1 scale)
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Pixel normalization scheme the model was trained with.
///
/// A mismatch does not fail, it silently degrades predictions, so the scheme
/// is fixed per deployed model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Keras EfficientNet: raw 0..255 values; rescaling lives inside the model graph
    #[default]
    EfficientNet,
    /// Scale to [-1, 1] (`x / 127.5 - 1`)
    Tf,
    /// Scale to [0, 1], then subtract ImageNet mean and divide by std per channel
    Torch,
}

impl Normalization {
    /// Normalize one 8-bit channel value
    #[inline]
    pub fn apply(&self, channel: usize, value: u8) -> f32 {
        let v = value as f32;
        match self {
            Normalization::EfficientNet => v,
            Normalization::Tf => v / 127.5 - 1.0,
            Normalization::Torch => (v / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
        }
    }

    /// Lowercase name used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Normalization::EfficientNet => "efficientnet",
            Normalization::Tf => "tf",
            Normalization::Torch => "torch",
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "efficientnet" => Ok(Normalization::EfficientNet),
            "tf" => Ok(Normalization::Tf),
            "torch" => Ok(Normalization::Torch),
            other => Err(format!("unknown preprocessing scheme: {other}")),
        }
    }
}

/// Converts decoded bitmaps into `[1, H, W, 3]` model input tensors
#[derive(Debug, Clone)]
pub struct Preprocessor {
    width: u32,
    height: u32,
    filter: FilterType,
    normalization: Normalization,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(Normalization::default())
    }
}

impl Preprocessor {
    /// 224x224 Lanczos3 preprocessor with the given normalization
    pub fn new(normalization: Normalization) -> Self {
        Self {
            width: MODEL_INPUT_SIZE,
            height: MODEL_INPUT_SIZE,
            filter: FilterType::Lanczos3,
            normalization,
        }
    }

    /// Override the target resolution
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Configured normalization scheme
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Shape of the tensors this preprocessor produces
    pub fn output_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }

    /// Resize, add the batch dimension and normalize
    pub fn preprocess(&self, bitmap: &DecodedBitmap) -> Result<InputTensor, ImageProcessingError> {
        if bitmap.width() == 0 || bitmap.height() == 0 {
            return Err(ImageProcessingError::Preprocess(format!(
                "cannot resize an empty {}x{} bitmap",
                bitmap.width(),
                bitmap.height()
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ImageProcessingError::Preprocess(format!(
                "invalid target size {}x{}",
                self.width, self.height
            )));
        }

        let resized = imageops::resize(bitmap.as_image(), self.width, self.height, self.filter);
        let (w, h) = (resized.width() as usize, resized.height() as usize);
        let raw = resized.as_raw();
        if raw.len() != w * h * 3 {
            return Err(ImageProcessingError::Preprocess(format!(
                "resized buffer has {} bytes, expected {}",
                raw.len(),
                w * h * 3
            )));
        }

        let norm = self.normalization;
        let array = Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
            norm.apply(c, raw[(y * w + x) * 3 + c])
        });

        debug!(
            "Preprocessed {}x{} -> {:?} ({})",
            bitmap.width(),
            bitmap.height(),
            array.dim(),
            norm
        );

        Ok(InputTensor::from_array(array))
    }
}
