//! Image Pipeline for Leaf Classification
//!
//! Turns an uploaded photograph into the tensor the classifier expects:
//! - Upload validation and decoding to a canonical RGB bitmap
//! - Resizing to the model's fixed input resolution
//! - Numeric normalization matching the model's training scheme

pub mod bitmap;
pub mod decoder;
pub mod preprocess;
pub mod tensor;

pub use bitmap::DecodedBitmap;
pub use decoder::ImageDecoder;
pub use preprocess::{Normalization, Preprocessor, MODEL_INPUT_SIZE};
pub use tensor::InputTensor;

use thiserror::Error;
use upload_validator::ValidationError;

/// Image pipeline error types
#[derive(Error, Debug)]
pub enum ImageProcessingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to preprocess image: {0}")]
    Preprocess(String),
}
