//! Upload Validation
//!
//! Lightweight checks applied to an uploaded image before any decoding work:
//! the declared filename must carry an allowed extension and the payload must
//! fit under the configured size ceiling.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{UploadedImage, ValidationConfig, Validator, ALLOWED_EXTENSIONS, MAX_UPLOAD_BYTES};
