//! Upload Validator for Filename and Size Checks

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default upload ceiling (10 MiB)
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Extensions accepted on the declared filename
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum payload size in bytes
    pub max_bytes: usize,
    /// Lowercase extensions accepted on the declared filename
    pub allowed_extensions: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl ValidationConfig {
    /// Default allow-list with a custom size ceiling
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ..Default::default()
        }
    }
}

/// Raw upload as received from the client
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Declared filename
    pub filename: String,
    /// Payload bytes
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    /// Create a new upload
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercased text after the last `.` of the filename, if any
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.filename)
    }
}

fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Validator for uploaded images
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Configured size ceiling
    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    /// Allow-list rendered for error messages, e.g. `png, jpg, jpeg, webp`
    pub fn allowed_list(&self) -> String {
        self.config.allowed_extensions.join(", ")
    }

    /// Validate the declared filename and return its normalized extension
    pub fn validate_filename(&self, filename: &str) -> Result<String, ValidationError> {
        if filename.is_empty() {
            return Err(ValidationError::EmptyFilename);
        }

        let extension = extension_of(filename)
            .ok_or_else(|| ValidationError::MissingExtension(filename.to_string()))?;

        if !self.config.allowed_extensions.iter().any(|e| *e == extension) {
            debug!("Rejected upload {:?}: extension .{} not allowed", filename, extension);
            return Err(ValidationError::InvalidFileType {
                extension,
                allowed: self.allowed_list(),
            });
        }

        Ok(extension)
    }

    /// Validate a payload size against the ceiling
    pub fn validate_size(&self, size: usize) -> Result<(), ValidationError> {
        if size > self.config.max_bytes {
            Err(ValidationError::PayloadTooLarge {
                size,
                max: self.config.max_bytes,
            })
        } else {
            Ok(())
        }
    }

    /// Validate a complete upload: filename first, then size
    pub fn validate(&self, upload: &UploadedImage) -> Result<String, ValidationError> {
        let extension = self.validate_filename(&upload.filename)?;
        self.validate_size(upload.len())?;
        Ok(extension)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}
