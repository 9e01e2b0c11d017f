//! Validation Error Types

use thiserror::Error;

/// Errors raised while validating an upload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Filename was present but empty
    #[error("Empty filename")]
    EmptyFilename,

    /// Filename has no `.ext` suffix
    #[error("Filename {0:?} has no extension")]
    MissingExtension(String),

    /// Extension is not in the allow-list
    #[error("Invalid file type: .{extension} (allowed: {allowed})")]
    InvalidFileType { extension: String, allowed: String },

    /// Payload exceeds the configured ceiling
    #[error("Payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
}

impl ValidationError {
    /// Whether the error is a file-type rejection (missing or disallowed extension)
    pub fn is_file_type(&self) -> bool {
        matches!(
            self,
            ValidationError::MissingExtension(_) | ValidationError::InvalidFileType { .. }
        )
    }
}
