//! Error types for mask refinement and compositing operations

use thiserror::Error;

/// Result type alias for compositing operations
pub type Result<T> = std::result::Result<T, BgComposeError>;

/// Error types for the refinement and compositing pipeline and its collaborators
#[derive(Error, Debug)]
pub enum BgComposeError {
    /// Mask, image, or background sizes disagree
    #[error("Dimension mismatch ({context}): expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    DimensionMismatch {
        context: String,
        /// Expected (width, height)
        expected: (u32, u32),
        /// Actual (width, height)
        actual: (u32, u32),
    },

    /// Mask value outside [0, 1] (or not finite) at construction time
    #[error("Invalid mask value {value} at row {row}, column {col}: values must lie in [0, 1]")]
    InvalidMaskValue { row: usize, col: usize, value: f32 },

    /// Gaussian kernel size is zero or even
    #[error("Invalid blur kernel: {0}")]
    InvalidBlurKernel(String),

    /// Image buffer does not match its declared geometry
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unsupported file format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// No mask source is available for the requested image
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Mask prediction failed
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Settings (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic processing failure
    #[error("Processing error: {0}")]
    Processing(String),
}

impl BgComposeError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference failure
    pub fn inference_failed<S: Into<String>>(msg: S) -> Self {
        Self::InferenceFailed(msg.into())
    }

    /// Create a new missing-model error
    pub fn model_not_found<S: Into<String>>(msg: S) -> Self {
        Self::ModelNotFound(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a dimension mismatch error; sizes are (width, height)
    pub fn dimension_mismatch<S: Into<String>>(
        context: S,
        expected: (u32, u32),
        actual: (u32, u32),
    ) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}
