//! Error handling for stemeval
//!
//! Shape and coverage errors are caller errors and abort the current
//! track only. Numerical degeneracy is never reported here; the DSP
//! stages recover from it locally.

use thiserror::Error;

use crate::dsp::Source;

/// Result type alias for stemeval operations
pub type Result<T> = std::result::Result<T, EvalError>;

/// Main error type for stemeval operations
#[derive(Error, Debug)]
pub enum EvalError {
    // File Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Shape / coverage errors
    #[error("Missing reference for source '{stem}'")]
    MissingSource { stem: Source },

    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error("Channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Sample rate mismatch: expected {expected} Hz, got {actual} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    // Dataset
    #[error("Dataset error: {reason}")]
    DatasetError { reason: String },

    // Configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvalError {
    /// Shorthand for a shape mismatch between two tensors
    pub fn shape_mismatch(context: impl Into<String>, expected: [usize; 3], actual: [usize; 3]) -> Self {
        EvalError::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            EvalError::FileNotFound { .. } => "FILE_NOT_FOUND",
            EvalError::InvalidAudio { .. } => "INVALID_AUDIO",
            EvalError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            EvalError::MissingSource { .. } => "MISSING_SOURCE",
            EvalError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            EvalError::ChannelMismatch { .. } => "CHANNEL_MISMATCH",
            EvalError::SampleRateMismatch { .. } => "SAMPLE_RATE_MISMATCH",
            EvalError::DatasetError { .. } => "DATASET_ERROR",
            EvalError::InvalidConfig { .. } => "INVALID_CONFIG",
            EvalError::Io(_) => "IO_ERROR",
            EvalError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if a batch can continue with the next track after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EvalError::InvalidConfig { .. })
    }

    /// Returns a suggested recovery action for this error
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            EvalError::FileNotFound { .. } => "Check the dataset root and subset name",
            EvalError::InvalidAudio { .. } => "Re-export the stem as a WAV file",
            EvalError::UnsupportedFormat { .. } => "Convert to 16/24-bit PCM or 32-bit float WAV",
            EvalError::MissingSource { .. } => {
                "Every track needs vocals, drums, bass and other stems"
            }
            EvalError::ShapeMismatch { .. } => "Make sure all stems have the mixture's length",
            EvalError::ChannelMismatch { .. } => "Only stereo tracks are supported",
            EvalError::SampleRateMismatch { .. } => "Resample stems to the mixture's rate",
            EvalError::InvalidConfig { .. } => "Fix the configuration file or CLI flags",
            _ => "Check the error details and try again",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = EvalError::MissingSource { stem: Source::Bass };
        assert_eq!(err.error_code(), "MISSING_SOURCE");
        assert_eq!(err.to_string(), "Missing reference for source 'bass'");
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = EvalError::shape_mismatch("mask", [2, 513, 10], [2, 513, 9]);
        assert!(err.to_string().contains("[2, 513, 9]"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_config_errors_are_fatal() {
        let err = EvalError::InvalidConfig {
            reason: "hop must be positive".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(!err.recovery_hint().is_empty());
    }
}
