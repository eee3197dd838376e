//! Error types for the trail engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while loading frames or running a job.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to open frame source {path}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame source produced no frames")]
    EmptySource,

    #[error("Failed to decode frame {index}: {message}")]
    FrameDecode { index: usize, message: String },

    #[error("Frame {index} is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        index: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("A job is already running")]
    JobAlreadyRunning,

    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),
}

impl EngineError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a per-object extraction error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    /// Create a frame decode error.
    pub fn frame_decode(index: usize, message: impl Into<String>) -> Self {
        Self::FrameDecode {
            index,
            message: message.into(),
        }
    }

    /// Source and configuration errors abort a job; everything else is
    /// either recovered locally or a runtime failure.
    pub fn is_fatal_to_job(&self) -> bool {
        !matches!(self, Self::Extraction(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_errors_are_recoverable() {
        assert!(!EngineError::extraction("no contour").is_fatal_to_job());
        assert!(EngineError::EmptySource.is_fatal_to_job());
        assert!(EngineError::invalid_config("max_size").is_fatal_to_job());
    }

    #[test]
    fn messages_name_the_frame() {
        let err = EngineError::DimensionMismatch {
            index: 3,
            expected: (20, 20),
            actual: (10, 20),
        };
        assert_eq!(err.to_string(), "Frame 3 is (10, 20), expected (20, 20)");
    }
}
