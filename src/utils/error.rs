//! Error Handling Module
//!
//! Defines the error type for the CIFAR-10 experiment library.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::dataset::corpus::ImageShape;
use crate::training::history::EpochRecord;

/// Main error type for the experiment pipeline
#[derive(Error, Debug)]
pub enum CifarError {
    /// The upstream corpus could not be fetched and no local cache exists
    #[error("Corpus unavailable: {0}")]
    DataUnavailable(String),

    /// Dataset input shape is incompatible with the model's first layer
    #[error("Shape mismatch: model expects {expected}, data provides {found}")]
    ShapeMismatch {
        expected: ImageShape,
        found: ImageShape,
    },

    /// No example of a class exists in the sampled partition
    #[error("No examples of class {class} ({name}) in the validation partition")]
    EmptyClass { class: usize, name: String },

    /// Training produced a non-finite loss
    #[error("Training diverged during epoch {epoch} (last complete epoch: {})", describe_last(.last))]
    Diverged {
        epoch: usize,
        last: Option<EpochRecord>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

fn describe_last(last: &Option<EpochRecord>) -> String {
    match last {
        Some(record) => record.to_string(),
        None => "none".to_string(),
    }
}

/// Convenience Result type for the experiment library
pub type Result<T> = std::result::Result<T, CifarError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| CifarError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| CifarError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| CifarError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| CifarError::InvalidInput(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CifarError::DataUnavailable("no cache".to_string());
        assert_eq!(format!("{}", err), "Corpus unavailable: no cache");
    }

    #[test]
    fn test_shape_mismatch_display() {
        let err = CifarError::ShapeMismatch {
            expected: ImageShape::new(3, 32, 32),
            found: ImageShape::new(1, 28, 28),
        };
        let msg = err.to_string();
        assert!(msg.contains("3x32x32"));
        assert!(msg.contains("1x28x28"));
    }

    #[test]
    fn test_diverged_without_history() {
        let err = CifarError::Diverged { epoch: 1, last: None };
        assert!(err.to_string().contains("none"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read file");
        assert!(matches!(with_context, Err(CifarError::InvalidInput(_))));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        assert!(opt.context("Value was None").is_err());
    }
}
