//! Error types for authnet_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur in authnet_core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid tensor shape provided.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Dimension error.
    #[error("Dimension error: expected {expected} dimensions, got {got}")]
    DimensionError {
        /// Expected number of dimensions.
        expected: usize,
        /// Actual number of dimensions.
        got: usize,
    },

    /// Image decoding or preprocessing error.
    #[error("Transform error: {0}")]
    TransformError(String),

    /// Unrecognized model family tag.
    #[error("Unknown model family '{0}' (expected one of: cnn, vgg, effnet, generic)")]
    UnknownFamily(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
