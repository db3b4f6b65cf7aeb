//! Error types for authnet_models.

use std::path::PathBuf;

use authnet_core::{CoreError, ModelFamily};
use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building, loading or running classifiers.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Architecture configuration cannot produce a working network.
    #[error("Invalid model config: {0}")]
    InvalidConfig(String),

    /// The family has no constructible architecture.
    #[error("Model family '{0}' cannot be constructed from a model spec")]
    UnsupportedFamily(ModelFamily),

    /// Checkpoint weights could not be written or read.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// The checkpoint has no metadata sidecar.
    #[error("Checkpoint metadata not found at {}", .0.display())]
    MissingMetadata(PathBuf),

    /// A checkpoint does not match the declared model contract.
    #[error("Checkpoint contract mismatch on {what}: expected {expected}, got {got}")]
    ContractMismatch {
        /// Which part of the contract differs.
        what: &'static str,
        /// Declared value.
        expected: String,
        /// Value recorded in the checkpoint.
        got: String,
    },

    /// Decision threshold outside `[0.1, 0.9]`.
    #[error("Threshold must be between 0.1 and 0.9, got {0}")]
    InvalidThreshold(f32),

    /// Classifier output does not fit its declared head.
    #[error("Output mismatch: expected {expected} values, got {got}")]
    OutputMismatch {
        /// Width declared by the head.
        expected: usize,
        /// Width actually produced.
        got: usize,
    },

    /// Tensor data could not be read back.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Core error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
