//! Error types for authnet_explain.

use authnet_core::{CoreError, ModelFamily};
use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Reasons an explanation could not be produced.
///
/// None of these are request-level failures: the explainer boundary turns
/// every one of them into "no heatmap" plus a logged reason.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// The classifier has no convolution layer to probe.
    #[error("No convolutional layer found in {family} classifier")]
    NoConvolutionalLayer {
        /// Family of the classifier.
        family: ModelFamily,
    },

    /// Backpropagation produced no gradient at the target layer.
    #[error("No gradient reached layer '{layer}'")]
    GradientUnavailable {
        /// Probed layer.
        layer: String,
    },

    /// Every rectified importance value is zero.
    #[error("Degenerate heatmap: maximum rectified importance is {max}")]
    DegenerateHeatmap {
        /// Maximum value before normalization.
        max: f32,
    },

    /// The named layer does not exist on the classifier.
    #[error("Layer '{layer}' not found on classifier")]
    LayerLookupFailed {
        /// Requested layer.
        layer: String,
    },

    /// Overlay intensity outside `[0, 1]`.
    #[error("Intensity must be in [0, 1], got {0}")]
    InvalidIntensity(f32),

    /// Forced class index outside the output head.
    #[error("Target class {index} out of range for {n_outputs} outputs")]
    InvalidTargetClass {
        /// Requested class.
        index: usize,
        /// Width of the output head.
        n_outputs: usize,
    },

    /// Tensors or images with incompatible shapes.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Tensor data could not be read back.
    #[error("Tensor data error: {0}")]
    Tensor(String),

    /// The composite could not be encoded.
    #[error("Encoding error: {0}")]
    Encode(String),

    /// Core error (input contract, preprocessing).
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ExplainError {
    /// Short stable tag for logs and responses.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoConvolutionalLayer { .. } => "no_convolutional_layer",
            Self::GradientUnavailable { .. } => "gradient_unavailable",
            Self::DegenerateHeatmap { .. } => "degenerate_heatmap",
            Self::LayerLookupFailed { .. } => "layer_lookup_failed",
            Self::InvalidIntensity(_) => "invalid_intensity",
            Self::InvalidTargetClass { .. } => "invalid_target_class",
            Self::ShapeMismatch(_) => "shape_mismatch",
            Self::Tensor(_) => "tensor_error",
            Self::Encode(_) => "encode_error",
            Self::Core(_) => "input_error",
        }
    }
}
