//! # authnet_core
//!
//! Core types and traits for authnet real/fake image classification.
//!
//! This crate provides:
//! - [`ImageShape`] for a classifier's declared input contract
//! - [`LayerInfo`], [`LayerKind`] and [`ModelFamily`] for layer introspection
//! - [`ImageClassifier`] and [`ActivationHook`], the classifier adapter seam
//! - [`ServiceConfig`] and friends, the explicit startup configuration
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Image tensors follow burn's convention `(N, C, H, W)`:
//! - `N`: Batch size (always 1 for a single upload)
//! - `C`: Channels (3 for RGB)
//! - `H`, `W`: Height and width in pixels
//!
//! ## Example
//!
//! ```rust,ignore
//! use authnet_core::{ImageClassifier, ImageShape};
//!
//! let shape = model.input_shape();
//! let x = Tensor::zeros(shape.as_nchw(1), &device);
//! let probs = model.forward(x);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod layer;
mod model_trait;
mod shape;

pub use config::{
    ExplainConfig, ModelSpec, PreprocessConfig, ServerConfig, ServiceConfig, DEFAULT_INTENSITY,
    DEFAULT_JPEG_QUALITY, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_THRESHOLD,
};
pub use error::{CoreError, Result};
pub use layer::{LayerInfo, LayerKind, ModelFamily};
pub use model_trait::{ActivationHook, ImageClassifier, NoopHook, OutputHead};
pub use shape::ImageShape;

/// Backend type aliases for convenience
pub mod backend {
    pub use burn_autodiff::Autodiff;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::{NdArray, NdArrayDevice};

    #[cfg(feature = "backend-wgpu")]
    pub use burn_wgpu::Wgpu;

    /// Backend used for inference and explanations on the CPU.
    #[cfg(feature = "backend-ndarray")]
    pub type CpuBackend = Autodiff<NdArray>;
}
