//! # authnet_explain
//!
//! Grad-CAM explanations for authnet classifiers.
//!
//! This crate provides:
//! - [`select_target_layer`] to pick the convolution layer to probe
//! - [`GradientProbe`] to read a layer's activation and class-score gradient
//! - [`synthesize_heatmap`] to turn them into a normalized [`Heatmap`]
//! - Overlay helpers ([`composite`], [`jet`], [`blend`], [`encode_jpeg_base64`])
//! - [`GradCamExplainer`], the per-request pipeline with a best-effort mode
//!
//! Probing needs an autodiff backend such as
//! [`CpuBackend`](authnet_core::backend::CpuBackend).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod activation;
mod error;
mod explainer;
mod heatmap;
mod overlay;
mod probe;
mod selector;

#[cfg(test)]
mod testing;

pub use activation::ActivationCapture;
pub use error::{ExplainError, Result};
pub use explainer::{Explanation, GradCamExplainer};
pub use heatmap::{synthesize_heatmap, Heatmap, DEGENERATE_EPSILON};
pub use overlay::{
    blend, colorize_values, composite, encode_jpeg_base64, jet, resize_heatmap,
    resize_values,
};
pub use probe::{GradientProbe, ProbeOutput, TargetClass};
pub use selector::{resolve_layer, select_target_layer, PREFERRED_TARGET_LAYER};
