//! # authnet_models
//!
//! Real/fake image classifiers for authnet.
//!
//! ## Families
//! - [`AuthCnn`] (`cnn`) - plain Conv/ReLU/MaxPool stack
//! - [`Vgg16`] (`vgg`) - VGG16 blocks with a dense head
//! - [`EffNet`] (`effnet`) - EfficientNet-style MBConv network ending in `top_conv`
//!
//! ## Serving
//! - [`build_classifier`] / [`load_models`] - construct models from configuration
//! - [`checkpoint`] - weights plus a metadata sidecar carrying the input contract
//! - [`classify`] / [`predict`] - thresholded real/fake decisions

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod cnn;
pub mod error;
pub mod layers;
pub mod predict;
pub mod registry;

pub use checkpoint::{
    load_checkpoint, load_record, metadata_path, save_model, save_record, weights_path,
    CheckpointMetadata,
};
pub use cnn::*;
pub use error::{ModelError, Result};
pub use layers::FrozenBatchNorm;
pub use predict::{
    classify, predict, validate_threshold, Classification, Sensitivity, Verdict, CLASS_LABELS,
    MAX_THRESHOLD, MIN_THRESHOLD,
};
pub use registry::{build_classifier, init_classifier, load_models, AnyClassifier, ModelSet};
