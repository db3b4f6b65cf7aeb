//! # authnet
//!
//! Real/fake image classification with Grad-CAM explanations, built on Burn.
//!
//! authnet provides:
//!
//! - **Core**: image shapes, layer introspection, the classifier adapter and
//!   the service configuration
//! - **Transforms**: upload decoding and model-input preprocessing
//! - **Models**: CNN, VGG16 and EfficientNet-style classifiers, checkpoints
//!   and real/fake verdicts
//! - **Explain**: target-layer selection, gradient probing, heatmap synthesis
//!   and overlay compositing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use authnet::prelude::*;
//!
//! let device = Default::default();
//! let config = ServiceConfig::load("authnet.json")?;
//! let model = build_classifier::<CpuBackend>(&config.models["effnet"], &device)?;
//!
//! let image = decode_rgb(&std::fs::read("photo.jpg")?)?;
//! let preprocessor = Preprocessor::new(config.preprocess.clone());
//! let input = preprocessor.prepare_for(&image, model.input_shape(), &device)?;
//! let verdict = predict(&model, input, config.default_threshold)?;
//!
//! let heatmap = GradCamExplainer::new(config.explain.clone())
//!     .explain_best_effort(&model, &image, &preprocessor, TargetClass::Predicted, &device);
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray
//! - `backend-wgpu`: GPU backend using WGPU

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use authnet_core as core;
pub use authnet_explain as explain;
pub use authnet_models as models;
pub use authnet_transforms as transforms;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use authnet::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use authnet_core::{
        ActivationHook, ExplainConfig, ImageClassifier, ImageShape, LayerInfo, LayerKind,
        ModelFamily, ModelSpec, OutputHead, PreprocessConfig, ServiceConfig,
    };

    // Transforms
    pub use authnet_transforms::{decode_rgb, Preprocessor};

    // Models
    pub use authnet_models::{
        build_classifier, init_classifier, load_models, predict, save_model, AnyClassifier,
        AuthCnn, AuthCnnConfig, Classification, EffNet, EffNetConfig, Vgg16, Vgg16Config,
        Verdict,
    };

    // Explain
    pub use authnet_explain::{
        select_target_layer, ExplainError, Explanation, GradCamExplainer, Heatmap, TargetClass,
    };

    #[cfg(feature = "backend-ndarray")]
    pub use authnet_core::backend::CpuBackend;
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    // Additional exports
    pub use authnet_core::backend;
    pub use authnet_explain::{
        blend, colorize_values, composite, encode_jpeg_base64, jet, resize_heatmap, synthesize_heatmap,
        ActivationCapture, GradientProbe, ProbeOutput, PREFERRED_TARGET_LAYER,
    };
    pub use authnet_models::{
        classify, load_checkpoint, validate_threshold, CheckpointMetadata, ModelError, ModelSet,
        Sensitivity,
    };
}
