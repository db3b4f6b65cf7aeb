//! Grad-CAM explainer.
//!
//! Runs the whole pipeline for one request: select the target layer, probe
//! it, synthesize the heatmap, composite it over the original upload and
//! encode the result.
//!
//! # Example
//!
//! ```rust,ignore
//! use authnet_explain::{GradCamExplainer, TargetClass};
//!
//! let explainer = GradCamExplainer::new(ExplainConfig::default());
//! let heatmap = explainer.explain_best_effort(&model, &image, &preprocessor, TargetClass::Predicted, &device);
//! ```

use authnet_core::{ExplainConfig, ImageClassifier};
use authnet_transforms::Preprocessor;
use burn::tensor::backend::AutodiffBackend;
use image::RgbImage;

use crate::error::{ExplainError, Result};
use crate::heatmap::{synthesize_heatmap, Heatmap};
use crate::overlay::{composite, encode_jpeg_base64};
use crate::probe::{GradientProbe, TargetClass};
use crate::selector::{resolve_layer, select_target_layer};

/// A rendered explanation.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Probed layer.
    pub layer: String,
    /// Differentiated output index.
    pub class_index: usize,
    /// Value of the differentiated output.
    pub score: f32,
    /// Normalized heatmap at feature-map resolution.
    pub heatmap: Heatmap,
    /// Base64 JPEG of the composite at the original resolution.
    pub image_base64: String,
}

/// Grad-CAM explainer.
///
/// Holds only rendering settings, so one instance can serve concurrent
/// requests against any number of classifiers.
#[derive(Debug, Clone, Default)]
pub struct GradCamExplainer {
    config: ExplainConfig,
    probe: GradientProbe,
}

impl GradCamExplainer {
    /// Create an explainer.
    pub fn new(config: ExplainConfig) -> Self {
        Self {
            config,
            probe: GradientProbe::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    /// Explain a classifier's decision on `original`.
    ///
    /// The target layer is chosen with [`select_target_layer`].
    pub fn explain<B, M>(
        &self,
        model: &M,
        original: &RgbImage,
        preprocessor: &Preprocessor,
        target: TargetClass,
        device: &B::Device,
    ) -> Result<Explanation>
    where
        B: AutodiffBackend,
        M: ImageClassifier<B> + ?Sized,
    {
        let layer = select_target_layer(&model.layers(), model.family())?;
        self.explain_layer(model, &layer.name, original, preprocessor, target, device)
    }

    /// Explain using an explicitly named layer.
    pub fn explain_layer<B, M>(
        &self,
        model: &M,
        layer: &str,
        original: &RgbImage,
        preprocessor: &Preprocessor,
        target: TargetClass,
        device: &B::Device,
    ) -> Result<Explanation>
    where
        B: AutodiffBackend,
        M: ImageClassifier<B> + ?Sized,
    {
        if !(0.0..=1.0).contains(&self.config.intensity) {
            return Err(ExplainError::InvalidIntensity(self.config.intensity));
        }
        resolve_layer(&model.layers(), layer)?;

        let input = preprocessor.prepare_for::<B>(original, model.input_shape(), device)?;
        let probed = self.probe.probe(model, layer, input, target)?;
        let heatmap = synthesize_heatmap(probed.activation, probed.gradient)?;
        let rendered = composite(original, &heatmap, &self.config)?;
        let image_base64 = encode_jpeg_base64(&rendered, self.config.jpeg_quality)?;

        tracing::info!(
            family = %model.family(),
            layer,
            class_index = probed.class_index,
            score = probed.score,
            heatmap = ?(heatmap.height(), heatmap.width()),
            "Generated Grad-CAM explanation"
        );

        Ok(Explanation {
            layer: layer.to_string(),
            class_index: probed.class_index,
            score: probed.score,
            heatmap,
            image_base64,
        })
    }

    /// Explain, turning any failure into `None` with a logged reason.
    ///
    /// A failed explanation never fails the surrounding request.
    pub fn explain_best_effort<B, M>(
        &self,
        model: &M,
        original: &RgbImage,
        preprocessor: &Preprocessor,
        target: TargetClass,
        device: &B::Device,
    ) -> Option<String>
    where
        B: AutodiffBackend,
        M: ImageClassifier<B> + ?Sized,
    {
        match self.explain(model, original, preprocessor, target, device) {
            Ok(explanation) => Some(explanation.image_base64),
            Err(e) => {
                tracing::warn!(
                    family = %model.family(),
                    reason = e.reason(),
                    error = %e,
                    "Grad-CAM explanation unavailable"
                );
                None
            }
        }
    }
}
