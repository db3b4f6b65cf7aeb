//! Gradient probe: activation and class-score gradient at one layer.

use authnet_core::{ImageClassifier, OutputHead};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::activation::ActivationCapture;
use crate::error::{ExplainError, Result};
use crate::selector::resolve_layer;

/// Which output value to differentiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetClass {
    /// The predicted class: argmax for softmax heads, the single score for
    /// sigmoid heads.
    #[default]
    Predicted,
    /// A forced output index.
    Index(usize),
}

impl TargetClass {
    /// Resolve to an output index given the activated outputs.
    pub fn resolve(&self, outputs: &[f32], head: OutputHead) -> Result<usize> {
        match *self {
            Self::Predicted => Ok(match head {
                OutputHead::Sigmoid => 0,
                OutputHead::Softmax { .. } => OutputHead::argmax(outputs),
            }),
            Self::Index(index) if index < outputs.len() => Ok(index),
            Self::Index(index) => Err(ExplainError::InvalidTargetClass {
                index,
                n_outputs: outputs.len(),
            }),
        }
    }
}

/// Activation and gradient at the probed layer.
#[derive(Debug, Clone)]
pub struct ProbeOutput<B: Backend> {
    /// Layer output `(1, C, h, w)`.
    pub activation: Tensor<B, 4>,
    /// Gradient of the selected score with respect to the activation.
    pub gradient: Tensor<B, 4>,
    /// Differentiated output index.
    pub class_index: usize,
    /// Value of the differentiated output.
    pub score: f32,
}

/// Runs one forward and one backward pass to read a layer's gradient.
///
/// Holds no state; the classifier is only borrowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientProbe;

impl GradientProbe {
    /// Create a probe.
    pub fn new() -> Self {
        Self
    }

    /// Probe `layer` for a single image.
    ///
    /// # Arguments
    ///
    /// * `model` - Classifier on an autodiff backend
    /// * `layer` - Name of a spatial layer
    /// * `input` - Prepared input of shape (1, C, H, W)
    /// * `target` - Output to differentiate
    ///
    /// # Errors
    ///
    /// - [`ExplainError::Core`] when the input violates the classifier contract
    /// - [`ExplainError::LayerLookupFailed`] when the layer is unknown or never reached
    /// - [`ExplainError::InvalidTargetClass`] for an out-of-range forced class
    /// - [`ExplainError::GradientUnavailable`] when no gradient reaches the layer
    pub fn probe<B, M>(
        &self,
        model: &M,
        layer: &str,
        input: Tensor<B, 4>,
        target: TargetClass,
    ) -> Result<ProbeOutput<B::InnerBackend>>
    where
        B: AutodiffBackend,
        M: ImageClassifier<B> + ?Sized,
    {
        let dims = input.dims();
        model.verify_input(dims)?;
        if dims[0] != 1 {
            return Err(ExplainError::ShapeMismatch(format!(
                "expected a single image, got batch of {}",
                dims[0]
            )));
        }
        resolve_layer(&model.layers(), layer)?;

        let mut capture = ActivationCapture::tracking(layer);
        let output = model.forward_with_hook(input, &mut capture);
        let activation = capture.take().ok_or_else(|| ExplainError::LayerLookupFailed {
            layer: layer.to_string(),
        })?;

        let outputs: Vec<f32> = output
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| ExplainError::Tensor(format!("{e:?}")))?;
        let class_index = target.resolve(&outputs, model.output_head())?;
        let score = outputs[class_index];

        // Backpropagate the single selected value.
        let grads = output
            .slice([0..1, class_index..class_index + 1])
            .sum()
            .backward();
        let gradient = activation
            .grad(&grads)
            .ok_or_else(|| ExplainError::GradientUnavailable {
                layer: layer.to_string(),
            })?;
        let activation = activation.inner();

        if gradient.dims() != activation.dims() {
            return Err(ExplainError::ShapeMismatch(format!(
                "gradient {:?} does not match activation {:?}",
                gradient.dims(),
                activation.dims()
            )));
        }

        tracing::debug!(layer, class_index, score, dims = ?activation.dims(), "Probed layer");
        Ok(ProbeOutput {
            activation,
            gradient,
            class_index,
            score,
        })
    }

    /// Output of `layer` for `input`, without gradients.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::LayerLookupFailed`] when the layer is unknown
    /// or never reached.
    pub fn activation_at<B, M>(&self, model: &M, layer: &str, input: Tensor<B, 4>) -> Result<Tensor<B, 4>>
    where
        B: Backend,
        M: ImageClassifier<B> + ?Sized,
    {
        model.verify_input(input.dims())?;
        resolve_layer(&model.layers(), layer)?;

        let mut capture = ActivationCapture::new(layer);
        let _ = model.forward_with_hook(input, &mut capture);
        capture.take().ok_or_else(|| ExplainError::LayerLookupFailed {
            layer: layer.to_string(),
        })
    }
}
