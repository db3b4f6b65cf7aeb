//! Classifier adapter traits.
//!
//! Defines the capability contract every classifier must provide so that
//! predictions and explanations can run against it without knowing its
//! concrete architecture.

use burn::prelude::*;
use burn::tensor::activation::{sigmoid, softmax};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layer::{LayerInfo, ModelFamily};
use crate::shape::ImageShape;

/// Shape and activation of a classifier's final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputHead {
    /// A single sigmoid score, the probability of the positive class.
    Sigmoid,
    /// A softmax probability vector.
    Softmax {
        /// Number of classes.
        n_classes: usize,
    },
}

impl OutputHead {
    /// Head for a dense layer with `n_outputs` units.
    #[must_use]
    pub const fn for_outputs(n_outputs: usize) -> Self {
        if n_outputs <= 1 {
            Self::Sigmoid
        } else {
            Self::Softmax {
                n_classes: n_outputs,
            }
        }
    }

    /// Width of the output vector.
    #[must_use]
    pub const fn n_outputs(&self) -> usize {
        match self {
            Self::Sigmoid => 1,
            Self::Softmax { n_classes } => *n_classes,
        }
    }

    /// Index of the largest output; the first one wins ties.
    #[must_use]
    pub fn argmax(outputs: &[f32]) -> usize {
        outputs
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(best, best_value), (i, &value)| {
                if value > best_value {
                    (i, value)
                } else {
                    (best, best_value)
                }
            })
            .0
    }

    /// Apply the head activation to raw logits of shape `(batch, n_outputs)`.
    pub fn activate<B: Backend>(&self, logits: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::Sigmoid => sigmoid(logits),
            Self::Softmax { .. } => softmax(logits, 1),
        }
    }
}

/// Observer/rewriter of intermediate activations.
///
/// Classifiers pass the output of every named spatial layer through
/// [`ActivationHook::on_layer`] and continue the forward pass with the
/// returned tensor, which lets a caller read an activation or re-root the
/// computation graph at it.
pub trait ActivationHook<B: Backend> {
    /// Called with a layer name and its output `(N, C, H, W)`.
    fn on_layer(&mut self, name: &str, activation: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Hook that passes every activation through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl<B: Backend> ActivationHook<B> for NoopHook {
    fn on_layer(&mut self, _name: &str, activation: Tensor<B, 4>) -> Tensor<B, 4> {
        activation
    }
}

/// Trait for real/fake image classifiers.
///
/// Implementations must report their layers in forward order and call the
/// hook for every layer whose [`LayerKind`](crate::LayerKind) is spatial.
pub trait ImageClassifier<B: Backend> {
    /// Architecture family tag.
    fn family(&self) -> ModelFamily;

    /// Declared input contract.
    fn input_shape(&self) -> ImageShape;

    /// Declared output head.
    fn output_head(&self) -> OutputHead;

    /// Ordered layer list, first layer first.
    fn layers(&self) -> Vec<LayerInfo>;

    /// Forward pass with an activation hook.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape (batch, channels, height, width)
    /// * `hook` - Receives every named spatial activation
    ///
    /// # Returns
    ///
    /// Activated outputs of shape (batch, n_outputs): probabilities for a
    /// softmax head, a single score for a sigmoid head.
    fn forward_with_hook(&self, x: Tensor<B, 4>, hook: &mut dyn ActivationHook<B>) -> Tensor<B, 2>;

    /// Plain forward pass.
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_with_hook(x, &mut NoopHook)
    }

    /// Reject inputs that do not match [`ImageClassifier::input_shape`].
    fn verify_input(&self, dims: [usize; 4]) -> Result<()> {
        self.input_shape().check_nchw(dims)
    }

    /// Look up a layer by name.
    fn layer(&self, name: &str) -> Option<LayerInfo> {
        self.layers().into_iter().find(|layer| layer.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_argmax_first_wins_ties() {
        assert_eq!(OutputHead::argmax(&[0.5, 0.5]), 0);
        assert_eq!(OutputHead::argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(OutputHead::argmax(&[]), 0);
    }

    #[test]
    fn test_head_for_outputs() {
        assert_eq!(OutputHead::for_outputs(1), OutputHead::Sigmoid);
        assert_eq!(
            OutputHead::for_outputs(2),
            OutputHead::Softmax { n_classes: 2 }
        );
        assert_eq!(OutputHead::Softmax { n_classes: 5 }.n_outputs(), 5);
    }

    #[test]
    fn test_sigmoid_head_activation() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([1, 1], &device);
        let score: f32 = OutputHead::Sigmoid.activate(logits).into_scalar().elem();
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_head_activation_sums_to_one() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, -1.0]], &device);
        let probs = OutputHead::Softmax { n_classes: 2 }.activate(logits);
        let sum: f32 = probs.sum().into_scalar().elem();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_noop_hook_is_identity() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([1, 2, 3, 3], &device);
        let mut hook = NoopHook;
        let y = ActivationHook::<TestBackend>::on_layer(&mut hook, "conv", x);
        assert_eq!(y.dims(), [1, 2, 3, 3]);
    }

    #[test]
    fn test_head_serde() {
        let json = serde_json::to_string(&OutputHead::Softmax { n_classes: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"softmax","n_classes":2}"#);
        let head: OutputHead = serde_json::from_str(r#"{"type":"sigmoid"}"#).unwrap();
        assert_eq!(head, OutputHead::Sigmoid);
    }
}
