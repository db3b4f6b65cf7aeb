//! Activation capture hook.

use authnet_core::ActivationHook;
use burn::prelude::*;

/// Captures the output of one named layer during a forward pass.
///
/// In tracking mode the captured tensor is detached and marked as requiring
/// gradients before the forward pass continues from it, which makes it a
/// leaf of the remaining graph: backpropagating any output lands a gradient
/// on it.
#[derive(Debug, Clone)]
pub struct ActivationCapture<B: Backend> {
    /// Layer to capture.
    target: String,
    /// Whether to re-root the graph at the captured tensor.
    track_gradient: bool,
    /// Captured activation.
    activation: Option<Tensor<B, 4>>,
}

impl<B: Backend> ActivationCapture<B> {
    /// Observe `target` without touching the graph.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            track_gradient: false,
            activation: None,
        }
    }

    /// Capture `target` as a gradient-tracking leaf.
    pub fn tracking(target: impl Into<String>) -> Self {
        Self {
            track_gradient: true,
            ..Self::new(target)
        }
    }

    /// Name of the captured layer.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether the target layer was reached.
    pub fn fired(&self) -> bool {
        self.activation.is_some()
    }

    /// Take the captured activation.
    pub fn take(&mut self) -> Option<Tensor<B, 4>> {
        self.activation.take()
    }
}

impl<B: Backend> ActivationHook<B> for ActivationCapture<B> {
    fn on_layer(&mut self, name: &str, activation: Tensor<B, 4>) -> Tensor<B, 4> {
        if name != self.target {
            return activation;
        }
        let activation = if self.track_gradient {
            activation.detach().require_grad()
        } else {
            activation
        };
        self.activation = Some(activation.clone());
        activation
    }
}
