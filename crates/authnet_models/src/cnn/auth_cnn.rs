//! Plain convolutional real/fake classifier.
//!
//! A stack of `Conv2d -> ReLU -> MaxPool` stages followed by global average
//! pooling and a small dense head. Layers carry the names a Keras
//! `Sequential` export would give them (`conv2d`, `conv2d_1`, ...), which is
//! what the explanation target-layer policy relies on.

use authnet_core::{
    ActivationHook, ImageClassifier, ImageShape, LayerInfo, LayerKind, ModelFamily, OutputHead,
};
use burn::nn::{
    conv::Conv2d,
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Linear, LinearConfig,
};
use burn::module::Ignored;
use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use super::INPUT_LAYER;
use crate::error::{ModelError, Result};
use crate::layers::{conv2d, flatten_pooled, indexed_name, reduced_size};

/// Configuration for [`AuthCnn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthCnnConfig {
    /// Declared input contract.
    pub input: ImageShape,
    /// Output channels of each conv stage.
    pub filters: Vec<usize>,
    /// Square kernel size of every conv.
    pub kernel_size: usize,
    /// Width of the hidden dense layer.
    pub hidden_units: usize,
    /// Output units (1 for a sigmoid head).
    pub n_outputs: usize,
}

impl Default for AuthCnnConfig {
    fn default() -> Self {
        Self {
            input: ImageShape::default(),
            filters: vec![32, 64, 128],
            kernel_size: 3,
            hidden_units: 128,
            n_outputs: 1,
        }
    }
}

impl AuthCnnConfig {
    /// Create a new config with specified input and output width.
    pub fn new(input: ImageShape, n_outputs: usize) -> Self {
        Self {
            input,
            n_outputs,
            ..Default::default()
        }
    }

    /// Set the conv stage widths.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<usize>) -> Self {
        self.filters = filters;
        self
    }

    /// Set the hidden dense width.
    #[must_use]
    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    /// Check that the configuration yields a working network.
    pub fn validate(&self) -> Result<()> {
        if self.filters.is_empty() || self.filters.contains(&0) {
            return Err(ModelError::InvalidConfig(
                "cnn needs at least one conv stage with non-zero filters".to_string(),
            ));
        }
        if self.kernel_size == 0 || self.hidden_units == 0 || self.n_outputs == 0 {
            return Err(ModelError::InvalidConfig(
                "cnn kernel size, hidden units and outputs must be non-zero".to_string(),
            ));
        }
        let stages = self.filters.len() as u32;
        if reduced_size(self.input.height().min(self.input.width()), stages).unwrap_or(0) == 0 {
            return Err(ModelError::InvalidConfig(format!(
                "input {} is too small for {stages} pooling stages",
                self.input
            )));
        }
        Ok(())
    }

    /// Output head implied by `n_outputs`.
    pub fn head(&self) -> OutputHead {
        OutputHead::for_outputs(self.n_outputs)
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AuthCnn<B> {
        AuthCnn::new(self.clone(), device)
    }
}

/// Plain CNN classifier.
///
/// Architecture:
/// - `n` x [Conv2d(k x k, same) -> ReLU -> MaxPool(2)]
/// - Global Average Pooling
/// - Dense(hidden) -> ReLU -> Dropout
/// - Dense(n_outputs) with a sigmoid or softmax head
#[derive(Module, Debug)]
pub struct AuthCnn<B: Backend> {
    /// Conv stages.
    convs: Vec<Conv2d<B>>,
    /// 2x2 max pooling shared by every stage.
    pool: MaxPool2d,
    /// Global average pooling.
    gap: AdaptiveAvgPool2d,
    /// Hidden dense layer.
    hidden: Linear<B>,
    /// Output dense layer.
    output: Linear<B>,
    /// Architecture configuration.
    config: Ignored<AuthCnnConfig>,
}

impl<B: Backend> AuthCnn<B> {
    /// Create a new model with freshly initialized weights.
    pub fn new(config: AuthCnnConfig, device: &B::Device) -> Self {
        let mut in_channels = config.input.channels();
        let convs = config
            .filters
            .iter()
            .map(|&filters| {
                let conv = conv2d(in_channels, filters, config.kernel_size, 1, device);
                in_channels = filters;
                conv
            })
            .collect();

        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let hidden = LinearConfig::new(in_channels, config.hidden_units).init(device);
        let output = LinearConfig::new(config.hidden_units, config.n_outputs).init(device);

        Self {
            convs,
            pool,
            gap,
            hidden,
            output,
            config: Ignored(config),
        }
    }

    /// Architecture configuration.
    pub fn config(&self) -> &AuthCnnConfig {
        &self.config.0
    }
}

impl<B: Backend> ImageClassifier<B> for AuthCnn<B> {
    fn family(&self) -> ModelFamily {
        ModelFamily::Cnn
    }

    fn input_shape(&self) -> ImageShape {
        self.config.0.input
    }

    fn output_head(&self) -> OutputHead {
        self.config.0.head()
    }

    fn layers(&self) -> Vec<LayerInfo> {
        let mut layers = vec![LayerInfo::new(INPUT_LAYER, LayerKind::Input)];
        for i in 0..self.convs.len() {
            layers.push(LayerInfo::new(indexed_name("conv2d", i), LayerKind::Conv2d));
            layers.push(LayerInfo::new(indexed_name("max_pooling2d", i), LayerKind::Pooling));
        }
        layers.push(LayerInfo::new("global_average_pooling2d", LayerKind::GlobalPooling));
        layers.push(LayerInfo::new("dense", LayerKind::Dense));
        layers.push(LayerInfo::new("dropout", LayerKind::Dropout));
        layers.push(LayerInfo::new("dense_1", LayerKind::Dense));
        layers
    }

    fn forward_with_hook(&self, x: Tensor<B, 4>, hook: &mut dyn ActivationHook<B>) -> Tensor<B, 2> {
        let mut out = hook.on_layer(INPUT_LAYER, x);
        for (i, conv) in self.convs.iter().enumerate() {
            out = hook.on_layer(&indexed_name("conv2d", i), relu(conv.forward(out)));
            out = hook.on_layer(&indexed_name("max_pooling2d", i), self.pool.forward(out));
        }

        let out = flatten_pooled(self.gap.forward(out));
        // Dropout is the identity at inference.
        let out = relu(self.hidden.forward(out));
        let logits = self.output.forward(out);
        self.config.0.head().activate(logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnn::testing::{hooked_names, spatial_names};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> AuthCnnConfig {
        AuthCnnConfig::new(ImageShape::square(32), 1)
            .with_filters(vec![4, 8])
            .with_hidden_units(6)
    }

    #[test]
    fn test_auth_cnn_config_default() {
        let config = AuthCnnConfig::default();
        assert_eq!(config.input, ImageShape::square(224));
        assert_eq!(config.filters, vec![32, 64, 128]);
        assert_eq!(config.head(), OutputHead::Sigmoid);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auth_cnn_layer_names() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let names: Vec<String> = model.layers().into_iter().map(|l| l.name).collect();
        assert_eq!(
            names,
            vec![
                "input_1",
                "conv2d",
                "max_pooling2d",
                "conv2d_1",
                "max_pooling2d_1",
                "global_average_pooling2d",
                "dense",
                "dropout",
                "dense_1",
            ]
        );
    }

    #[test]
    fn test_auth_cnn_forward_sigmoid() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let out = model.forward(x);
        assert_eq!(out.dims(), [1, 1]);
        let score: f32 = out.into_scalar().elem();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_auth_cnn_forward_softmax() {
        let device = Default::default();
        let mut config = small_config();
        config.n_outputs = 2;
        let model = config.init::<TestBackend>(&device);
        let out = model.forward(Tensor::zeros([2, 3, 32, 32], &device));
        assert_eq!(out.dims(), [2, 2]);
    }

    #[test]
    fn test_auth_cnn_hooks_every_spatial_layer() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let hooked = hooked_names(&model, &device);
        assert_eq!(hooked, spatial_names(&model.layers()));
    }

    #[test]
    fn test_auth_cnn_rejects_tiny_input() {
        let config = AuthCnnConfig::new(ImageShape::square(4), 1).with_filters(vec![4, 4, 4]);
        assert!(matches!(config.validate(), Err(ModelError::InvalidConfig(_))));
    }
}
