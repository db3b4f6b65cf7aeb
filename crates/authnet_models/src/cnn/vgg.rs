//! VGG16-style real/fake classifier.
//!
//! Five blocks of same-padded 3x3 convolutions (2, 2, 3, 3, 3 convs) each
//! followed by 2x2 max pooling, then global average pooling and a dense head.
//! Layer names follow the Keras VGG16 application (`block5_conv3`, ...).

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
use crate::layers::{conv2d, flatten_pooled, reduced_size};

/// Convs per block.
pub const VGG16_BLOCKS: [usize; 5] = [2, 2, 3, 3, 3];

/// Width multiplier of each block relative to the base width.
const WIDTH_MULTIPLIERS: [usize; 5] = [1, 2, 4, 8, 8];

/// Configuration for [`Vgg16`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vgg16Config {
    /// Declared input contract.
    pub input: ImageShape,
    /// Channels of the first block (64 in the reference network).
    pub base_width: usize,
    /// Width of the hidden dense layer.
    pub hidden_units: usize,
    /// Output units (1 for a sigmoid head).
    pub n_outputs: usize,
}

impl Default for Vgg16Config {
    fn default() -> Self {
        Self {
            input: ImageShape::default(),
            base_width: 64,
            hidden_units: 256,
            n_outputs: 1,
        }
    }
}

impl Vgg16Config {
    /// Create a new config with specified input and output width.
    pub fn new(input: ImageShape, n_outputs: usize) -> Self {
        Self {
            input,
            n_outputs,
            ..Default::default()
        }
    }

    /// Set the base channel width.
    #[must_use]
    pub fn with_base_width(mut self, base_width: usize) -> Self {
        self.base_width = base_width;
        self
    }

    /// Set the hidden dense width.
    #[must_use]
    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    /// Channels of block `index` (0-based).
    pub fn block_width(&self, index: usize) -> usize {
        self.base_width * WIDTH_MULTIPLIERS[index]
    }

    /// Check that the configuration yields a working network.
    pub fn validate(&self) -> Result<()> {
        if self.base_width == 0 || self.hidden_units == 0 || self.n_outputs == 0 {
            return Err(ModelError::InvalidConfig(
                "vgg base width, hidden units and outputs must be non-zero".to_string(),
            ));
        }
        let min_side = self.input.height().min(self.input.width());
        if reduced_size(min_side, VGG16_BLOCKS.len() as u32).is_none() {
            return Err(ModelError::InvalidConfig(format!(
                "input {} is too small for five pooling blocks (need at least 32x32)",
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
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16<B> {
        Vgg16::new(self.clone(), device)
    }
}

/// One VGG block: a run of 3x3 conv + ReLU layers.
#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    /// Convolutions in forward order.
    convs: Vec<Conv2d<B>>,
}

impl<B: Backend> VggBlock<B> {
    /// Create a block of `n_convs` convolutions.
    pub fn new(in_channels: usize, out_channels: usize, n_convs: usize, device: &B::Device) -> Self {
        let convs = (0..n_convs)
            .map(|i| {
                let in_channels = if i == 0 { in_channels } else { out_channels };
                conv2d(in_channels, out_channels, 3, 1, device)
            })
            .collect();
        Self { convs }
    }

    /// Forward pass; `block` is the 1-based block number used in layer names.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        block: usize,
        hook: &mut dyn ActivationHook<B>,
    ) -> Tensor<B, 4> {
        let mut out = x;
        for (i, conv) in self.convs.iter().enumerate() {
            let name = format!("block{block}_conv{}", i + 1);
            out = hook.on_layer(&name, relu(conv.forward(out)));
        }
        out
    }
}

/// VGG16 classifier.
#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    /// Conv blocks.
    blocks: Vec<VggBlock<B>>,
    /// 2x2 max pooling closing every block.
    pool: MaxPool2d,
    /// Global average pooling.
    gap: AdaptiveAvgPool2d,
    /// Hidden dense layer.
    hidden: Linear<B>,
    /// Output dense layer.
    output: Linear<B>,
    /// Architecture configuration.
    config: Ignored<Vgg16Config>,
}

impl<B: Backend> Vgg16<B> {
    /// Create a new model with freshly initialized weights.
    pub fn new(config: Vgg16Config, device: &B::Device) -> Self {
        let mut in_channels = config.input.channels();
        let mut blocks = Vec::with_capacity(VGG16_BLOCKS.len());
        for (index, &n_convs) in VGG16_BLOCKS.iter().enumerate() {
            let width = config.block_width(index);
            blocks.push(VggBlock::new(in_channels, width, n_convs, device));
            in_channels = width;
        }

        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let hidden = LinearConfig::new(in_channels, config.hidden_units).init(device);
        let output = LinearConfig::new(config.hidden_units, config.n_outputs).init(device);

        Self {
            blocks,
            pool,
            gap,
            hidden,
            output,
            config: Ignored(config),
        }
    }

    /// Architecture configuration.
    pub fn config(&self) -> &Vgg16Config {
        &self.config.0
    }
}

impl<B: Backend> ImageClassifier<B> for Vgg16<B> {
    fn family(&self) -> ModelFamily {
        ModelFamily::Vgg
    }

    fn input_shape(&self) -> ImageShape {
        self.config.0.input
    }

    fn output_head(&self) -> OutputHead {
        self.config.0.head()
    }

    fn layers(&self) -> Vec<LayerInfo> {
        let mut layers = vec![LayerInfo::new(INPUT_LAYER, LayerKind::Input)];
        for (b, &n_convs) in VGG16_BLOCKS.iter().enumerate() {
            let block = b + 1;
            for c in 1..=n_convs {
                layers.push(LayerInfo::new(format!("block{block}_conv{c}"), LayerKind::Conv2d));
            }
            layers.push(LayerInfo::new(format!("block{block}_pool"), LayerKind::Pooling));
        }
        layers.push(LayerInfo::new("global_average_pooling2d", LayerKind::GlobalPooling));
        layers.push(LayerInfo::new("dense", LayerKind::Dense));
        layers.push(LayerInfo::new("dropout", LayerKind::Dropout));
        layers.push(LayerInfo::new("dense_1", LayerKind::Dense));
        layers
    }

    fn forward_with_hook(&self, x: Tensor<B, 4>, hook: &mut dyn ActivationHook<B>) -> Tensor<B, 2> {
        let mut out = hook.on_layer(INPUT_LAYER, x);
        for (b, block) in self.blocks.iter().enumerate() {
            out = block.forward(out, b + 1, hook);
            out = hook.on_layer(&format!("block{}_pool", b + 1), self.pool.forward(out));
        }

        let out = flatten_pooled(self.gap.forward(out));
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

    fn small_config() -> Vgg16Config {
        Vgg16Config::new(ImageShape::square(32), 1)
            .with_base_width(2)
            .with_hidden_units(4)
    }

    #[test]
    fn test_vgg_config_default() {
        let config = Vgg16Config::default();
        assert_eq!(config.base_width, 64);
        assert_eq!(config.block_width(4), 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_vgg_layer_names() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let layers = model.layers();

        let convs: Vec<&str> = layers
            .iter()
            .filter(|l| l.kind.is_convolution())
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(convs.len(), 13);
        assert_eq!(convs.first(), Some(&"block1_conv1"));
        assert_eq!(convs.last(), Some(&"block5_conv3"));
        assert!(model.layer("block3_pool").is_some());
    }

    #[test]
    fn test_vgg_forward_and_hooks() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let out = model.forward(Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device));
        assert_eq!(out.dims(), [1, 1]);

        let hooked = hooked_names(&model, &device);
        assert_eq!(hooked, spatial_names(&model.layers()));
    }

    #[test]
    fn test_vgg_rejects_small_input() {
        let config = Vgg16Config::new(ImageShape::square(16), 1);
        assert!(matches!(config.validate(), Err(ModelError::InvalidConfig(_))));
    }
}
