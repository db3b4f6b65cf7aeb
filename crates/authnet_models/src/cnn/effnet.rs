//! EfficientNet-style real/fake classifier.
//!
//! Stem convolution, a sequence of MBConv blocks (1x1 expansion, depthwise
//! convolution, 1x1 projection, residual add when shapes allow), a 1x1 `top_conv`
//! and a dense `predictions` head. Layer names follow the Keras
//! EfficientNet application, so `top_conv` is the natural explanation target.
//!
//! Batch normalization uses [`FrozenBatchNorm`], which keeps forward passes
//! on autodiff backends identical to inference.

use authnet_core::{
    ActivationHook, ImageClassifier, ImageShape, LayerInfo, LayerKind, ModelFamily, OutputHead,
};
use burn::nn::{
    conv::Conv2d,
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    Linear, LinearConfig,
};
use burn::module::Ignored;
use burn::prelude::*;
use burn::tensor::activation::silu;
use serde::{Deserialize, Serialize};

use super::INPUT_LAYER;
use crate::error::{ModelError, Result};
use crate::layers::{conv2d_no_bias, depthwise_conv2d, flatten_pooled, FrozenBatchNorm};

/// Configuration of one MBConv block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbConvConfig {
    /// Expansion ratio of the inverted bottleneck (1 disables expansion).
    pub expand_ratio: usize,
    /// Depthwise kernel size (odd).
    pub kernel_size: usize,
    /// Depthwise stride (1 or 2).
    pub stride: usize,
    /// Output channels.
    pub filters: usize,
}

impl MbConvConfig {
    /// Create a block config.
    pub const fn new(expand_ratio: usize, kernel_size: usize, stride: usize, filters: usize) -> Self {
        Self {
            expand_ratio,
            kernel_size,
            stride,
            filters,
        }
    }
}

/// Configuration for [`EffNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffNetConfig {
    /// Declared input contract.
    pub input: ImageShape,
    /// Output channels of the stride-2 stem convolution.
    pub stem_filters: usize,
    /// MBConv blocks in forward order.
    pub blocks: Vec<MbConvConfig>,
    /// Output channels of `top_conv`.
    pub top_filters: usize,
    /// Output units (1 for a sigmoid head).
    pub n_outputs: usize,
}

impl Default for EffNetConfig {
    /// One block per EfficientNet-B0 stage.
    fn default() -> Self {
        Self {
            input: ImageShape::default(),
            stem_filters: 32,
            blocks: vec![
                MbConvConfig::new(1, 3, 1, 16),
                MbConvConfig::new(6, 3, 2, 24),
                MbConvConfig::new(6, 5, 2, 40),
                MbConvConfig::new(6, 3, 2, 80),
                MbConvConfig::new(6, 5, 1, 112),
                MbConvConfig::new(6, 5, 2, 192),
                MbConvConfig::new(6, 3, 1, 320),
            ],
            top_filters: 1280,
            n_outputs: 1,
        }
    }
}

impl EffNetConfig {
    /// Create a new config with specified input and output width.
    pub fn new(input: ImageShape, n_outputs: usize) -> Self {
        Self {
            input,
            n_outputs,
            ..Default::default()
        }
    }

    /// Set the stem width.
    #[must_use]
    pub fn with_stem_filters(mut self, stem_filters: usize) -> Self {
        self.stem_filters = stem_filters;
        self
    }

    /// Set the MBConv blocks.
    #[must_use]
    pub fn with_blocks(mut self, blocks: Vec<MbConvConfig>) -> Self {
        self.blocks = blocks;
        self
    }

    /// Set the `top_conv` width.
    #[must_use]
    pub fn with_top_filters(mut self, top_filters: usize) -> Self {
        self.top_filters = top_filters;
        self
    }

    /// Total downsampling factor from input to `top_conv`.
    pub fn total_stride(&self) -> usize {
        self.blocks.iter().fold(2, |acc, block| acc * block.stride)
    }

    /// Check that the configuration yields a working network.
    pub fn validate(&self) -> Result<()> {
        if self.stem_filters == 0 || self.top_filters == 0 || self.n_outputs == 0 {
            return Err(ModelError::InvalidConfig(
                "effnet stem, top and output widths must be non-zero".to_string(),
            ));
        }
        for (i, block) in self.blocks.iter().enumerate() {
            if block.expand_ratio == 0 || block.filters == 0 {
                return Err(ModelError::InvalidConfig(format!(
                    "block{} has a zero expansion ratio or width",
                    i + 1
                )));
            }
            if block.kernel_size % 2 == 0 {
                return Err(ModelError::InvalidConfig(format!(
                    "block{} kernel size must be odd, got {}",
                    i + 1,
                    block.kernel_size
                )));
            }
            if !matches!(block.stride, 1 | 2) {
                return Err(ModelError::InvalidConfig(format!(
                    "block{} stride must be 1 or 2, got {}",
                    i + 1,
                    block.stride
                )));
            }
        }
        if self.input.height().min(self.input.width()) < self.total_stride() {
            return Err(ModelError::InvalidConfig(format!(
                "input {} is smaller than the total stride {}",
                self.input,
                self.total_stride()
            )));
        }
        Ok(())
    }

    /// Output head implied by `n_outputs`.
    pub fn head(&self) -> OutputHead {
        OutputHead::for_outputs(self.n_outputs)
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> EffNet<B> {
        EffNet::new(self.clone(), device)
    }
}

/// Inverted residual block with depthwise convolution.
#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    /// 1x1 expansion (absent when the ratio is 1).
    expand_conv: Option<Conv2d<B>>,
    /// Normalization after expansion.
    expand_bn: Option<FrozenBatchNorm<B>>,
    /// Depthwise convolution.
    dwconv: Conv2d<B>,
    /// Normalization after the depthwise convolution.
    bn: FrozenBatchNorm<B>,
    /// 1x1 projection.
    project_conv: Conv2d<B>,
    /// Normalization after projection.
    project_bn: FrozenBatchNorm<B>,
    /// Whether the block input is added to its output.
    residual: bool,
}

impl<B: Backend> MbConv<B> {
    /// Create a block reading `in_channels` channels.
    pub fn new(in_channels: usize, config: MbConvConfig, device: &B::Device) -> Self {
        let expanded = in_channels * config.expand_ratio;
        let (expand_conv, expand_bn) = if config.expand_ratio == 1 {
            (None, None)
        } else {
            (
                Some(conv2d_no_bias(in_channels, expanded, 1, 1, device)),
                Some(FrozenBatchNorm::new(expanded, device)),
            )
        };

        Self {
            expand_conv,
            expand_bn,
            dwconv: depthwise_conv2d(expanded, config.kernel_size, config.stride, device),
            bn: FrozenBatchNorm::new(expanded, device),
            project_conv: conv2d_no_bias(expanded, config.filters, 1, 1, device),
            project_bn: FrozenBatchNorm::new(config.filters, device),
            residual: config.stride == 1 && in_channels == config.filters,
        }
    }

    /// Layers of this block, named with `prefix` (e.g. `block3`).
    pub fn layers(&self, prefix: &str) -> Vec<LayerInfo> {
        let mut layers = Vec::new();
        if self.expand_conv.is_some() {
            layers.push(LayerInfo::new(format!("{prefix}_expand_conv"), LayerKind::Conv2d));
            layers.push(LayerInfo::new(format!("{prefix}_expand_bn"), LayerKind::BatchNorm));
            layers.push(LayerInfo::new(
                format!("{prefix}_expand_activation"),
                LayerKind::Activation,
            ));
        }
        layers.push(LayerInfo::new(format!("{prefix}_dwconv"), LayerKind::DepthwiseConv2d));
        layers.push(LayerInfo::new(format!("{prefix}_bn"), LayerKind::BatchNorm));
        layers.push(LayerInfo::new(format!("{prefix}_activation"), LayerKind::Activation));
        layers.push(LayerInfo::new(format!("{prefix}_project_conv"), LayerKind::Conv2d));
        layers.push(LayerInfo::new(format!("{prefix}_project_bn"), LayerKind::BatchNorm));
        if self.residual {
            layers.push(LayerInfo::new(format!("{prefix}_add"), LayerKind::Merge));
        }
        layers
    }

    /// Forward pass, reporting activations under `prefix`.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        prefix: &str,
        hook: &mut dyn ActivationHook<B>,
    ) -> Tensor<B, 4> {
        let shortcut = self.residual.then(|| x.clone());

        let mut out = x;
        if let (Some(conv), Some(bn)) = (&self.expand_conv, &self.expand_bn) {
            out = hook.on_layer(&format!("{prefix}_expand_conv"), conv.forward(out));
            out = hook.on_layer(&format!("{prefix}_expand_bn"), bn.forward(out));
            out = hook.on_layer(&format!("{prefix}_expand_activation"), silu(out));
        }

        out = hook.on_layer(&format!("{prefix}_dwconv"), self.dwconv.forward(out));
        out = hook.on_layer(&format!("{prefix}_bn"), self.bn.forward(out));
        out = hook.on_layer(&format!("{prefix}_activation"), silu(out));
        out = hook.on_layer(&format!("{prefix}_project_conv"), self.project_conv.forward(out));
        out = hook.on_layer(&format!("{prefix}_project_bn"), self.project_bn.forward(out));

        match shortcut {
            Some(shortcut) => hook.on_layer(&format!("{prefix}_add"), out + shortcut),
            None => out,
        }
    }
}

/// EfficientNet-style classifier.
#[derive(Module, Debug)]
pub struct EffNet<B: Backend> {
    /// Stride-2 stem convolution.
    stem_conv: Conv2d<B>,
    /// Stem normalization.
    stem_bn: FrozenBatchNorm<B>,
    /// MBConv blocks.
    blocks: Vec<MbConv<B>>,
    /// 1x1 head convolution.
    top_conv: Conv2d<B>,
    /// Head normalization.
    top_bn: FrozenBatchNorm<B>,
    /// Global average pooling.
    gap: AdaptiveAvgPool2d,
    /// Output dense layer.
    predictions: Linear<B>,
    /// Architecture configuration.
    config: Ignored<EffNetConfig>,
}

impl<B: Backend> EffNet<B> {
    /// Create a new model with freshly initialized weights.
    pub fn new(config: EffNetConfig, device: &B::Device) -> Self {
        let stem_conv = conv2d_no_bias(config.input.channels(), config.stem_filters, 3, 2, device);
        let stem_bn = FrozenBatchNorm::new(config.stem_filters, device);

        let mut in_channels = config.stem_filters;
        let mut blocks = Vec::with_capacity(config.blocks.len());
        for block in &config.blocks {
            blocks.push(MbConv::new(in_channels, *block, device));
            in_channels = block.filters;
        }

        let top_conv = conv2d_no_bias(in_channels, config.top_filters, 1, 1, device);
        let top_bn = FrozenBatchNorm::new(config.top_filters, device);
        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let predictions = LinearConfig::new(config.top_filters, config.n_outputs).init(device);

        Self {
            stem_conv,
            stem_bn,
            blocks,
            top_conv,
            top_bn,
            gap,
            predictions,
            config: Ignored(config),
        }
    }

    /// Architecture configuration.
    pub fn config(&self) -> &EffNetConfig {
        &self.config.0
    }
}

fn block_prefix(index: usize) -> String {
    format!("block{}", index + 1)
}

impl<B: Backend> ImageClassifier<B> for EffNet<B> {
    fn family(&self) -> ModelFamily {
        ModelFamily::EffNet
    }

    fn input_shape(&self) -> ImageShape {
        self.config.0.input
    }

    fn output_head(&self) -> OutputHead {
        self.config.0.head()
    }

    fn layers(&self) -> Vec<LayerInfo> {
        let mut layers = vec![
            LayerInfo::new(INPUT_LAYER, LayerKind::Input),
            LayerInfo::new("stem_conv", LayerKind::Conv2d),
            LayerInfo::new("stem_bn", LayerKind::BatchNorm),
            LayerInfo::new("stem_activation", LayerKind::Activation),
        ];
        for (i, block) in self.blocks.iter().enumerate() {
            layers.extend(block.layers(&block_prefix(i)));
        }
        layers.extend([
            LayerInfo::new("top_conv", LayerKind::Conv2d),
            LayerInfo::new("top_bn", LayerKind::BatchNorm),
            LayerInfo::new("top_activation", LayerKind::Activation),
            LayerInfo::new("avg_pool", LayerKind::GlobalPooling),
            LayerInfo::new("top_dropout", LayerKind::Dropout),
            LayerInfo::new("predictions", LayerKind::Dense),
        ]);
        layers
    }

    fn forward_with_hook(&self, x: Tensor<B, 4>, hook: &mut dyn ActivationHook<B>) -> Tensor<B, 2> {
        let out = hook.on_layer(INPUT_LAYER, x);
        let out = hook.on_layer("stem_conv", self.stem_conv.forward(out));
        let out = hook.on_layer("stem_bn", self.stem_bn.forward(out));
        let mut out = hook.on_layer("stem_activation", silu(out));

        for (i, block) in self.blocks.iter().enumerate() {
            out = block.forward(out, &block_prefix(i), hook);
        }

        let out = hook.on_layer("top_conv", self.top_conv.forward(out));
        let out = hook.on_layer("top_bn", self.top_bn.forward(out));
        let out = hook.on_layer("top_activation", silu(out));

        let out = flatten_pooled(self.gap.forward(out));
        let logits = self.predictions.forward(out);
        self.config.0.head().activate(logits)
    }
}
