//! Building blocks shared by the classifier families.

use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;

/// Epsilon used by every batch normalization layer.
pub const BN_EPSILON: f64 = 1e-3;

/// Batch normalization with frozen statistics.
///
/// Always normalizes with the stored running mean and variance, whatever the
/// backend, so a forward pass on an autodiff backend computes exactly what
/// inference computes and never mutates the module.
#[derive(Module, Debug)]
pub struct FrozenBatchNorm<B: Backend> {
    /// Scale.
    gamma: Param<Tensor<B, 1>>,
    /// Shift.
    beta: Param<Tensor<B, 1>>,
    /// Running mean.
    running_mean: Param<Tensor<B, 1>>,
    /// Running variance.
    running_var: Param<Tensor<B, 1>>,
}

impl<B: Backend> FrozenBatchNorm<B> {
    /// Identity-initialized normalization over `channels`.
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            gamma: Param::from_tensor(Tensor::ones([channels], device)),
            beta: Param::from_tensor(Tensor::zeros([channels], device)),
            running_mean: Param::from_tensor(Tensor::zeros([channels], device)),
            running_var: Param::from_tensor(Tensor::ones([channels], device)),
        }
    }

    /// Number of normalized channels.
    pub fn channels(&self) -> usize {
        let [channels] = self.gamma.val().dims();
        channels
    }

    /// Forward pass over `(N, C, H, W)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let channels = self.channels();
        let scale = self.gamma.val() / self.running_var.val().add_scalar(BN_EPSILON).sqrt();
        let shift = self.beta.val() - self.running_mean.val() * scale.clone();
        x * scale.reshape([1, channels, 1, 1]) + shift.reshape([1, channels, 1, 1])
    }
}

/// 2-D convolution padded so that stride 1 preserves the spatial size.
pub fn conv2d<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let pad = kernel_size / 2;
    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .init(device)
}

/// Bias-free convolution, the variant followed by batch normalization.
pub fn conv2d_no_bias<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let pad = kernel_size / 2;
    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .with_bias(false)
        .init(device)
}

/// Depthwise convolution: one filter per input channel.
pub fn depthwise_conv2d<B: Backend>(
    channels: usize,
    kernel_size: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let pad = kernel_size / 2;
    Conv2dConfig::new([channels, channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .with_groups(channels)
        .with_bias(false)
        .init(device)
}

/// Keras-style indexed layer name: `conv2d`, `conv2d_1`, `conv2d_2`, ...
pub fn indexed_name(base: &str, index: usize) -> String {
    if index == 0 {
        base.to_string()
    } else {
        format!("{base}_{index}")
    }
}

/// Spatial size after `n` stride-2 reductions, or `None` if it vanishes.
pub(crate) fn reduced_size(size: usize, n: u32) -> Option<usize> {
    let factor = 2usize.checked_pow(n)?;
    (size >= factor).then(|| size / factor)
}

/// Flatten `(N, C, 1, 1)` pooled features to `(N, C)`.
pub(crate) fn flatten_pooled<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, _, _] = x.dims();
    x.reshape([batch, channels])
}
