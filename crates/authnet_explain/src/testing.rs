//! Synthetic classifiers with known gradients.

use authnet_core::{
    ActivationHook, ImageClassifier, ImageShape, LayerInfo, LayerKind, ModelFamily, OutputHead,
};
use authnet_transforms::Preprocessor;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};

pub type GradBackend = Autodiff<NdArray>;

/// 16x16 image: red on the left half, green on the right half.
pub fn two_class_image() -> RgbImage {
    RgbImage::from_fn(16, 16, |x, _| {
        if x < 8 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 255, 0])
        }
    })
}

pub fn two_class_input<B: Backend>(device: &B::Device) -> Tensor<B, 4> {
    Preprocessor::default().to_tensor(&two_class_image(), device)
}

fn pooled<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, _, _] = x.dims();
    x.mean_dim(3).mean_dim(2).reshape([batch, channels])
}

/// Two-class softmax over pooled RGB means.
///
/// Its "conv" layer is the input itself. Class 0 reads the red channel and
/// class 1 the green one; on [`two_class_image`] the logits are `[2, -1]`.
pub struct TwoClassNet;

impl<B: Backend> ImageClassifier<B> for TwoClassNet {
    fn family(&self) -> ModelFamily {
        ModelFamily::Generic
    }

    fn input_shape(&self) -> ImageShape {
        ImageShape::square(16)
    }

    fn output_head(&self) -> OutputHead {
        OutputHead::Softmax { n_classes: 2 }
    }

    fn layers(&self) -> Vec<LayerInfo> {
        vec![
            LayerInfo::new("input_1", LayerKind::Input),
            LayerInfo::new("conv", LayerKind::Conv2d),
            LayerInfo::new("gap", LayerKind::GlobalPooling),
            LayerInfo::new("dense", LayerKind::Dense),
        ]
    }

    fn forward_with_hook(&self, x: Tensor<B, 4>, hook: &mut dyn ActivationHook<B>) -> Tensor<B, 2> {
        let device = x.device();
        let x = hook.on_layer("input_1", x);
        let activation = hook.on_layer("conv", x);

        let weight = Tensor::<B, 2>::from_floats([[2.0, 0.0], [0.0, 2.0], [0.0, 0.0]], &device);
        let bias = Tensor::<B, 2>::from_floats([[1.0, -2.0]], &device);
        softmax(pooled(activation).matmul(weight) + bias, 1)
    }
}

/// One 1x1 conv averaging RGB, then a two-class dense head with fixed
/// per-class weights.
pub struct SingleConvNet<B: Backend> {
    conv: Conv2d<B>,
    class_weights: [f32; 2],
}

impl<B: Backend> SingleConvNet<B> {
    pub fn new(class_weights: [f32; 2], device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([3, 1], [1, 1])
                .with_bias(false)
                .with_initializer(Initializer::Constant { value: 1.0 / 3.0 })
                .init(device),
            class_weights,
        }
    }

    /// Both classes read the pooled map with the same weight, so the
    /// softmax output does not depend on the input.
    pub fn symmetric(device: &B::Device) -> Self {
        Self::new([1.0, 1.0], device)
    }

    /// Class 0 reads the pooled map, class 1 its negation.
    pub fn skewed(device: &B::Device) -> Self {
        Self::new([1.0, -1.0], device)
    }
}

impl<B: Backend> ImageClassifier<B> for SingleConvNet<B> {
    fn family(&self) -> ModelFamily {
        ModelFamily::Cnn
    }

    fn input_shape(&self) -> ImageShape {
        ImageShape::square(224)
    }

    fn output_head(&self) -> OutputHead {
        OutputHead::Softmax { n_classes: 2 }
    }

    fn layers(&self) -> Vec<LayerInfo> {
        vec![
            LayerInfo::new("input_1", LayerKind::Input),
            LayerInfo::new("conv2d", LayerKind::Conv2d),
            LayerInfo::new("global_average_pooling2d", LayerKind::GlobalPooling),
            LayerInfo::new("dense", LayerKind::Dense),
        ]
    }

    fn forward_with_hook(&self, x: Tensor<B, 4>, hook: &mut dyn ActivationHook<B>) -> Tensor<B, 2> {
        let device = x.device();
        let x = hook.on_layer("input_1", x);
        let activation = hook.on_layer("conv2d", self.conv.forward(x));
        let weight = Tensor::<B, 2>::from_floats([self.class_weights], &device);
        softmax(pooled(activation).matmul(weight), 1)
    }
}

/// Hooks a side branch that never reaches the output.
#[derive(Module, Debug)]
pub struct DisconnectedNet<B: Backend> {
    dense: Linear<B>,
}

impl<B: Backend> DisconnectedNet<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            dense: LinearConfig::new(3, 2).init(device),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for DisconnectedNet<B> {
    fn family(&self) -> ModelFamily {
        ModelFamily::Generic
    }

    fn input_shape(&self) -> ImageShape {
        ImageShape::square(16)
    }

    fn output_head(&self) -> OutputHead {
        OutputHead::Softmax { n_classes: 2 }
    }

    fn layers(&self) -> Vec<LayerInfo> {
        vec![
            LayerInfo::new("side_conv", LayerKind::Conv2d),
            LayerInfo::new("dense", LayerKind::Dense),
        ]
    }

    fn forward_with_hook(&self, x: Tensor<B, 4>, hook: &mut dyn ActivationHook<B>) -> Tensor<B, 2> {
        let _ = hook.on_layer("side_conv", x.clone() * 2.0);
        softmax(self.dense.forward(pooled(x)), 1)
    }
}

/// Dense-only classifier.
pub struct NoConvNet;

impl<B: Backend> ImageClassifier<B> for NoConvNet {
    fn family(&self) -> ModelFamily {
        ModelFamily::Generic
    }

    fn input_shape(&self) -> ImageShape {
        ImageShape::square(16)
    }

    fn output_head(&self) -> OutputHead {
        OutputHead::Sigmoid
    }

    fn layers(&self) -> Vec<LayerInfo> {
        vec![
            LayerInfo::new("gap", LayerKind::GlobalPooling),
            LayerInfo::new("dense", LayerKind::Dense),
        ]
    }

    fn forward_with_hook(&self, x: Tensor<B, 4>, _hook: &mut dyn ActivationHook<B>) -> Tensor<B, 2> {
        OutputHead::Sigmoid.activate(pooled(x).sum_dim(1))
    }
}
