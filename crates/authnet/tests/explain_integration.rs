//! Integration tests for the classify-and-explain pipeline.
//!
//! These tests run uploads through preprocessing, classification, Grad-CAM
//! and overlay encoding, with classifiers whose behavior is known.

use authnet::all::*;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};

type ExplainBackend = Autodiff<NdArray>;

/// Scores brightness: a 1x1 graying conv, global mean and a positive dense
/// unit behind a sigmoid.
#[derive(Module, Debug)]
struct BrightnessNet<B: Backend> {
    conv: Conv2d<B>,
    dense: Linear<B>,
}

impl<B: Backend> BrightnessNet<B> {
    fn new(device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([3, 1], [1, 1])
                .with_bias(false)
                .with_initializer(Initializer::Constant { value: 1.0 / 3.0 })
                .init(device),
            dense: LinearConfig::new(1, 1)
                .with_initializer(Initializer::Constant { value: 1.0 })
                .init(device),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for BrightnessNet<B> {
    fn family(&self) -> ModelFamily {
        ModelFamily::Generic
    }

    fn input_shape(&self) -> ImageShape {
        ImageShape::square(32)
    }

    fn output_head(&self) -> OutputHead {
        OutputHead::Sigmoid
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
        let x = hook.on_layer("input_1", x);
        let x = hook.on_layer("conv2d", self.conv.forward(x));
        let [batch, channels, _, _] = x.dims();
        let pooled = x.mean_dim(3).mean_dim(2).reshape([batch, channels]);
        OutputHead::Sigmoid.activate(self.dense.forward(pooled))
    }
}

/// 120x80 black image with a white top-right quadrant.
fn quadrant_image() -> RgbImage {
    RgbImage::from_fn(120, 80, |x, y| {
        if x >= 60 && y < 40 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    })
}

#[test]
fn test_pipeline_highlights_bright_region() {
    let device = Default::default();
    let model = BrightnessNet::<ExplainBackend>::new(&device);
    let image = quadrant_image();
    let preprocessor = Preprocessor::default();

    let input = preprocessor
        .prepare_for::<ExplainBackend>(&image, model.input_shape(), &device)
        .unwrap();
    let classification = predict(&model, input, 0.5).unwrap();
    assert_eq!(classification.verdict, Verdict::Fake);

    let explanation = GradCamExplainer::default()
        .explain::<ExplainBackend, _>(&model, &image, &preprocessor, TargetClass::Predicted, &device)
        .unwrap();

    assert_eq!(explanation.layer, "conv2d");
    assert_eq!(explanation.class_index, 0);
    assert_eq!((explanation.heatmap.height(), explanation.heatmap.width()), (32, 32));
    assert!(explanation.heatmap.get(8, 24).unwrap() > 0.99);
    assert!(explanation.heatmap.get(24, 4).unwrap() < 0.01);
    assert_eq!(explanation.heatmap.max(), 1.0);

    // The overlay comes back at the upload's resolution, not the model's.
    let jpeg = STANDARD.decode(&explanation.image_base64).unwrap();
    let overlay = image::load_from_memory(&jpeg).unwrap().to_rgb8();
    assert_eq!(overlay.dimensions(), (120, 80));

    // Hot region leans red, cold region leans blue.
    let hot = overlay.get_pixel(90, 20);
    assert!(hot.0[0] > hot.0[2], "{hot:?}");
    let cold = overlay.get_pixel(20, 60);
    assert!(cold.0[2] > cold.0[0], "{cold:?}");
}

#[test]
fn test_forced_class_out_of_range_is_rejected() {
    let device = Default::default();
    let model = BrightnessNet::<ExplainBackend>::new(&device);

    let err = GradCamExplainer::default()
        .explain::<ExplainBackend, _>(
            &model,
            &quadrant_image(),
            &Preprocessor::default(),
            TargetClass::Index(1),
            &device,
        )
        .unwrap_err();
    assert!(matches!(err, ExplainError::InvalidTargetClass { index: 1, n_outputs: 1 }));
}

#[test]
fn test_uniform_black_upload_degrades_to_no_heatmap() {
    let device = Default::default();
    let model = BrightnessNet::<ExplainBackend>::new(&device);
    let black = RgbImage::new(64, 64);

    let heatmap = GradCamExplainer::default().explain_best_effort::<ExplainBackend, _>(
        &model,
        &black,
        &Preprocessor::default(),
        TargetClass::Predicted,
        &device,
    );
    assert!(heatmap.is_none());
}

#[test]
fn test_family_target_layers() {
    let device = Default::default();
    let input = ImageShape::square(32);
    let small = serde_json::json!({ "filters": [4, 8], "hidden_units": 4 });
    let cnn = init_classifier::<ExplainBackend>(ModelFamily::Cnn, input, Some(&small), &device).unwrap();
    let narrow = serde_json::json!({ "base_width": 4, "hidden_units": 4 });
    let vgg = init_classifier::<ExplainBackend>(ModelFamily::Vgg, input, Some(&narrow), &device).unwrap();

    let cnn_layer = select_target_layer(&cnn.layers(), cnn.family()).unwrap();
    assert_eq!(cnn_layer.name, "conv2d_1");
    let vgg_layer = select_target_layer(&vgg.layers(), vgg.family()).unwrap();
    assert_eq!(vgg_layer.name, "block5_conv3");
}

#[test]
fn test_checkpoint_round_trip_serves_same_predictions() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cnn");

    let overrides = serde_json::json!({ "filters": [4, 4], "hidden_units": 4, "n_outputs": 2 });
    let original =
        init_classifier::<ExplainBackend>(ModelFamily::Cnn, ImageShape::square(32), Some(&overrides), &device)
            .unwrap();
    save_model(&original, &path).unwrap();

    let spec = ModelSpec::new(ModelFamily::Cnn)
        .with_input(ImageShape::square(32))
        .with_checkpoint(&path);
    let mut config = ServiceConfig::default();
    config.models.clear();
    config.models.insert("cnn".to_string(), spec);
    config.models.insert(
        "vgg".to_string(),
        ModelSpec::new(ModelFamily::Vgg).with_checkpoint(dir.path().join("missing")),
    );

    let set = load_models::<ExplainBackend>(&config, &device);
    assert_eq!(set.configured(), vec!["cnn", "vgg"]);
    assert!(set.failed.contains_key("vgg"));
    let restored = &set.loaded["cnn"];

    let preprocessor = Preprocessor::default();
    let image = quadrant_image();
    let prepare = || {
        preprocessor
            .prepare_for::<ExplainBackend>(&image, ImageShape::square(32), &device)
            .unwrap()
    };
    let before = predict(&original, prepare(), 0.5).unwrap();
    let after = predict(restored, prepare(), 0.5).unwrap();

    assert_eq!(before.class_index, after.class_index);
    for (a, b) in before.probabilities.iter().zip(&after.probabilities) {
        assert!((a - b).abs() < 1e-6);
    }
}
