//! Benchmarks for Grad-CAM explanations.
//!
//! Run with: cargo bench --bench explain_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use authnet::all::*;

type ExplainBackend = Autodiff<NdArray>;

/// Random photo-like image.
fn create_synthetic_image(width: u32, height: u32) -> RgbImage {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    RgbImage::from_fn(width, height, |x, y| {
        let base = ((x + y) % 256) as u8;
        Rgb([base, rng.gen::<u8>(), 255 - base])
    })
}

/// Random `(1, channels, size, size)` tensor.
fn create_synthetic_tensor(channels: usize, size: usize, seed: u64) -> Tensor<NdArray, 4> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data: Vec<f32> = (0..channels * size * size)
        .map(|_| rng.gen::<f32>() - 0.25)
        .collect();
    let tensor_data = burn::tensor::TensorData::new(data, [1, channels, size, size]);
    Tensor::from_data(tensor_data, &Default::default())
}

fn bench_synthesize(c: &mut Criterion) {
    let mut group = c.benchmark_group("synthesize_heatmap");

    // Feature maps of the CNN, VGG16 and EfficientNet top layers at 224px.
    for (channels, size) in [(128usize, 56usize), (512, 14), (1280, 7)] {
        let activation = create_synthetic_tensor(channels, size, 1);
        let gradient = create_synthetic_tensor(channels, size, 2);

        group.bench_with_input(
            BenchmarkId::new("channels", format!("{channels}x{size}x{size}")),
            &channels,
            |b, _| {
                b.iter(|| {
                    let heatmap = synthesize_heatmap(
                        black_box(activation.clone()),
                        black_box(gradient.clone()),
                    );
                    black_box(heatmap)
                });
            },
        );
    }

    group.finish();
}

fn bench_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");

    let raw = create_synthetic_tensor(1, 7, 3)
        .into_data()
        .to_vec::<f32>()
        .expect("synthetic tensor is f32");
    let heatmap = Heatmap::normalize(
        ndarray::Array2::from_shape_vec((7, 7), raw).expect("7x7 values"),
    )
    .expect("synthetic heatmap has positive values");
    let config = ExplainConfig::default();

    for (width, height) in [(224u32, 224u32), (640, 480), (1920, 1080)] {
        let image = create_synthetic_image(width, height);
        group.bench_with_input(
            BenchmarkId::new("overlay_jpeg", format!("{width}x{height}")),
            &width,
            |b, _| {
                b.iter(|| {
                    let overlay = composite(black_box(&image), &heatmap, &config)
                        .and_then(|img| encode_jpeg_base64(&img, config.jpeg_quality));
                    black_box(overlay)
                });
            },
        );
    }

    group.finish();
}

fn bench_explain(c: &mut Criterion) {
    let mut group = c.benchmark_group("explain");
    group.sample_size(10);

    let device = <ExplainBackend as Backend>::Device::default();
    let model = AuthCnnConfig::new(ImageShape::square(64), 1)
        .with_filters(vec![16, 32])
        .with_hidden_units(32)
        .init::<ExplainBackend>(&device);
    let image = create_synthetic_image(320, 240);
    let preprocessor = Preprocessor::default();
    let explainer = GradCamExplainer::default();

    group.bench_function("AuthCnn_64px", |b| {
        b.iter(|| {
            let explanation = explainer.explain_best_effort::<ExplainBackend, _>(
                &model,
                black_box(&image),
                &preprocessor,
                TargetClass::Predicted,
                &device,
            );
            black_box(explanation)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_synthesize, bench_composite, bench_explain);
criterion_main!(benches);
