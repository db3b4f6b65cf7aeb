//! authnet CLI: real/fake image classification with Grad-CAM explanations.

#![deny(unsafe_code)]
#![warn(clippy::all)]

mod server;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authnet_core::backend::CpuBackend;
use authnet_core::{ImageClassifier, ImageShape, ModelFamily, ServiceConfig};
use authnet_explain::{select_target_layer, GradCamExplainer, TargetClass};
use authnet_models::{
    build_classifier, init_classifier, load_models, metadata_path, predict, save_model,
    AnyClassifier,
};
use authnet_transforms::{decode_rgb, Preprocessor};

use crate::server::{resolve_model_name, AppState, InferenceBackend, PredictResponse, ServeDevice};

/// Backend used by every command.
type Backend = CpuBackend;

#[derive(Parser)]
#[command(name = "authnet")]
#[command(author, version)]
#[command(about = "Real/fake image classification with Grad-CAM explanations")]
#[command(long_about = "authnet: classify images as real or fake and show which regions drove the decision.

EXAMPLES:
  # Show the layers of a configured model and the layer Grad-CAM will probe
  authnet inspect --config authnet.json --model effnet

  # Classify an image
  authnet predict --config authnet.json --model cnn --image photo.jpg

  # Write the Grad-CAM overlay for the fake class
  authnet explain --config authnet.json --model vgg --image photo.jpg --output cam.jpg --class 1

  # Start the HTTP service
  authnet serve --config authnet.json

MODEL FAMILIES:
  cnn             - Plain convolutional stack
  vgg (vgg16)     - VGG16-style network
  effnet          - EfficientNet-style network")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a model's layers and its Grad-CAM target layer
    Inspect {
        /// Service configuration file
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        /// Configured model name (cnn, vgg, vgg16, effnet)
        #[arg(long, value_name = "NAME")]
        model: String,
    },
    /// Classify an image and print the prediction JSON
    Predict {
        /// Service configuration file
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        /// Configured model name
        #[arg(long, value_name = "NAME")]
        model: String,

        /// Image to classify
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Decision threshold in [0.1, 0.9]; defaults to the configured one
        #[arg(long, value_name = "T")]
        threshold: Option<f32>,

        /// Skip the Grad-CAM overlay
        #[arg(long, default_value = "false")]
        no_heatmap: bool,
    },
    /// Write the Grad-CAM overlay of an image as JPEG
    Explain {
        /// Service configuration file
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        /// Configured model name
        #[arg(long, value_name = "NAME")]
        model: String,

        /// Image to explain
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Output JPEG path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overlay intensity in [0, 1]; defaults to the configured one
        #[arg(long, value_name = "A")]
        intensity: Option<f32>,

        /// Output index to explain instead of the predicted class
        #[arg(long = "class", value_name = "K")]
        class_index: Option<usize>,
    },
    /// Write freshly initialized weights and their metadata sidecar
    InitCheckpoint {
        /// Model family: cnn, vgg, effnet
        #[arg(long, value_name = "FAMILY")]
        family: ModelFamily,

        /// Checkpoint path, without extension
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Square input size in pixels
        #[arg(long, default_value = "224", value_name = "PIXELS")]
        size: usize,

        /// Number of outputs: 1 for a sigmoid head, 2 or more for softmax
        #[arg(long, default_value = "1", value_name = "N")]
        outputs: usize,
    },
    /// Start the HTTP service
    Serve {
        /// Service configuration file
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Inspect { config, model } => handle_inspect(&config, &model),
        Commands::Predict {
            config,
            model,
            image,
            threshold,
            no_heatmap,
        } => handle_predict(&config, &model, &image, threshold, no_heatmap),
        Commands::Explain {
            config,
            model,
            image,
            output,
            intensity,
            class_index,
        } => handle_explain(&config, &model, &image, &output, intensity, class_index),
        Commands::InitCheckpoint {
            family,
            output,
            size,
            outputs,
        } => handle_init_checkpoint(family, &output, size, outputs),
        Commands::Serve { config } => handle_serve(&config),
    }
}

/// Load the configuration and build one configured model.
fn load_model(
    config_path: &Path,
    name: &str,
    device: &ServeDevice,
) -> Result<(ServiceConfig, AnyClassifier<Backend>)> {
    let config = ServiceConfig::load(config_path)
        .with_context(|| format!("Failed to load config '{}'", config_path.display()))?;

    let resolved = resolve_model_name(name);
    let Some(spec) = config.models.get(&resolved) else {
        let names: Vec<&str> = config.models.keys().map(String::as_str).collect();
        bail!(
            "Unknown model '{}'. Configured models: {}",
            name,
            names.join(", ")
        );
    };

    let model = build_classifier::<Backend>(&config.resolved(spec), device)
        .with_context(|| format!("Failed to load model '{}'", resolved))?;
    Ok((config, model))
}

fn load_image(path: &Path) -> Result<image::RgbImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    decode_rgb(&bytes).with_context(|| format!("Failed to decode '{}'", path.display()))
}

fn handle_inspect(config_path: &Path, name: &str) -> Result<()> {
    let device = ServeDevice::default();
    let (_, model) = load_model(config_path, name, &device)?;

    println!("Model: {} ({})", name, model.family());
    println!("Input: {}", model.input_shape());
    println!("Head: {:?}", model.output_head());
    println!("Parameters: {}", model.num_params());
    println!();
    println!("Layers:");
    println!("─────────────────────────────────────────");
    let layers = model.layers();
    for (i, layer) in layers.iter().enumerate() {
        println!("  {:>3}  {:<32} {:?}", i, layer.name, layer.kind);
    }
    println!();

    match select_target_layer(&layers, model.family()) {
        Ok(layer) => println!("Grad-CAM target layer: {}", layer.name),
        Err(e) => println!("Grad-CAM unavailable: {}", e),
    }
    Ok(())
}

fn handle_predict(
    config_path: &Path,
    name: &str,
    image_path: &Path,
    threshold: Option<f32>,
    no_heatmap: bool,
) -> Result<()> {
    let device = ServeDevice::default();
    let (config, model) = load_model(config_path, name, &device)?;
    let image = load_image(image_path)?;

    let preprocessor = Preprocessor::new(config.preprocess.clone());
    let threshold = threshold.unwrap_or(config.default_threshold);
    let classifier = model.valid();
    let input = preprocessor.prepare_for::<InferenceBackend>(&image, classifier.input_shape(), &device)?;
    let classification = predict(&classifier, input, threshold)?;

    let heatmap = if no_heatmap {
        None
    } else {
        GradCamExplainer::new(config.explain.clone()).explain_best_effort::<Backend, _>(
            &model,
            &image,
            &preprocessor,
            TargetClass::Predicted,
            &device,
        )
    };

    let response = PredictResponse {
        model: name.to_string(),
        predicted_class: classification.class_index,
        interpretation: classification.interpretation(),
        probabilities: classification.probabilities,
        probability: classification.fake_probability,
        threshold: classification.threshold,
        sensitivity: classification.sensitivity.label().to_string(),
        heatmap,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn handle_explain(
    config_path: &Path,
    name: &str,
    image_path: &Path,
    output: &Path,
    intensity: Option<f32>,
    class_index: Option<usize>,
) -> Result<()> {
    let device = ServeDevice::default();
    let (config, model) = load_model(config_path, name, &device)?;
    let image = load_image(image_path)?;

    let mut explain_config = config.explain.clone();
    if let Some(intensity) = intensity {
        explain_config = explain_config.with_intensity(intensity);
    }
    let target = class_index.map_or(TargetClass::Predicted, TargetClass::Index);

    let explanation = GradCamExplainer::new(explain_config)
        .explain::<Backend, _>(
            &model,
            &image,
            &Preprocessor::new(config.preprocess.clone()),
            target,
            &device,
        )
        .with_context(|| format!("Failed to explain '{}'", image_path.display()))?;

    let jpeg = STANDARD.decode(&explanation.image_base64)?;
    std::fs::write(output, jpeg)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;

    println!("Layer: {}", explanation.layer);
    println!("Class: {} (score {:.4})", explanation.class_index, explanation.score);
    println!(
        "Heatmap: {}x{} -> {}x{}",
        explanation.heatmap.height(),
        explanation.heatmap.width(),
        image.height(),
        image.width()
    );
    println!("Saved overlay to {}", output.display());
    Ok(())
}

fn handle_init_checkpoint(family: ModelFamily, output: &Path, size: usize, outputs: usize) -> Result<()> {
    if outputs == 0 {
        bail!("A classifier needs at least one output");
    }
    let device = ServeDevice::default();
    let overrides = serde_json::json!({ "n_outputs": outputs });
    let model = init_classifier::<Backend>(family, ImageShape::square(size), Some(&overrides), &device)
        .with_context(|| format!("Failed to build a {} classifier", family))?;

    let weights = save_model(&model, output)
        .with_context(|| format!("Failed to save checkpoint '{}'", output.display()))?;

    println!("Family: {}", family);
    println!("Parameters: {}", model.num_params());
    println!("Weights: {}", weights.display());
    println!("Metadata: {}", metadata_path(output).display());
    println!();
    println!("These weights are untrained. Reference the checkpoint from your config:");
    println!(
        "  \"{}\": {{ \"family\": \"{}\", \"checkpoint\": \"{}\" }}",
        family,
        family,
        output.display()
    );
    Ok(())
}

fn handle_serve(config_path: &Path) -> Result<()> {
    let config = ServiceConfig::load(config_path)
        .with_context(|| format!("Failed to load config '{}'", config_path.display()))?;
    let device = ServeDevice::default();

    let models = load_models::<Backend>(&config, &device);
    if models.loaded.is_empty() {
        tracing::warn!(failed = ?models.failed.keys().collect::<Vec<_>>(), "No model loaded");
    }
    let state = AppState::new(models, &config, device);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    runtime.block_on(server::serve(state, &config.server.bind_address()))
}
