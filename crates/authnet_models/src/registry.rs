//! Family registry: builds classifiers from configuration.
//!
//! Every configured model is constructed through [`build_classifier`], which
//! picks the architecture from the spec's family tag, applies JSON overrides
//! and loads the checkpoint when one is configured.
//!
//! # Example
//!
//! ```rust,ignore
//! use authnet_core::{ModelFamily, ModelSpec};
//! use authnet_models::build_classifier;
//!
//! let spec = ModelSpec::new(ModelFamily::EffNet).with_checkpoint("models/effnet");
//! let model = build_classifier::<CpuBackend>(&spec, &device)?;
//! ```

use std::collections::BTreeMap;

use authnet_core::{
    ActivationHook, ImageClassifier, ImageShape, LayerInfo, ModelFamily, ModelSpec, OutputHead,
    ServiceConfig,
};
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::checkpoint::load_checkpoint;
use crate::cnn::{AuthCnn, AuthCnnConfig, EffNet, EffNetConfig, Vgg16, Vgg16Config};
use crate::error::{ModelError, Result};

/// Any constructible classifier.
#[derive(Debug, Clone)]
pub enum AnyClassifier<B: Backend> {
    /// Plain CNN.
    Cnn(AuthCnn<B>),
    /// VGG16.
    Vgg(Vgg16<B>),
    /// EfficientNet-style network.
    EffNet(EffNet<B>),
}

impl<B: Backend> AnyClassifier<B> {
    /// Borrow the inner classifier through the adapter trait.
    pub fn as_classifier(&self) -> &dyn ImageClassifier<B> {
        match self {
            Self::Cnn(model) => model,
            Self::Vgg(model) => model,
            Self::EffNet(model) => model,
        }
    }

    /// Architecture configuration as JSON.
    pub fn config_json(&self) -> Result<Value> {
        let value = match self {
            Self::Cnn(model) => serde_json::to_value(model.config())?,
            Self::Vgg(model) => serde_json::to_value(model.config())?,
            Self::EffNet(model) => serde_json::to_value(model.config())?,
        };
        Ok(value)
    }

    /// Total number of parameters.
    pub fn num_params(&self) -> usize {
        match self {
            Self::Cnn(model) => model.num_params(),
            Self::Vgg(model) => model.num_params(),
            Self::EffNet(model) => model.num_params(),
        }
    }
}

impl<B: AutodiffBackend> AnyClassifier<B> {
    /// The same weights on the inner backend, for forward passes that need
    /// no gradients.
    pub fn valid(&self) -> AnyClassifier<B::InnerBackend> {
        match self {
            Self::Cnn(model) => AnyClassifier::Cnn(model.valid()),
            Self::Vgg(model) => AnyClassifier::Vgg(model.valid()),
            Self::EffNet(model) => AnyClassifier::EffNet(model.valid()),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for AnyClassifier<B> {
    fn family(&self) -> ModelFamily {
        self.as_classifier().family()
    }

    fn input_shape(&self) -> ImageShape {
        self.as_classifier().input_shape()
    }

    fn output_head(&self) -> OutputHead {
        self.as_classifier().output_head()
    }

    fn layers(&self) -> Vec<LayerInfo> {
        self.as_classifier().layers()
    }

    fn forward_with_hook(&self, x: Tensor<B, 4>, hook: &mut dyn ActivationHook<B>) -> Tensor<B, 2> {
        self.as_classifier().forward_with_hook(x, hook)
    }
}

impl<B: Backend> From<AuthCnn<B>> for AnyClassifier<B> {
    fn from(model: AuthCnn<B>) -> Self {
        Self::Cnn(model)
    }
}

impl<B: Backend> From<Vgg16<B>> for AnyClassifier<B> {
    fn from(model: Vgg16<B>) -> Self {
        Self::Vgg(model)
    }
}

impl<B: Backend> From<EffNet<B>> for AnyClassifier<B> {
    fn from(model: EffNet<B>) -> Self {
        Self::EffNet(model)
    }
}

fn family_config<C: DeserializeOwned + Default>(overrides: Option<&Value>) -> Result<C> {
    match overrides {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Ok(C::default()),
    }
}

/// Construct a classifier with freshly initialized weights.
///
/// `overrides` are parsed as the family's config; missing fields keep their
/// defaults. The input contract always comes from `input`.
///
/// # Errors
///
/// - [`ModelError::UnsupportedFamily`] for [`ModelFamily::Generic`]
/// - [`ModelError::InvalidConfig`] when the architecture cannot be built
/// - [`ModelError::Serialization`] when the overrides do not parse
pub fn init_classifier<B: Backend>(
    family: ModelFamily,
    input: ImageShape,
    overrides: Option<&Value>,
    device: &B::Device,
) -> Result<AnyClassifier<B>> {
    let model = match family {
        ModelFamily::Cnn => {
            let mut config: AuthCnnConfig = family_config(overrides)?;
            config.input = input;
            config.validate()?;
            AnyClassifier::Cnn(config.init(device))
        }
        ModelFamily::Vgg => {
            let mut config: Vgg16Config = family_config(overrides)?;
            config.input = input;
            config.validate()?;
            AnyClassifier::Vgg(config.init(device))
        }
        ModelFamily::EffNet => {
            let mut config: EffNetConfig = family_config(overrides)?;
            config.input = input;
            config.validate()?;
            AnyClassifier::EffNet(config.init(device))
        }
        ModelFamily::Generic => return Err(ModelError::UnsupportedFamily(family)),
    };
    Ok(model)
}

/// Build the classifier a [`ModelSpec`] describes.
///
/// With a checkpoint, the weights and the recorded architecture are loaded
/// and checked against the spec's contract. Without one, the model starts
/// from fresh weights and a warning is logged.
pub fn build_classifier<B: Backend>(spec: &ModelSpec, device: &B::Device) -> Result<AnyClassifier<B>> {
    match &spec.checkpoint {
        Some(path) => load_checkpoint(spec, path, device),
        None => {
            tracing::warn!(
                family = %spec.family,
                "No checkpoint configured, using untrained weights"
            );
            init_classifier(spec.family, spec.input_shape(), spec.config.as_ref(), device)
        }
    }
}

/// Classifiers loaded from a [`ServiceConfig`].
#[derive(Debug)]
pub struct ModelSet<B: Backend> {
    /// Successfully loaded models by name.
    pub loaded: BTreeMap<String, AnyClassifier<B>>,
    /// Load failures by model name.
    pub failed: BTreeMap<String, String>,
}

impl<B: Backend> ModelSet<B> {
    /// Names of all configured models, loaded or not.
    pub fn configured(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .loaded
            .keys()
            .chain(self.failed.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Load every model in the service configuration.
///
/// A model that fails to load is recorded in [`ModelSet::failed`] and does
/// not prevent the others from loading.
pub fn load_models<B: Backend>(config: &ServiceConfig, device: &B::Device) -> ModelSet<B> {
    let mut loaded = BTreeMap::new();
    let mut failed = BTreeMap::new();

    for (name, spec) in &config.models {
        match build_classifier::<B>(&config.resolved(spec), device) {
            Ok(model) => {
                tracing::info!(
                    model = %name,
                    family = %spec.family,
                    params = model.num_params(),
                    "Loaded model"
                );
                loaded.insert(name.clone(), model);
            }
            Err(e) => {
                tracing::error!(model = %name, error = %e, "Failed to load model");
                failed.insert(name.clone(), e.to_string());
            }
        }
    }

    ModelSet { loaded, failed }
}
