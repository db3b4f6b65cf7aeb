//! Shared server state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use authnet_core::backend::CpuBackend;
use authnet_core::ServiceConfig;
use authnet_explain::GradCamExplainer;
use authnet_models::{AnyClassifier, ModelSet};
use authnet_transforms::Preprocessor;
use burn::tensor::backend::{AutodiffBackend, Backend};

/// Device of the serving backend.
pub type ServeDevice = <CpuBackend as Backend>::Device;

/// Gradient-free backend used for classification.
pub type InferenceBackend = <CpuBackend as AutodiffBackend>::InnerBackend;

/// A loaded classifier behind a lock.
///
/// Burn modules are `Send` but not `Sync`, so requests take turns per model.
pub type SharedClassifier = Arc<Mutex<AnyClassifier<CpuBackend>>>;

/// Public model names accepted on top of the configured ones.
const MODEL_ALIASES: [(&str, &str); 2] = [("vgg16", "vgg"), ("efficientnet", "effnet")];

/// Map a requested model name to its configured name.
pub fn resolve_model_name(name: &str) -> String {
    let name = name.to_lowercase();
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, target)| (*target).to_string())
        .unwrap_or(name)
}

/// Application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    models: Arc<BTreeMap<String, SharedClassifier>>,
    failed: Arc<BTreeMap<String, String>>,
    preprocessor: Arc<Preprocessor>,
    explainer: Arc<GradCamExplainer>,
    default_threshold: f32,
    max_upload_bytes: usize,
    device: ServeDevice,
}

/// Where a requested model stands.
pub enum ModelLookup {
    /// Loaded and ready.
    Ready(SharedClassifier),
    /// Configured, but loading failed.
    Unavailable(String),
    /// Not configured.
    Unknown,
}

impl AppState {
    /// Build the state from loaded models and the service configuration.
    pub fn new(models: ModelSet<CpuBackend>, config: &ServiceConfig, device: ServeDevice) -> Self {
        let loaded = models
            .loaded
            .into_iter()
            .map(|(name, model)| (name, Arc::new(Mutex::new(model))))
            .collect();

        Self {
            models: Arc::new(loaded),
            failed: Arc::new(models.failed),
            preprocessor: Arc::new(Preprocessor::new(config.preprocess.clone())),
            explainer: Arc::new(GradCamExplainer::new(config.explain.clone())),
            default_threshold: config.default_threshold,
            max_upload_bytes: config.server.max_upload_bytes,
            device,
        }
    }

    /// Look up a model by its requested name, aliases included.
    pub fn lookup(&self, name: &str) -> ModelLookup {
        let name = resolve_model_name(name);
        if let Some(model) = self.models.get(&name) {
            ModelLookup::Ready(Arc::clone(model))
        } else if let Some(reason) = self.failed.get(&name) {
            ModelLookup::Unavailable(reason.clone())
        } else {
            ModelLookup::Unknown
        }
    }

    /// Names of the loaded models.
    pub fn loaded_models(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Every name the predict route accepts.
    pub fn available_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .models
            .keys()
            .chain(self.failed.keys())
            .cloned()
            .collect();
        for (alias, target) in MODEL_ALIASES {
            if names.iter().any(|name| name == target) {
                names.push(alias.to_string());
            }
        }
        names.sort();
        names
    }

    /// Threshold used when a request does not supply one.
    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    /// Largest accepted request body.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Shared preprocessor.
    pub fn preprocessor(&self) -> Arc<Preprocessor> {
        Arc::clone(&self.preprocessor)
    }

    /// Shared explainer.
    pub fn explainer(&self) -> Arc<GradCamExplainer> {
        Arc::clone(&self.explainer)
    }

    /// Inference device.
    pub fn device(&self) -> ServeDevice {
        self.device.clone()
    }
}
