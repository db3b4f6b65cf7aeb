//! Service configuration.
//!
//! A single [`ServiceConfig`] describes every model to load at startup, how
//! uploaded images are preprocessed, how explanations are rendered and where
//! the HTTP service listens. It is read once and handed to the loaders; the
//! explainer itself only ever sees [`ExplainConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::layer::ModelFamily;
use crate::shape::ImageShape;

/// Default Grad-CAM overlay intensity.
pub const DEFAULT_INTENSITY: f32 = 0.4;

/// Default JPEG quality for rendered explanations.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Default decision threshold for sigmoid heads.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Default request body limit of the HTTP service (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// One model to load at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Architecture family.
    pub family: ModelFamily,
    /// Checkpoint path (burn record, without or with the `.mpk` extension).
    ///
    /// When absent the model starts from freshly initialized weights.
    #[serde(default)]
    pub checkpoint: Option<PathBuf>,
    /// Declared input contract.
    ///
    /// When absent the service's `preprocess.image_size` applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ImageShape>,
    /// Family-specific architecture overrides as JSON.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

impl ModelSpec {
    /// Spec for a family with default input and no checkpoint.
    #[must_use]
    pub fn new(family: ModelFamily) -> Self {
        Self {
            family,
            checkpoint: None,
            input: None,
            config: None,
        }
    }

    /// Set the checkpoint path.
    #[must_use]
    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    /// Set the input contract.
    #[must_use]
    pub fn with_input(mut self, input: ImageShape) -> Self {
        self.input = Some(input);
        self
    }

    /// Declared input, or the default `224x224x3` when none is set.
    #[must_use]
    pub fn input_shape(&self) -> ImageShape {
        self.input.unwrap_or_default()
    }

    /// Set architecture overrides.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Image preprocessing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Model input `[height, width]` for specs that declare no input.
    pub image_size: [usize; 2],
    /// Whether to divide pixel values by `normalization_factor`.
    pub normalize: bool,
    /// Divisor applied to 8-bit pixel values.
    pub normalization_factor: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: [224, 224],
            normalize: true,
            normalization_factor: 255.0,
        }
    }
}

impl PreprocessConfig {
    /// RGB shape built from `image_size`.
    #[must_use]
    pub fn default_shape(&self) -> ImageShape {
        let [height, width] = self.image_size;
        ImageShape::new(height, width, 3)
    }
}

/// Grad-CAM rendering settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Heatmap weight in the blend, in `[0, 1]`.
    pub intensity: f32,
    /// JPEG quality of the rendered overlay, in `[1, 100]`.
    pub jpeg_quality: u8,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            intensity: DEFAULT_INTENSITY,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ExplainConfig {
    /// Set the overlay intensity.
    #[must_use]
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    /// Set the JPEG quality.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.intensity) {
            return Err(CoreError::Config(format!(
                "intensity must be in [0, 1], got {}",
                self.intensity
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CoreError::Config(format!(
                "jpeg_quality must be in [1, 100], got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Top-level configuration of the classification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Models by public name (e.g. `cnn`, `vgg`, `effnet`).
    pub models: BTreeMap<String, ModelSpec>,
    /// Preprocessing settings.
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    /// Explanation settings.
    #[serde(default)]
    pub explain: ExplainConfig,
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Threshold used when a request does not supply one.
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let models = ModelFamily::ALL
            .iter()
            .filter(|family| **family != ModelFamily::Generic)
            .map(|family| (family.as_str().to_string(), ModelSpec::new(*family)))
            .collect();
        Self {
            models,
            preprocess: PreprocessConfig::default(),
            explain: ExplainConfig::default(),
            server: ServerConfig::default(),
            default_threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Input contract of `spec`, falling back to `preprocess.image_size`.
    #[must_use]
    pub fn input_for(&self, spec: &ModelSpec) -> ImageShape {
        spec.input.unwrap_or_else(|| self.preprocess.default_shape())
    }

    /// Copy of `spec` with its input contract filled in.
    #[must_use]
    pub fn resolved(&self, spec: &ModelSpec) -> ModelSpec {
        spec.clone().with_input(self.input_for(spec))
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(CoreError::Config("no models configured".to_string()));
        }
        for (name, spec) in &self.models {
            let input = self.input_for(spec);
            if input.is_empty() || input.channels() != 3 {
                return Err(CoreError::Config(format!(
                    "model '{name}' must declare a non-empty RGB input, got {input}"
                )));
            }
        }
        if self.preprocess.normalize && self.preprocess.normalization_factor <= 0.0 {
            return Err(CoreError::Config(
                "normalization_factor must be positive".to_string(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(CoreError::Config(
                "max_upload_bytes must be positive".to_string(),
            ));
        }
        if !(0.1..=0.9).contains(&self.default_threshold) {
            return Err(CoreError::Config(format!(
                "default_threshold must be in [0.1, 0.9], got {}",
                self.default_threshold
            )));
        }
        self.explain.validate()
    }
}
