//! Model checkpointing.
//!
//! Weights are stored with burn's named MessagePack recorder (`*.mpk`). Next
//! to every weight file sits a JSON sidecar (`*.meta.json`) recording the
//! family, the declared input contract, the output head and the architecture
//! config, so a checkpoint can be rebuilt and checked against the
//! configuration that asks for it.
//!
//! # Example
//!
//! ```rust,ignore
//! use authnet_models::checkpoint::{save_model, load_checkpoint};
//!
//! save_model(&model, "models/cnn")?;
//! let spec = ModelSpec::new(ModelFamily::Cnn).with_checkpoint("models/cnn");
//! let loaded = load_checkpoint::<CpuBackend>(&spec, "models/cnn".as_ref(), &device)?;
//! ```

use std::path::{Path, PathBuf};

use authnet_core::{ImageClassifier, ImageShape, ModelFamily, ModelSpec, OutputHead};
use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cnn::{AuthCnn, EffNet, Vgg16};
use crate::error::{ModelError, Result};
use crate::registry::{init_classifier, AnyClassifier};

/// Path of the weight file for a checkpoint path.
pub fn weights_path(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().with_extension("mpk")
}

/// Path of the metadata sidecar for a checkpoint path.
pub fn metadata_path(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().with_extension("meta.json")
}

/// Model checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Architecture family.
    pub family: ModelFamily,
    /// Input contract the weights were built for.
    pub input: ImageShape,
    /// Output head.
    pub head: OutputHead,
    /// Architecture configuration as JSON.
    pub config_json: String,
    /// Version of the crate that wrote the checkpoint.
    #[serde(default)]
    pub created_by: String,
}

impl CheckpointMetadata {
    /// Describe a classifier.
    pub fn for_model<B: Backend>(model: &AnyClassifier<B>) -> Result<Self> {
        Ok(Self {
            family: model.family(),
            input: model.input_shape(),
            head: model.output_head(),
            config_json: serde_json::to_string(&model.config_json()?)?,
            created_by: format!("authnet_models {}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Parsed architecture configuration.
    pub fn config(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.config_json)?)
    }

    /// Check the recorded contract against a model spec.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ContractMismatch`] when the family or the input
    /// shape differ.
    pub fn verify(&self, spec: &ModelSpec) -> Result<()> {
        if self.family != spec.family {
            return Err(ModelError::ContractMismatch {
                what: "family",
                expected: spec.family.to_string(),
                got: self.family.to_string(),
            });
        }
        if self.input != spec.input_shape() {
            return Err(ModelError::ContractMismatch {
                what: "input shape",
                expected: spec.input_shape().to_string(),
                got: self.input.to_string(),
            });
        }
        Ok(())
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Save a module's record with the named MessagePack recorder.
pub fn save_record<B, M>(module: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(module.clone().into_record(), weights_path(path))
        .map_err(|e| ModelError::Checkpoint(format!("cannot save weights: {e:?}")))
}

/// Load a module record saved with [`save_record`].
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let path = weights_path(path);
    if !path.exists() {
        return Err(ModelError::Checkpoint(format!(
            "weights not found at {}",
            path.display()
        )));
    }
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .load(path, device)
        .map_err(|e| ModelError::Checkpoint(format!("cannot load weights: {e:?}")))
}

/// Save a classifier's weights and metadata sidecar.
///
/// Returns the path of the weight file.
pub fn save_model<B: Backend>(model: &AnyClassifier<B>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match model {
        AnyClassifier::Cnn(m) => save_record::<B, _>(m, path)?,
        AnyClassifier::Vgg(m) => save_record::<B, _>(m, path)?,
        AnyClassifier::EffNet(m) => save_record::<B, _>(m, path)?,
    }
    CheckpointMetadata::for_model(model)?.save(metadata_path(path))?;

    tracing::info!(path = %path.display(), family = %model.family(), "Saved checkpoint");
    Ok(weights_path(path))
}

/// Load the checkpoint at `path` for `spec`.
///
/// The architecture is rebuilt from the recorded config, so architecture
/// overrides in the spec are ignored when a checkpoint is present.
///
/// # Errors
///
/// - [`ModelError::MissingMetadata`] when the sidecar is absent
/// - [`ModelError::ContractMismatch`] when family, input or head disagree
/// - [`ModelError::Checkpoint`] when the weights cannot be read
pub fn load_checkpoint<B: Backend>(
    spec: &ModelSpec,
    path: &Path,
    device: &B::Device,
) -> Result<AnyClassifier<B>> {
    let meta_path = metadata_path(path);
    if !meta_path.exists() {
        return Err(ModelError::MissingMetadata(meta_path));
    }
    let metadata = CheckpointMetadata::load(&meta_path)?;
    metadata.verify(spec)?;

    let skeleton =
        init_classifier::<B>(metadata.family, metadata.input, Some(&metadata.config()?), device)?;
    if skeleton.output_head() != metadata.head {
        return Err(ModelError::ContractMismatch {
            what: "output head",
            expected: format!("{:?}", metadata.head),
            got: format!("{:?}", skeleton.output_head()),
        });
    }

    let model = match skeleton {
        AnyClassifier::Cnn(m) => {
            AnyClassifier::Cnn(m.load_record(load_record::<B, AuthCnn<B>>(path, device)?))
        }
        AnyClassifier::Vgg(m) => {
            AnyClassifier::Vgg(m.load_record(load_record::<B, Vgg16<B>>(path, device)?))
        }
        AnyClassifier::EffNet(m) => {
            AnyClassifier::EffNet(m.load_record(load_record::<B, EffNet<B>>(path, device)?))
        }
    };

    tracing::info!(
        path = %path.display(),
        family = %metadata.family,
        input = %metadata.input,
        "Loaded checkpoint"
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnn::AuthCnnConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tiny_cnn(device: &<TestBackend as Backend>::Device) -> AnyClassifier<TestBackend> {
        AuthCnnConfig::new(ImageShape::square(16), 1)
            .with_filters(vec![2])
            .with_hidden_units(3)
            .init(device)
            .into()
    }

    #[test]
    fn test_sidecar_paths() {
        assert_eq!(weights_path("models/cnn"), PathBuf::from("models/cnn.mpk"));
        assert_eq!(weights_path("models/cnn.mpk"), PathBuf::from("models/cnn.mpk"));
        assert_eq!(metadata_path("models/cnn"), PathBuf::from("models/cnn.meta.json"));
    }

    #[test]
    fn test_save_and_load_checkpoint() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cnn");

        let model = tiny_cnn(&device);
        let weights = save_model(&model, &path).unwrap();
        assert!(weights.exists());
        assert!(metadata_path(&path).exists());

        let spec = ModelSpec::new(ModelFamily::Cnn)
            .with_input(ImageShape::square(16))
            .with_checkpoint(&path);
        let loaded = load_checkpoint::<TestBackend>(&spec, &path, &device).unwrap();

        let x = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let expected: f32 = model.forward(x.clone()).into_scalar().elem();
        let actual: f32 = loaded.forward(x).into_scalar().elem();
        assert!((expected - actual).abs() < 1e-6);
    }

    #[test]
    fn test_input_contract_mismatch_is_rejected() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cnn");
        save_model(&tiny_cnn(&device), &path).unwrap();

        let spec = ModelSpec::new(ModelFamily::Cnn).with_input(ImageShape::square(224));
        let result = load_checkpoint::<TestBackend>(&spec, &path, &device);
        assert!(matches!(
            result,
            Err(ModelError::ContractMismatch { what: "input shape", .. })
        ));
    }

    #[test]
    fn test_family_mismatch_is_rejected() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cnn");
        save_model(&tiny_cnn(&device), &path).unwrap();

        let spec = ModelSpec::new(ModelFamily::Vgg).with_input(ImageShape::square(16));
        let result = load_checkpoint::<TestBackend>(&spec, &path, &device);
        assert!(matches!(
            result,
            Err(ModelError::ContractMismatch { what: "family", .. })
        ));
    }

    #[test]
    fn test_missing_metadata() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing");
        let spec = ModelSpec::new(ModelFamily::Cnn);
        let result = load_checkpoint::<TestBackend>(&spec, &path, &device);
        assert!(matches!(result, Err(ModelError::MissingMetadata(_))));
    }

    #[test]
    fn test_metadata_roundtrip() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let meta = CheckpointMetadata::for_model(&tiny_cnn(&device)).unwrap();
        assert_eq!(meta.family, ModelFamily::Cnn);
        assert_eq!(meta.head, OutputHead::Sigmoid);

        let path = dir.path().join("cnn.meta.json");
        meta.save(&path).unwrap();
        assert_eq!(CheckpointMetadata::load(&path).unwrap(), meta);
    }
}
