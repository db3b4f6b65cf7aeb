//! Turning classifier outputs into real/fake verdicts.

use authnet_core::{ImageClassifier, OutputHead};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Class labels by output index.
pub const CLASS_LABELS: [&str; 2] = ["real", "fake"];

/// Smallest accepted decision threshold.
pub const MIN_THRESHOLD: f32 = 0.1;

/// Largest accepted decision threshold.
pub const MAX_THRESHOLD: f32 = 0.9;

/// Final decision for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Authentic image.
    Real,
    /// Generated or manipulated image.
    Fake,
}

impl Verdict {
    /// Label as used in responses.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Real => CLASS_LABELS[0],
            Self::Fake => CLASS_LABELS[1],
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How eagerly a threshold flags images as fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Threshold below 0.4.
    High,
    /// Threshold in `[0.4, 0.6]`.
    Medium,
    /// Threshold above 0.6.
    Low,
}

impl Sensitivity {
    /// Label as used in responses.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Sensitivity implied by a threshold.
    pub fn for_threshold(threshold: f32) -> Self {
        if threshold < 0.4 {
            Self::High
        } else if threshold > 0.6 {
            Self::Low
        } else {
            Self::Medium
        }
    }
}

/// Outcome of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Index of the predicted class (0 = real, 1 = fake).
    pub class_index: usize,
    /// Decision.
    pub verdict: Verdict,
    /// Per-class probabilities.
    pub probabilities: Vec<f32>,
    /// Probability of the fake class.
    pub fake_probability: f32,
    /// Threshold used for a sigmoid head.
    pub threshold: f32,
    /// Sensitivity implied by the threshold.
    pub sensitivity: Sensitivity,
}

impl Classification {
    /// Human-readable summary, e.g. `FAKE (87.3% fake confidence)`.
    pub fn interpretation(&self) -> String {
        format!(
            "{} ({:.1}% fake confidence)",
            self.verdict.label().to_uppercase(),
            self.fake_probability * 100.0
        )
    }
}

/// Check that a threshold lies in `[0.1, 0.9]`.
pub fn validate_threshold(threshold: f32) -> Result<f32> {
    if (MIN_THRESHOLD..=MAX_THRESHOLD).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ModelError::InvalidThreshold(threshold))
    }
}

/// Classify activated outputs of a single image.
///
/// - Sigmoid head: the score is the fake probability, the image is fake when
///   the score exceeds `threshold`, probabilities are `[1 - s, s]`.
/// - Softmax head: the class is the argmax and the fake probability is the
///   probability of class 1 (0.5 with a single class). The threshold is
///   recorded but does not affect the decision.
///
/// # Errors
///
/// - [`ModelError::InvalidThreshold`] outside `[0.1, 0.9]`
/// - [`ModelError::OutputMismatch`] when `outputs` does not fit `head`
pub fn classify(outputs: &[f32], head: OutputHead, threshold: f32) -> Result<Classification> {
    let threshold = validate_threshold(threshold)?;
    if outputs.len() != head.n_outputs() || outputs.is_empty() {
        return Err(ModelError::OutputMismatch {
            expected: head.n_outputs(),
            got: outputs.len(),
        });
    }

    let (class_index, probabilities, fake_probability) = match head {
        OutputHead::Sigmoid => {
            let score = outputs[0];
            let class_index = usize::from(score > threshold);
            (class_index, vec![1.0 - score, score], score)
        }
        OutputHead::Softmax { .. } => {
            let class_index = OutputHead::argmax(outputs);
            let fake_probability = outputs.get(1).copied().unwrap_or(0.5);
            (class_index, outputs.to_vec(), fake_probability)
        }
    };

    let verdict = if class_index == 1 {
        Verdict::Fake
    } else {
        Verdict::Real
    };

    Ok(Classification {
        class_index,
        verdict,
        probabilities,
        fake_probability,
        threshold,
        sensitivity: Sensitivity::for_threshold(threshold),
    })
}

/// Run a classifier on a prepared `(1, C, H, W)` input and classify it.
///
/// # Errors
///
/// Fails when the input violates the classifier's contract, or for the
/// reasons listed on [`classify`].
pub fn predict<B, M>(model: &M, input: Tensor<B, 4>, threshold: f32) -> Result<Classification>
where
    B: Backend,
    M: ImageClassifier<B> + ?Sized,
{
    validate_threshold(threshold)?;
    model.verify_input(input.dims())?;

    let outputs: Vec<f32> = model
        .forward(input)
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| ModelError::Inference(format!("{e:?}")))?;

    let classification = classify(&outputs, model.output_head(), threshold)?;
    tracing::debug!(
        family = %model.family(),
        class = classification.verdict.label(),
        fake_probability = classification.fake_probability,
        "Classified image"
    );
    Ok(classification)
}
