//! Grad-CAM heatmap synthesis.
//!
//! Channel importance weights are the spatial mean of the gradient. The
//! activation channels are summed with those weights, rectified and scaled
//! so that the strongest location is exactly 1.

use burn::prelude::*;
use ndarray::Array2;

use crate::error::{ExplainError, Result};

/// Largest maximum importance still treated as "no positive evidence".
pub const DEGENERATE_EPSILON: f32 = 1e-12;

/// Normalized class-activation map.
///
/// Rows follow the feature-map height and columns its width. Every value
/// lies in `[0, 1]` and the maximum is exactly `1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    values: Array2<f32>,
}

impl Heatmap {
    /// Rectify and normalize a raw importance map.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::DegenerateHeatmap`] when the rectified maximum
    /// is not above [`DEGENERATE_EPSILON`] or is not finite.
    pub fn normalize(mut raw: Array2<f32>) -> Result<Self> {
        if raw.is_empty() {
            return Err(ExplainError::ShapeMismatch("empty importance map".to_string()));
        }
        if let Some(bad) = raw.iter().copied().find(|v| !v.is_finite()) {
            return Err(ExplainError::DegenerateHeatmap { max: bad });
        }
        raw.mapv_inplace(|v| v.max(0.0));
        let max = raw.iter().copied().fold(0.0f32, f32::max);
        if max <= DEGENERATE_EPSILON {
            return Err(ExplainError::DegenerateHeatmap { max });
        }
        raw.mapv_inplace(|v| v / max);
        Ok(Self { values: raw })
    }

    /// Feature-map height.
    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Feature-map width.
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// Value at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.values.get((row, col)).copied()
    }

    /// Largest value (1.0).
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Borrow the values.
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }
}

/// Compute the Grad-CAM heatmap from an activation and its gradient.
///
/// # Arguments
///
/// * `activation` - Layer output of shape (1, channels, h, w)
/// * `gradient` - Gradient of the class score with respect to `activation`
///
/// # Errors
///
/// - [`ExplainError::ShapeMismatch`] when the shapes differ or the batch is not 1
/// - [`ExplainError::DegenerateHeatmap`] when no location has positive importance
pub fn synthesize_heatmap<B: Backend>(activation: Tensor<B, 4>, gradient: Tensor<B, 4>) -> Result<Heatmap> {
    let dims = activation.dims();
    if gradient.dims() != dims {
        return Err(ExplainError::ShapeMismatch(format!(
            "activation {:?} vs gradient {:?}",
            dims,
            gradient.dims()
        )));
    }
    let [batch, _, height, width] = dims;
    if batch != 1 {
        return Err(ExplainError::ShapeMismatch(format!(
            "expected a single image, got batch of {batch}"
        )));
    }

    // Global average pool the gradients: (1, C, h, w) -> (1, C, 1, 1)
    let weights = gradient.mean_dim(3).mean_dim(2);

    // Weighted sum across channels: (1, C, h, w) -> (1, 1, h, w)
    let cam = (activation * weights).sum_dim(1);

    let values: Vec<f32> = cam
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| ExplainError::Tensor(format!("{e:?}")))?;
    let raw = Array2::from_shape_vec((height, width), values)
        .map_err(|e| ExplainError::ShapeMismatch(e.to_string()))?;

    Heatmap::normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use ndarray::array;

    type TestBackend = NdArray;

    #[test]
    fn test_normalize_range_and_max() {
        let heatmap = Heatmap::normalize(array![[0.5, -2.0], [2.0, 1.0]]).unwrap();
        assert_eq!(heatmap.max(), 1.0);
        assert_eq!(heatmap.get(1, 0), Some(1.0));
        assert_eq!(heatmap.get(0, 1), Some(0.0));
        assert_eq!(heatmap.get(0, 0), Some(0.25));
        assert!(heatmap.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_all_negative_is_degenerate() {
        let err = Heatmap::normalize(array![[-1.0, -0.5], [-3.0, 0.0]]).unwrap_err();
        assert!(matches!(err, ExplainError::DegenerateHeatmap { max } if max == 0.0));
    }

    #[test]
    fn test_nan_is_degenerate() {
        let err = Heatmap::normalize(array![[f32::NAN, 1.0]]).unwrap_err();
        assert!(matches!(err, ExplainError::DegenerateHeatmap { .. }));
    }

    #[test]
    fn test_synthesize_weighted_sum() {
        let device = Default::default();
        // Channel 0 lights the left column, channel 1 the right column.
        let activation = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 0.0], [1.0, 0.0]], [[0.0, 1.0], [0.0, 1.0]]]],
            &device,
        );
        // Positive weight on channel 0, negative on channel 1.
        let gradient = Tensor::<TestBackend, 4>::from_floats(
            [[[[0.5, 0.5], [0.5, 0.5]], [[-1.0, -1.0], [-1.0, -1.0]]]],
            &device,
        );

        let heatmap = synthesize_heatmap(activation, gradient).unwrap();
        assert_eq!((heatmap.height(), heatmap.width()), (2, 2));
        assert_eq!(heatmap.values(), &array![[1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_synthesize_zero_gradient_is_degenerate() {
        let device = Default::default();
        let activation = Tensor::<TestBackend, 4>::ones([1, 4, 7, 7], &device);
        let gradient = Tensor::<TestBackend, 4>::zeros([1, 4, 7, 7], &device);
        let err = synthesize_heatmap(activation, gradient).unwrap_err();
        assert!(matches!(err, ExplainError::DegenerateHeatmap { .. }));
    }

    #[test]
    fn test_synthesize_shape_mismatch() {
        let device = Default::default();
        let activation = Tensor::<TestBackend, 4>::ones([1, 4, 7, 7], &device);
        let gradient = Tensor::<TestBackend, 4>::ones([1, 4, 14, 14], &device);
        let err = synthesize_heatmap(activation, gradient).unwrap_err();
        assert!(matches!(err, ExplainError::ShapeMismatch(_)));
    }
}
