//! Decoding and preprocessing of uploaded images.
//!
//! Uploads arrive as encoded bytes of arbitrary resolution. They are decoded
//! to 8-bit RGB, the full-resolution copy is kept for compositing, and a
//! resized, normalized `(1, 3, H, W)` tensor is produced for the classifier.

use std::io::Cursor;

use authnet_core::{CoreError, ImageShape, PreprocessConfig, Result};
use burn::prelude::*;
use image::imageops::FilterType;
use image::{ImageReader, Limits, RgbImage};

/// Largest accepted upload width or height, in pixels.
pub const MAX_IMAGE_SIDE: u32 = 16_384;

/// Decode an uploaded image (any supported format) to 8-bit RGB.
///
/// Alpha channels are dropped and grayscale images are expanded to three
/// identical channels. Images wider or taller than [`MAX_IMAGE_SIDE`] are
/// refused before their pixels are allocated.
///
/// # Errors
///
/// Returns [`CoreError::TransformError`] when the bytes are not a decodable
/// image, the image exceeds the size limits, or it has no pixels.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_SIDE);
    limits.max_image_height = Some(MAX_IMAGE_SIDE);

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CoreError::TransformError(format!("cannot read image: {e}")))?;
    reader.limits(limits);
    let decoded = reader
        .decode()
        .map_err(|e| CoreError::TransformError(format!("cannot decode image: {e}")))?;
    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(CoreError::TransformError("image has no pixels".to_string()));
    }
    tracing::debug!(width = rgb.width(), height = rgb.height(), "decoded upload");
    Ok(rgb)
}

/// Turns RGB images into classifier input tensors.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    /// Create a preprocessor from config.
    #[must_use]
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Bilinear resize to the spatial size of `shape`.
    ///
    /// Returns a copy when the image already has that size.
    #[must_use]
    pub fn resize(&self, image: &RgbImage, shape: ImageShape) -> RgbImage {
        let (width, height) = (shape.width() as u32, shape.height() as u32);
        if image.dimensions() == (width, height) {
            return image.clone();
        }
        image::imageops::resize(image, width, height, FilterType::Triangle)
    }

    /// Convert an RGB image to a `(1, 3, H, W)` float tensor.
    ///
    /// Pixel values are divided by the normalization factor when
    /// normalization is enabled, and kept in `[0, 255]` otherwise.
    pub fn to_tensor<B: Backend>(&self, image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let plane = width * height;
        let scale = if self.config.normalize {
            1.0 / self.config.normalization_factor
        } else {
            1.0
        };

        let mut data = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for (channel, value) in pixel.0.iter().enumerate() {
                data[channel * plane + offset] = f32::from(*value) * scale;
            }
        }

        Tensor::from_data(TensorData::new(data, [1, 3, height, width]), device)
    }

    /// Resize to `shape` and convert to a tensor.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShape`] for empty or non-RGB target shapes.
    pub fn prepare_for<B: Backend>(
        &self,
        image: &RgbImage,
        shape: ImageShape,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>> {
        if shape.is_empty() || shape.channels() != 3 {
            return Err(CoreError::InvalidShape {
                expected: "non-empty RGB shape".to_string(),
                got: shape.to_string(),
            });
        }
        let resized = self.resize(image, shape);
        Ok(self.to_tensor(&resized, device))
    }
}
