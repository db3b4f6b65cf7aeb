//! Overlay compositing and encoding.
//!
//! The heatmap is resized bilinearly to the original image, mapped through a
//! jet palette and blended over the original pixels as a weighted average:
//! `out = round(original * (1 - intensity) + heat * intensity)`.

use std::io::Cursor;

use authnet_core::ExplainConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::Array2;

use crate::error::{ExplainError, Result};
use crate::heatmap::Heatmap;

/// Bilinear resize of a value grid to `width` x `height`.
pub fn resize_values(values: &Array2<f32>, width: u32, height: u32) -> Result<Array2<f32>> {
    let (rows, cols) = values.dim();
    let source: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(cols as u32, rows as u32, values.iter().copied().collect())
            .ok_or_else(|| ExplainError::ShapeMismatch(format!("cannot view {rows}x{cols} map")))?;

    let resized = image::imageops::resize(&source, width, height, FilterType::Triangle);
    Array2::from_shape_vec((height as usize, width as usize), resized.into_raw())
        .map_err(|e| ExplainError::ShapeMismatch(e.to_string()))
}

/// Resize a heatmap to `width` x `height` pixels.
///
/// Values stay in `[0, 1]`.
pub fn resize_heatmap(heatmap: &Heatmap, width: u32, height: u32) -> Result<Array2<f32>> {
    let mut resized = resize_values(heatmap.values(), width, height)?;
    resized.mapv_inplace(|v| v.clamp(0.0, 1.0));
    Ok(resized)
}

/// Jet palette: dark blue at 0 through cyan, yellow to dark red at 255.
pub fn jet(value: u8) -> Rgb<u8> {
    let x = f32::from(value) / 255.0;
    let channel = |center: f32| {
        let v = (1.5 - (4.0 * x - center).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Scale a `[0, 1]` value to 8 bits.
fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

/// Map a value grid through the jet palette.
pub fn colorize_values(values: &Array2<f32>) -> RgbImage {
    let (rows, cols) = values.dim();
    RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        jet(to_u8(values[[y as usize, x as usize]]))
    })
}

/// Weighted-average blend of `heat` over `original`.
///
/// # Errors
///
/// - [`ExplainError::InvalidIntensity`] outside `[0, 1]`
/// - [`ExplainError::ShapeMismatch`] when the images differ in size
pub fn blend(original: &RgbImage, heat: &RgbImage, intensity: f32) -> Result<RgbImage> {
    if !(0.0..=1.0).contains(&intensity) {
        return Err(ExplainError::InvalidIntensity(intensity));
    }
    if original.dimensions() != heat.dimensions() {
        return Err(ExplainError::ShapeMismatch(format!(
            "original {:?} vs heatmap {:?}",
            original.dimensions(),
            heat.dimensions()
        )));
    }

    let keep = 1.0 - intensity;
    let mut out = original.clone();
    for (dst, src) in out.pixels_mut().zip(heat.pixels()) {
        for (d, s) in dst.0.iter_mut().zip(src.0) {
            let mixed = f32::from(*d) * keep + f32::from(s) * intensity;
            *d = mixed.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Encode as JPEG and then as standard base64.
pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> Result<String> {
    if !(1..=100).contains(&quality) {
        return Err(ExplainError::Encode(format!(
            "JPEG quality must be in [1, 100], got {quality}"
        )));
    }
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut Cursor::new(&mut bytes), quality)
        .encode_image(image)
        .map_err(|e| ExplainError::Encode(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

/// Render `heatmap` over `original` at the original resolution.
pub fn composite(original: &RgbImage, heatmap: &Heatmap, config: &ExplainConfig) -> Result<RgbImage> {
    if !(0.0..=1.0).contains(&config.intensity) {
        return Err(ExplainError::InvalidIntensity(config.intensity));
    }
    let (width, height) = original.dimensions();
    let resized = resize_heatmap(heatmap, width, height)?;
    blend(original, &colorize_values(&resized), config.intensity)
}
