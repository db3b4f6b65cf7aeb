//! # authnet_transforms
//!
//! Image transforms for authnet.
//!
//! This crate provides:
//! - [`decode_rgb`] to turn uploaded bytes into an 8-bit RGB image
//! - [`Preprocessor`] to resize and normalize images into `(1, 3, H, W)`
//!   classifier inputs

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod preprocess;

pub use preprocess::{decode_rgb, Preprocessor, MAX_IMAGE_SIDE};
