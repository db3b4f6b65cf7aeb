//! CNN classifier families for real/fake image detection.

mod auth_cnn;
mod effnet;
mod vgg;

pub use auth_cnn::{AuthCnn, AuthCnnConfig};
pub use effnet::{EffNet, EffNetConfig, MbConv, MbConvConfig};
pub use vgg::{Vgg16, Vgg16Config, VggBlock, VGG16_BLOCKS};

/// Name of the input placeholder in every family's layer list.
pub const INPUT_LAYER: &str = "input_1";
