//! Layer descriptors and model family tags.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Coarse type tag of a classifier layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Input placeholder.
    Input,
    /// Dense 2-D convolution.
    Conv2d,
    /// Depthwise (grouped) 2-D convolution.
    DepthwiseConv2d,
    /// Batch normalization.
    BatchNorm,
    /// Element-wise activation.
    Activation,
    /// Spatial pooling with a fixed window.
    Pooling,
    /// Global pooling collapsing the spatial axes.
    GlobalPooling,
    /// Flatten to a feature vector.
    Flatten,
    /// Fully connected layer.
    Dense,
    /// Dropout (identity at inference).
    Dropout,
    /// Element-wise merge such as a residual add.
    Merge,
}

impl LayerKind {
    /// Whether this layer is a 2-D convolution, including depthwise variants.
    #[must_use]
    pub const fn is_convolution(&self) -> bool {
        matches!(self, Self::Conv2d | Self::DepthwiseConv2d)
    }

    /// Whether the layer output keeps a spatial `(C, H, W)` layout.
    #[must_use]
    pub const fn is_spatial(&self) -> bool {
        !matches!(
            self,
            Self::GlobalPooling | Self::Flatten | Self::Dense | Self::Dropout
        )
    }
}

/// One entry of a classifier's ordered layer list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerInfo {
    /// Layer name, unique within a classifier.
    pub name: String,
    /// Layer type tag.
    pub kind: LayerKind,
}

impl LayerInfo {
    /// Create a new layer descriptor.
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl std::fmt::Display for LayerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?})", self.name, self.kind)
    }
}

/// Architecture family of a classifier.
///
/// The tag travels with every classifier and drives target-layer selection
/// for explanations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Plain convolutional stack.
    Cnn,
    /// VGG16-style network.
    #[serde(alias = "vgg16")]
    Vgg,
    /// EfficientNet-style network.
    #[serde(alias = "efficientnet")]
    EffNet,
    /// Any other classifier.
    Generic,
}

impl ModelFamily {
    /// All families, in display order.
    pub const ALL: [ModelFamily; 4] = [Self::Cnn, Self::Vgg, Self::EffNet, Self::Generic];

    /// Canonical lowercase tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cnn => "cnn",
            Self::Vgg => "vgg",
            Self::EffNet => "effnet",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cnn" => Ok(Self::Cnn),
            "vgg" | "vgg16" => Ok(Self::Vgg),
            "effnet" | "efficientnet" => Ok(Self::EffNet),
            "generic" => Ok(Self::Generic),
            _ => Err(CoreError::UnknownFamily(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convolution_kinds() {
        assert!(LayerKind::Conv2d.is_convolution());
        assert!(LayerKind::DepthwiseConv2d.is_convolution());
        assert!(!LayerKind::Dense.is_convolution());
        assert!(!LayerKind::Pooling.is_convolution());
    }

    #[test]
    fn test_spatial_kinds() {
        assert!(LayerKind::Conv2d.is_spatial());
        assert!(LayerKind::Pooling.is_spatial());
        assert!(!LayerKind::GlobalPooling.is_spatial());
        assert!(!LayerKind::Dense.is_spatial());
    }

    #[test]
    fn test_family_parse() {
        assert_eq!("cnn".parse::<ModelFamily>().unwrap(), ModelFamily::Cnn);
        assert_eq!("VGG16".parse::<ModelFamily>().unwrap(), ModelFamily::Vgg);
        assert_eq!("vgg".parse::<ModelFamily>().unwrap(), ModelFamily::Vgg);
        assert_eq!(
            "EfficientNet".parse::<ModelFamily>().unwrap(),
            ModelFamily::EffNet
        );
        assert!("resnet".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_every_family_tag_parses_back() {
        for family in ModelFamily::ALL {
            assert_eq!(family.as_str().parse::<ModelFamily>().unwrap(), family);
        }
    }

    #[test]
    fn test_family_serde_aliases() {
        let family: ModelFamily = serde_json::from_str("\"vgg16\"").unwrap();
        assert_eq!(family, ModelFamily::Vgg);
        assert_eq!(serde_json::to_string(&ModelFamily::EffNet).unwrap(), "\"effnet\"");
    }

    #[test]
    fn test_layer_info_display() {
        let layer = LayerInfo::new("top_conv", LayerKind::Conv2d);
        assert_eq!(layer.to_string(), "top_conv (Conv2d)");
    }
}
