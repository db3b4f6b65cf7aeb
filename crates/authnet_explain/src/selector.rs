//! Target-layer selection.

use authnet_core::{LayerInfo, ModelFamily};

use crate::error::{ExplainError, Result};

/// Layer name preferred over positional selection when present.
pub const PREFERRED_TARGET_LAYER: &str = "top_conv";

/// Pick the convolution layer to probe.
///
/// Prefers a layer named exactly [`PREFERRED_TARGET_LAYER`]; otherwise takes
/// the last convolution-type layer in forward order.
///
/// # Errors
///
/// Returns [`ExplainError::NoConvolutionalLayer`] when `layers` contains no
/// convolution.
pub fn select_target_layer(layers: &[LayerInfo], family: ModelFamily) -> Result<LayerInfo> {
    let mut convs = layers.iter().filter(|layer| layer.kind.is_convolution());

    let selected = match convs.clone().find(|layer| layer.name == PREFERRED_TARGET_LAYER) {
        Some(layer) => layer,
        None => convs
            .next_back()
            .ok_or(ExplainError::NoConvolutionalLayer { family })?,
    };

    tracing::debug!(family = %family, layer = %selected.name, "Selected target layer");
    Ok(selected.clone())
}

/// Look up a layer by name.
///
/// # Errors
///
/// Returns [`ExplainError::LayerLookupFailed`] when no layer has that name.
pub fn resolve_layer(layers: &[LayerInfo], name: &str) -> Result<LayerInfo> {
    layers
        .iter()
        .find(|layer| layer.name == name)
        .cloned()
        .ok_or_else(|| ExplainError::LayerLookupFailed {
            layer: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use authnet_core::LayerKind;

    fn layer(name: &str, kind: LayerKind) -> LayerInfo {
        LayerInfo::new(name, kind)
    }

    #[test]
    fn test_two_stacked_convs_picks_second() {
        let layers = vec![
            layer("input_1", LayerKind::Input),
            layer("conv2d", LayerKind::Conv2d),
            layer("conv2d_1", LayerKind::Conv2d),
            layer("global_average_pooling2d", LayerKind::GlobalPooling),
            layer("dense", LayerKind::Dense),
        ];
        let selected = select_target_layer(&layers, ModelFamily::Cnn).unwrap();
        assert_eq!(selected.name, "conv2d_1");
    }

    #[test]
    fn test_prefers_top_conv_over_later_convs() {
        let layers = vec![
            layer("stem_conv", LayerKind::Conv2d),
            layer("top_conv", LayerKind::Conv2d),
            layer("refine_conv", LayerKind::Conv2d),
        ];
        let selected = select_target_layer(&layers, ModelFamily::Generic).unwrap();
        assert_eq!(selected.name, "top_conv");
    }

    #[test]
    fn test_depthwise_counts_as_convolution() {
        let layers = vec![
            layer("conv", LayerKind::Conv2d),
            layer("dw", LayerKind::DepthwiseConv2d),
            layer("bn", LayerKind::BatchNorm),
        ];
        assert_eq!(select_target_layer(&layers, ModelFamily::EffNet).unwrap().name, "dw");
    }

    #[test]
    fn test_no_convolution() {
        let layers = vec![layer("dense", LayerKind::Dense), layer("pool", LayerKind::Pooling)];
        let err = select_target_layer(&layers, ModelFamily::Generic).unwrap_err();
        assert!(matches!(err, ExplainError::NoConvolutionalLayer { .. }));
        assert!(select_target_layer(&[], ModelFamily::Cnn).is_err());
    }

    #[test]
    fn test_resolve_layer() {
        let layers = vec![layer("conv2d", LayerKind::Conv2d)];
        assert_eq!(resolve_layer(&layers, "conv2d").unwrap().kind, LayerKind::Conv2d);
        assert!(matches!(
            resolve_layer(&layers, "top_conv"),
            Err(ExplainError::LayerLookupFailed { layer }) if layer == "top_conv"
        ));
    }
}
