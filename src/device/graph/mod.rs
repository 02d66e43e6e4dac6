//! Layer builders for the deferred-graph device.
//!
//! A builder never touches tensor data. At init it resolves the graph node
//! behind its input blob, appends one node to the context's graph and points
//! its output blob at that node. The whole graph is compiled and run by the
//! network afterwards.

use crate::{
    engine::graph::NodeId,
    layer::registry::{LayerAccFactory, create_acc},
    model::layer_type::LayerType,
    tensor::Blob,
    utils::error::{InferError, Result},
};

pub mod conv_layer_builder;
pub mod permute_layer_builder;
pub mod relu_layer_builder;

use conv_layer_builder::ConvLayerBuilder;
use permute_layer_builder::PermuteLayerBuilder;
use relu_layer_builder::ReluLayerBuilder;

pub fn layer_builders() -> Vec<(LayerType, LayerAccFactory)> {
    vec![
        (
            LayerType::Permute,
            create_acc::<PermuteLayerBuilder> as LayerAccFactory,
        ),
        (
            LayerType::Convolution,
            create_acc::<ConvLayerBuilder> as LayerAccFactory,
        ),
        (LayerType::ReLU, create_acc::<ReluLayerBuilder> as LayerAccFactory),
    ]
}

/// Node behind the layer's only input.
pub(crate) fn input_node(layer: LayerType, inputs: &[Blob]) -> Result<NodeId> {
    match inputs {
        [input] => input.foreign_node(),
        _ => Err(InferError::Model(format!(
            "{} builder takes 1 input, got {}",
            layer,
            inputs.len()
        ))),
    }
}

/// Point the layer's only output at `node`.
pub(crate) fn set_output_node(layer: LayerType, outputs: &mut [Blob], node: NodeId) -> Result<()> {
    match outputs {
        [output] => {
            let name = output.name().to_string();
            let tensor = output.foreign_mut().ok_or_else(|| {
                InferError::Model(format!(
                    "{} builder output '{}' is not wrapped in a foreign tensor",
                    layer, name
                ))
            })?;
            tensor.set_node(node);
            Ok(())
        }
        _ => Err(InferError::Model(format!(
            "{} builder takes 1 output, got {}",
            layer,
            outputs.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{DataType, TensorDesc};

    fn blob(name: &str) -> Blob {
        Blob::new(TensorDesc::new(name, vec![1, 1, 2, 2], DataType::Float))
    }

    fn resolved(name: &str, node: usize) -> Blob {
        let mut blob = blob(name).into_foreign();
        if let Some(tensor) = blob.foreign_mut() {
            tensor.set_node(NodeId::new(node));
        }
        blob
    }

    #[test]
    fn input_node_needs_a_resolved_foreign_blob() {
        let layer = LayerType::ReLU;
        assert!(matches!(input_node(layer, &[blob("x")]), Err(InferError::Model(_))));
        assert!(matches!(
            input_node(layer, &[blob("x").into_foreign()]),
            Err(InferError::Model(_))
        ));
        assert_eq!(input_node(layer, &[resolved("x", 3)]).unwrap(), NodeId::new(3));
    }

    #[test]
    fn input_node_rejects_wrong_arity() {
        let layer = LayerType::Permute;
        assert!(matches!(input_node(layer, &[]), Err(InferError::Model(_))));
        assert!(matches!(
            input_node(layer, &[resolved("a", 0), resolved("b", 1)]),
            Err(InferError::Model(_))
        ));
    }

    #[test]
    fn set_output_node_needs_a_foreign_blob() {
        let layer = LayerType::Convolution;
        let mut plain = [blob("y")];
        assert!(matches!(
            set_output_node(layer, &mut plain, NodeId::new(1)),
            Err(InferError::Model(_))
        ));

        let mut wrapped = [blob("y").into_foreign()];
        set_output_node(layer, &mut wrapped, NodeId::new(7)).unwrap();
        assert_eq!(wrapped[0].foreign_node().unwrap(), NodeId::new(7));

        let mut none: [Blob; 0] = [];
        assert!(matches!(
            set_output_node(layer, &mut none, NodeId::new(1)),
            Err(InferError::Model(_))
        ));
    }
}
