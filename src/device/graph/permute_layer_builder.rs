use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use tracing::debug;

use crate::{
    device::graph::{input_node, set_output_node},
    engine::graph::{GraphOp, NodeId},
    layer::layer_acc::{Context, LayerAcc, ensure_uninitialized, initialized},
    model::{layer_param::LayerParam, layer_resource::LayerResource, layer_type::LayerType},
    tensor::{Blob, MemoryPool},
    utils::error::Result,
};

#[derive(Default)]
pub struct PermuteLayerBuilder {
    node: Option<NodeId>,
}

impl Debug for PermuteLayerBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "PermuteBuilder(node={:?})", self.node)
    }
}

impl LayerAcc for PermuteLayerBuilder {
    fn init(
        &mut self,
        ctx: &mut Context,
        param: Arc<LayerParam>,
        _resource: Option<Arc<LayerResource>>,
        inputs: &[Blob],
        outputs: &mut [Blob],
    ) -> Result<()> {
        ensure_uninitialized(LayerType::Permute, &self.node)?;
        let param = param.as_permute()?;
        let input = input_node(LayerType::Permute, inputs)?;
        let name = outputs.first().map(|b| b.name().to_string()).unwrap_or_default();

        let node = ctx.graph_mut()?.add_node(
            name,
            GraphOp::Transpose {
                input,
                order: param.orders.clone(),
            },
        )?;
        set_output_node(LayerType::Permute, outputs, node)?;
        debug!("permute builder emitted {} from {}", node, input);

        self.node = Some(node);
        Ok(())
    }

    fn reshape(&mut self, _inputs: &[Blob], _outputs: &[Blob]) -> Result<()> {
        initialized(LayerType::Permute, &self.node)?;
        Ok(())
    }

    // data only moves through the compiled graph
    fn forward(&mut self, _inputs: &[Blob], _outputs: &[Blob], _memory: &mut MemoryPool) -> Result<()> {
        initialized(LayerType::Permute, &self.node)?;
        Ok(())
    }
}
