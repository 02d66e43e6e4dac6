use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use crate::{
    device::graph::{input_node, set_output_node},
    engine::graph::{GraphOp, NodeId},
    layer::layer_acc::{Context, LayerAcc, ensure_uninitialized, initialized},
    model::{layer_param::LayerParam, layer_resource::LayerResource, layer_type::LayerType},
    tensor::{Blob, MemoryPool},
    utils::error::Result,
};

#[derive(Default)]
pub struct ReluLayerBuilder {
    node: Option<NodeId>,
}

impl Debug for ReluLayerBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "ReLUBuilder(node={:?})", self.node)
    }
}

impl LayerAcc for ReluLayerBuilder {
    fn init(
        &mut self,
        ctx: &mut Context,
        param: Arc<LayerParam>,
        _resource: Option<Arc<LayerResource>>,
        inputs: &[Blob],
        outputs: &mut [Blob],
    ) -> Result<()> {
        ensure_uninitialized(LayerType::ReLU, &self.node)?;
        param.expect_relu()?;
        let input = input_node(LayerType::ReLU, inputs)?;
        let name = outputs.first().map(|b| b.name().to_string()).unwrap_or_default();

        let node = ctx.graph_mut()?.add_node(name, GraphOp::Relu { input })?;
        set_output_node(LayerType::ReLU, outputs, node)?;

        self.node = Some(node);
        Ok(())
    }

    fn reshape(&mut self, _inputs: &[Blob], _outputs: &[Blob]) -> Result<()> {
        initialized(LayerType::ReLU, &self.node)?;
        Ok(())
    }

    fn forward(&mut self, _inputs: &[Blob], _outputs: &[Blob], _memory: &mut MemoryPool) -> Result<()> {
        initialized(LayerType::ReLU, &self.node)?;
        Ok(())
    }
}
