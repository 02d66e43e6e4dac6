use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use tracing::debug;

use crate::{
    device::graph::{input_node, set_output_node},
    engine::graph::{GraphOp, NodeId},
    layer::layer_acc::{Context, LayerAcc, ensure_uninitialized, initialized},
    model::{
        layer_param::LayerParam,
        layer_resource::{LayerResource, check_conv_resource},
        layer_type::LayerType,
    },
    tensor::{Blob, MemoryPool},
    utils::error::{InferError, Result},
};

#[derive(Default)]
pub struct ConvLayerBuilder {
    node: Option<NodeId>,
}

impl Debug for ConvLayerBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "ConvBuilder(node={:?})", self.node)
    }
}

impl LayerAcc for ConvLayerBuilder {
    fn init(
        &mut self,
        ctx: &mut Context,
        param: Arc<LayerParam>,
        resource: Option<Arc<LayerResource>>,
        inputs: &[Blob],
        outputs: &mut [Blob],
    ) -> Result<()> {
        ensure_uninitialized(LayerType::Convolution, &self.node)?;
        let param = param.as_conv()?;
        let resource = resource.ok_or_else(|| {
            InferError::Model("convolution layer requires a weight resource".into())
        })?;
        let conv_res = resource.as_conv()?;
        check_conv_resource(param, conv_res)?;

        let input = input_node(LayerType::Convolution, inputs)?;
        let name = outputs.first().map(|b| b.name().to_string()).unwrap_or_default();
        let graph = ctx.graph_mut()?;

        let filter = graph.add_node(
            format!("{}/filter", name),
            GraphOp::Constant {
                dims: param.filter_dims(),
                data: conv_res.filter.to_f32()?,
            },
        )?;
        let bias = match &conv_res.bias {
            Some(b) => Some(graph.add_node(
                format!("{}/bias", name),
                GraphOp::Constant {
                    dims: vec![param.output_channel],
                    data: b.to_f32()?,
                },
            )?),
            None => None,
        };

        // pads are [top, bottom, left, right]
        let node = graph.add_node(
            name,
            GraphOp::Convolution {
                input,
                filter,
                bias,
                strides: param.strides.clone(),
                pads_begin: vec![param.pads[0], param.pads[2]],
                pads_end: vec![param.pads[1], param.pads[3]],
                dilations: param.dilations.clone(),
                group: param.group,
                auto_pad: param.pad_type,
            },
        )?;
        set_output_node(LayerType::Convolution, outputs, node)?;
        debug!("conv builder emitted {} (filter {}, bias {:?})", node, filter, bias);

        self.node = Some(node);
        Ok(())
    }

    fn reshape(&mut self, _inputs: &[Blob], _outputs: &[Blob]) -> Result<()> {
        initialized(LayerType::Convolution, &self.node)?;
        Ok(())
    }

    fn forward(&mut self, _inputs: &[Blob], _outputs: &[Blob], _memory: &mut MemoryPool) -> Result<()> {
        initialized(LayerType::Convolution, &self.node)?;
        Ok(())
    }
}
