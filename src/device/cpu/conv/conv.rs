use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use crate::{
    device::cpu::{as_f32, as_f32_mut, conv::f32_cpu::f32_cpu},
    layer::layer_acc::{
        Context, LayerAcc, ensure_uninitialized, initialized, initialized_mut, single_io,
    },
    model::{
        layer_param::{ConvLayerParam, LayerParam},
        layer_resource::{LayerResource, check_conv_resource},
        layer_type::LayerType,
    },
    tensor::{Blob, DataType, MemoryPool},
    utils::error::{InferError, Result},
};

struct ConvState {
    param: ConvLayerParam,
    filter: Vec<f32>,
    bias: Option<Vec<f32>>,
    // depend on the input spatial size, refreshed on reshape
    pads_begin: Vec<usize>,
}

#[derive(Default)]
pub struct CpuConvLayerAcc {
    state: Option<ConvState>,
}

impl Debug for CpuConvLayerAcc {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.state {
            Some(s) => write!(
                f,
                "CpuConv(in={}, out={}, kernels={:?}, strides={:?}, pads_begin={:?}, group={}, bias={})",
                s.param.input_channel,
                s.param.output_channel,
                s.param.kernels,
                s.param.strides,
                s.pads_begin,
                s.param.group,
                s.bias.is_some()
            ),
            None => write!(f, "CpuConv(uninitialized)"),
        }
    }
}

impl LayerAcc for CpuConvLayerAcc {
    fn init(
        &mut self,
        _ctx: &mut Context,
        param: Arc<LayerParam>,
        resource: Option<Arc<LayerResource>>,
        inputs: &[Blob],
        outputs: &mut [Blob],
    ) -> Result<()> {
        ensure_uninitialized(LayerType::Convolution, &self.state)?;
        let param = param.as_conv()?;
        let resource = resource.ok_or_else(|| {
            InferError::Model("convolution layer requires a weight resource".into())
        })?;
        let conv_res = resource.as_conv()?;
        check_conv_resource(param, conv_res)?;

        let (input, _) = single_io(LayerType::Convolution, inputs, outputs)?;
        input.desc().expect_nchw()?;
        if input.desc().data_type() != DataType::Float {
            return Err(InferError::Model(format!(
                "convolution on CPU supports only float input, got {}",
                input.desc()
            )));
        }

        let bias = match &conv_res.bias {
            Some(b) => Some(b.to_f32()?),
            None => None,
        };
        let (pads_begin, _) = param.pads_for(&input.desc().dims()[2..]);

        self.state = Some(ConvState {
            param: param.clone(),
            filter: conv_res.filter.to_f32()?,
            bias,
            pads_begin,
        });
        Ok(())
    }

    fn reshape(&mut self, inputs: &[Blob], outputs: &[Blob]) -> Result<()> {
        let (input, _) = single_io(LayerType::Convolution, inputs, outputs)?;
        input.desc().expect_nchw()?;
        let state = initialized_mut(LayerType::Convolution, &mut self.state)?;
        let (pads_begin, _) = state.param.pads_for(&input.desc().dims()[2..]);
        state.pads_begin = pads_begin;
        Ok(())
    }

    fn forward(&mut self, inputs: &[Blob], outputs: &[Blob], memory: &mut MemoryPool) -> Result<()> {
        let state = initialized(LayerType::Convolution, &self.state)?;
        let (input, output) = single_io(LayerType::Convolution, inputs, outputs)?;
        input.desc().expect_nchw()?;
        output.desc().expect_nchw()?;

        let (ins, mut outs) = memory.split_io(&[input.memory()?], &[output.memory()?])?;
        f32_cpu(
            input.desc().dims(),
            &state.param.filter_dims(),
            output.desc().dims(),
            as_f32(ins[0])?,
            &state.filter,
            state.bias.as_deref(),
            as_f32_mut(&mut *outs[0])?,
            &state.param.strides,
            &state.pads_begin,
            &state.param.dilations,
            state.param.group,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorDesc;

    #[test]
    fn reshape_before_init_is_a_state_error() {
        let input = Blob::new(TensorDesc::new("x", vec![1, 2, 4, 4], DataType::Float));
        let output = Blob::new(TensorDesc::new("y", vec![1, 2, 4, 4], DataType::Float));
        let mut acc = CpuConvLayerAcc::default();
        assert!(matches!(
            acc.reshape(&[input], &[output]),
            Err(InferError::State(_))
        ));
    }
}
