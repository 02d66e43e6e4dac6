use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use crate::{
    device::cpu::{
        as_f32, as_f32_mut,
        relu::{f32_cpu::f32_cpu, i8_cpu::i8_cpu},
    },
    layer::layer_acc::{Context, LayerAcc, ensure_uninitialized, initialized, single_io},
    model::{layer_param::LayerParam, layer_resource::LayerResource, layer_type::LayerType},
    tensor::{Blob, DataType, MemoryPool},
    utils::error::{InferError, Result},
};

#[derive(Default)]
pub struct CpuReluLayerAcc {
    initialized: Option<()>,
}

impl Debug for CpuReluLayerAcc {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "CpuReLU(initialized={})", self.initialized.is_some())
    }
}

impl LayerAcc for CpuReluLayerAcc {
    fn init(
        &mut self,
        _ctx: &mut Context,
        param: Arc<LayerParam>,
        _resource: Option<Arc<LayerResource>>,
        inputs: &[Blob],
        outputs: &mut [Blob],
    ) -> Result<()> {
        ensure_uninitialized(LayerType::ReLU, &self.initialized)?;
        param.expect_relu()?;
        single_io(LayerType::ReLU, inputs, outputs)?;
        self.initialized = Some(());
        Ok(())
    }

    fn reshape(&mut self, inputs: &[Blob], outputs: &[Blob]) -> Result<()> {
        initialized(LayerType::ReLU, &self.initialized)?;
        single_io(LayerType::ReLU, inputs, outputs)?;
        Ok(())
    }

    fn forward(&mut self, inputs: &[Blob], outputs: &[Blob], memory: &mut MemoryPool) -> Result<()> {
        initialized(LayerType::ReLU, &self.initialized)?;
        let (input, output) = single_io(LayerType::ReLU, inputs, outputs)?;
        input.desc().expect_nchw()?;
        output.desc().expect_nchw()?;
        if input.desc().dims() != output.desc().dims()
            || input.desc().data_type() != output.desc().data_type()
        {
            return Err(InferError::Model(format!(
                "relu output {} does not match input {}",
                output.desc(),
                input.desc()
            )));
        }

        let (ins, mut outs) = memory.split_io(&[input.memory()?], &[output.memory()?])?;
        match input.desc().data_type() {
            DataType::Float => f32_cpu(as_f32(ins[0])?, as_f32_mut(&mut *outs[0])?),
            DataType::Int8 => i8_cpu(
                bytemuck::cast_slice(ins[0]),
                bytemuck::cast_slice_mut(&mut *outs[0]),
            ),
        }
        Ok(())
    }
}
