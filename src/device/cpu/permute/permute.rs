use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use crate::{
    device::cpu::permute::naive_cpu::naive_permute,
    layer::layer_acc::{Context, LayerAcc, ensure_uninitialized, initialized, single_io},
    model::{
        layer_param::{LayerParam, PermuteLayerParam},
        layer_resource::LayerResource,
        layer_type::LayerType,
    },
    tensor::{Blob, MemoryPool},
    utils::error::{InferError, Result},
};

#[derive(Default)]
pub struct CpuPermuteLayerAcc {
    param: Option<PermuteLayerParam>,
}

impl Debug for CpuPermuteLayerAcc {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.param {
            Some(p) => write!(f, "CpuPermute(orders={:?})", p.orders),
            None => write!(f, "CpuPermute(uninitialized)"),
        }
    }
}

impl LayerAcc for CpuPermuteLayerAcc {
    fn init(
        &mut self,
        _ctx: &mut Context,
        param: Arc<LayerParam>,
        _resource: Option<Arc<LayerResource>>,
        inputs: &[Blob],
        outputs: &mut [Blob],
    ) -> Result<()> {
        ensure_uninitialized(LayerType::Permute, &self.param)?;
        let param = param.as_permute()?;
        single_io(LayerType::Permute, inputs, outputs)?;
        self.param = Some(param.clone());
        Ok(())
    }

    fn reshape(&mut self, inputs: &[Blob], outputs: &[Blob]) -> Result<()> {
        initialized(LayerType::Permute, &self.param)?;
        single_io(LayerType::Permute, inputs, outputs)?;
        Ok(())
    }

    fn forward(&mut self, inputs: &[Blob], outputs: &[Blob], memory: &mut MemoryPool) -> Result<()> {
        let param = initialized(LayerType::Permute, &self.param)?;
        let (input, output) = single_io(LayerType::Permute, inputs, outputs)?;
        input.desc().expect_nchw()?;
        output.desc().expect_nchw()?;

        let data_type = output.desc().data_type();
        if input.desc().data_type() != data_type {
            return Err(InferError::Model(format!(
                "permute input {} and output {} differ in data type",
                input.desc(),
                output.desc()
            )));
        }

        let (ins, mut outs) = memory.split_io(&[input.memory()?], &[output.memory()?])?;
        naive_permute(
            data_type.size_in_bytes(),
            ins[0],
            input.desc().dims(),
            &mut *outs[0],
            output.desc().dims(),
            &param.orders,
        )
    }
}
