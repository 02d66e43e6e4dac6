//! Immediate-dispatch CPU layers: each forward reads and writes pool memory.

use bytemuck::{try_cast_slice, try_cast_slice_mut};

use crate::{
    layer::registry::{LayerAccFactory, create_acc},
    model::layer_type::LayerType,
    utils::error::{InferError, Result},
};

pub mod conv;
pub mod permute;
pub mod relu;

use conv::conv::CpuConvLayerAcc;
use permute::permute::CpuPermuteLayerAcc;
use relu::relu::CpuReluLayerAcc;

pub fn layer_accs() -> Vec<(LayerType, LayerAccFactory)> {
    vec![
        (
            LayerType::Permute,
            create_acc::<CpuPermuteLayerAcc> as LayerAccFactory,
        ),
        (
            LayerType::Convolution,
            create_acc::<CpuConvLayerAcc> as LayerAccFactory,
        ),
        (LayerType::ReLU, create_acc::<CpuReluLayerAcc> as LayerAccFactory),
    ]
}

pub(crate) fn as_f32(bytes: &[u8]) -> Result<&[f32]> {
    try_cast_slice(bytes).map_err(|e| InferError::Memory(format!("bytes not f32: {:?}", e)))
}

pub(crate) fn as_f32_mut(bytes: &mut [u8]) -> Result<&mut [f32]> {
    try_cast_slice_mut(bytes).map_err(|e| InferError::Memory(format!("bytes not f32: {:?}", e)))
}
