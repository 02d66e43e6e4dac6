use crate::{
    model::{layer_param::ConvLayerParam, layer_type::LayerType},
    tensor::DataType,
    utils::error::{InferError, Result},
};

/// Typed weight buffer with a declared element kind.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBuffer {
    data_type: DataType,
    dims: Vec<usize>,
    bytes: Vec<u8>,
}

impl RawBuffer {
    pub fn new(data_type: DataType, dims: Vec<usize>, bytes: Vec<u8>) -> Self {
        Self {
            data_type,
            dims,
            bytes,
        }
    }

    pub fn from_f32(dims: Vec<usize>, values: &[f32]) -> Self {
        Self {
            data_type: DataType::Float,
            dims,
            bytes: bytemuck::cast_slice(values).to_vec(),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn element_count(&self) -> usize {
        self.bytes.len() / self.data_type.size_in_bytes()
    }

    /// Copy out as f32; the bytes need not be aligned.
    pub fn to_f32(&self) -> Result<Vec<f32>> {
        if self.data_type != DataType::Float {
            return Err(InferError::Model(format!(
                "expected a float buffer, got {:?}",
                self.data_type
            )));
        }
        if !self.bytes.len().is_multiple_of(4) {
            return Err(InferError::Model(format!(
                "float buffer of {} bytes is not a whole number of elements",
                self.bytes.len()
            )));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.bytes))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConvLayerResource {
    pub filter: RawBuffer,
    pub bias: Option<RawBuffer>,
}

/// Trained weights, keyed by layer type.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerResource {
    Convolution(ConvLayerResource),
}

impl LayerResource {
    pub fn layer_type(&self) -> LayerType {
        match self {
            LayerResource::Convolution(_) => LayerType::Convolution,
        }
    }

    pub fn as_conv(&self) -> Result<&ConvLayerResource> {
        match self {
            LayerResource::Convolution(r) => Ok(r),
        }
    }
}

/// Reject a resource whose sizes disagree with the param it is paired with.
pub fn check_conv_resource(param: &ConvLayerParam, resource: &ConvLayerResource) -> Result<()> {
    if resource.filter.data_type() != DataType::Float {
        return Err(InferError::Model(format!(
            "convolution filter must be float, got {:?}",
            resource.filter.data_type()
        )));
    }
    let expected = param.filter_count();
    if resource.filter.element_count() != expected {
        return Err(InferError::Model(format!(
            "convolution filter has {} elements, param {:?} requires {}",
            resource.filter.element_count(),
            param.filter_dims(),
            expected
        )));
    }

    match (&resource.bias, param.bias) {
        (Some(bias), _) if bias.element_count() != param.output_channel => {
            Err(InferError::Model(format!(
                "convolution bias has {} elements, expected {}",
                bias.element_count(),
                param.output_channel
            )))
        }
        (None, true) => Err(InferError::Model(
            "convolution param declares a bias but the resource has none".into(),
        )),
        _ => Ok(()),
    }
}
