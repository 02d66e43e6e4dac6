use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::utils::error::{InferError, Result};

/// The only rank every layer in this engine accepts: batch, channel, height, width.
pub const NCHW_RANK: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Float,
    Int8,
}

impl DataType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            DataType::Float => std::mem::size_of::<f32>(),
            DataType::Int8 => std::mem::size_of::<i8>(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataFormat {
    #[default]
    Nchw,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDesc {
    name: String,
    dims: Vec<usize>,
    data_format: DataFormat,
    data_type: DataType,
}

impl TensorDesc {
    pub fn new(name: impl Into<String>, dims: Vec<usize>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            dims,
            data_format: DataFormat::Nchw,
            data_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }

    pub fn num_elements(&self) -> usize {
        count(&self.dims, 0)
    }

    // Size in bytes for the tensor given its DataType
    pub fn size_in_bytes(&self) -> usize {
        self.num_elements() * self.data_type.size_in_bytes()
    }

    // Calculate strides for row-major memory layout
    pub fn strides(&self) -> Vec<usize> {
        Self::compute_strides(&self.dims)
    }

    pub(crate) fn set_dims(&mut self, dims: Vec<usize>) {
        self.dims = dims;
    }

    /// Fails with a model error unless the descriptor is a rank-4 NCHW tensor.
    pub fn expect_nchw(&self) -> Result<()> {
        if self.data_format != DataFormat::Nchw {
            return Err(InferError::Model(format!(
                "blob '{}' has layout {:?}, only NCHW is supported",
                self.name, self.data_format
            )));
        }
        if self.dims.len() != NCHW_RANK {
            return Err(InferError::Model(format!(
                "blob '{}' has rank {} ({:?}), only [n, c, h, w] is supported",
                self.name,
                self.dims.len(),
                self.dims
            )));
        }
        Ok(())
    }

    pub fn compute_strides(dims: &[usize]) -> Vec<usize> {
        (0..dims.len()).map(|i| count(dims, i + 1)).collect()
    }

    pub fn unravel(idx: usize, dims: &[usize]) -> Vec<usize> {
        let mut rem = idx;
        let strides = Self::compute_strides(dims);
        strides
            .iter()
            .map(|&s| {
                let c = rem / s;
                rem %= s;
                c
            })
            .collect()
    }

    pub fn offset(idxs: &[usize], strides: &[usize]) -> usize {
        idxs.iter().zip(strides.iter()).map(|(i, s)| i * s).sum()
    }
}

impl Display for TensorDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}{:?}:{:?}:{:?}",
            self.name, self.dims, self.data_type, self.data_format
        )
    }
}

/// Product of `dims[start_axis..]`; 1 for an empty range.
pub fn count(dims: &[usize], start_axis: usize) -> usize {
    dims.iter().skip(start_axis).product()
}
