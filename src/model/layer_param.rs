use crate::{
    model::layer_type::LayerType,
    tensor::NCHW_RANK,
    utils::{
        auto_pads_calc::calc_begin_and_end_pads,
        error::{InferError, Result},
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermuteLayerParam {
    /// Output axis `i` reads input axis `orders[i]`.
    pub orders: Vec<usize>,
}

impl PermuteLayerParam {
    pub fn new(orders: Vec<usize>) -> Self {
        Self { orders }
    }

    /// The order that undoes this permutation.
    pub fn inverse(&self) -> Self {
        let mut inv = vec![0; self.orders.len()];
        for (i, &o) in self.orders.iter().enumerate() {
            if let Some(slot) = inv.get_mut(o) {
                *slot = i;
            }
        }
        Self { orders: inv }
    }

    fn validate(&self) -> Result<()> {
        if self.orders.len() != NCHW_RANK {
            return Err(InferError::Model(format!(
                "permute order {:?} must have {} axes",
                self.orders, NCHW_RANK
            )));
        }
        let mut seen = [false; NCHW_RANK];
        for &o in &self.orders {
            if o >= NCHW_RANK || seen[o] {
                return Err(InferError::Model(format!(
                    "permute order {:?} is not a permutation of 0..{}",
                    self.orders, NCHW_RANK
                )));
            }
            seen[o] = true;
        }
        Ok(())
    }
}

/// How convolution padding is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PadType {
    #[default]
    Explicit,
    SameUpper,
    SameLower,
    Valid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvLayerParam {
    pub input_channel: usize,
    pub output_channel: usize,
    pub group: usize,
    /// `[kh, kw]`
    pub kernels: Vec<usize>,
    /// `[sh, sw]`
    pub strides: Vec<usize>,
    /// `[top, bottom, left, right]`
    pub pads: Vec<usize>,
    /// `[dh, dw]`
    pub dilations: Vec<usize>,
    pub pad_type: PadType,
    pub bias: bool,
}

impl ConvLayerParam {
    pub fn new(input_channel: usize, output_channel: usize, kernels: [usize; 2]) -> Self {
        Self {
            input_channel,
            output_channel,
            group: 1,
            kernels: kernels.to_vec(),
            strides: vec![1, 1],
            pads: vec![0, 0, 0, 0],
            dilations: vec![1, 1],
            pad_type: PadType::Explicit,
            bias: false,
        }
    }

    pub fn with_strides(mut self, strides: [usize; 2]) -> Self {
        self.strides = strides.to_vec();
        self
    }

    pub fn with_pads(mut self, pads: [usize; 4]) -> Self {
        self.pads = pads.to_vec();
        self
    }

    pub fn with_dilations(mut self, dilations: [usize; 2]) -> Self {
        self.dilations = dilations.to_vec();
        self
    }

    pub fn with_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    pub fn with_pad_type(mut self, pad_type: PadType) -> Self {
        self.pad_type = pad_type;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Filter dims `[out, in / group, kh, kw]`.
    pub fn filter_dims(&self) -> Vec<usize> {
        vec![
            self.output_channel,
            self.input_channel / self.group.max(1),
            self.kernels[0],
            self.kernels[1],
        ]
    }

    pub fn filter_count(&self) -> usize {
        self.filter_dims().iter().product()
    }

    /// Begin and end pads for an input of spatial size `[h, w]`.
    pub fn pads_for(&self, spatial_dims: &[usize]) -> (Vec<usize>, Vec<usize>) {
        calc_begin_and_end_pads(
            self.pad_type,
            &self.pads,
            &self.kernels,
            &self.strides,
            &self.dilations,
            spatial_dims,
        )
    }

    fn validate(&self) -> Result<()> {
        let bad = |what: &str| {
            Err(InferError::Model(format!(
                "convolution param has invalid {}: {:?}",
                what, self
            )))
        };

        if self.input_channel == 0 || self.output_channel == 0 {
            return bad("channels");
        }
        if self.group == 0
            || !self.input_channel.is_multiple_of(self.group)
            || !self.output_channel.is_multiple_of(self.group)
        {
            return bad("group");
        }
        if self.kernels.len() != 2 || self.kernels.contains(&0) {
            return bad("kernels");
        }
        if self.strides.len() != 2 || self.strides.contains(&0) {
            return bad("strides");
        }
        if self.dilations.len() != 2 || self.dilations.contains(&0) {
            return bad("dilations");
        }
        if self.pads.len() != 4 {
            return bad("pads");
        }
        Ok(())
    }

    fn infer_output_dims(&self, input: &[usize]) -> Result<Vec<usize>> {
        if input[1] != self.input_channel {
            return Err(InferError::Param(format!(
                "convolution expects {} input channels, got dims {:?}",
                self.input_channel, input
            )));
        }
        let (pads_begin, pads_end) = self.pads_for(&input[2..]);

        let mut dims = vec![input[0], self.output_channel];
        for i in 0..2 {
            let padded = input[2 + i] + pads_begin[i] + pads_end[i];
            let extent = self.dilations[i] * (self.kernels[i] - 1) + 1;
            if padded < extent {
                return Err(InferError::Param(format!(
                    "convolution kernel extent {} exceeds padded input {} on axis {}",
                    extent,
                    padded,
                    2 + i
                )));
            }
            dims.push((padded - extent) / self.strides[i] + 1);
        }
        Ok(dims)
    }
}

/// Closed set of per-operator configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayerParam {
    Permute(PermuteLayerParam),
    Convolution(ConvLayerParam),
    ReLU,
}

impl LayerParam {
    pub fn layer_type(&self) -> LayerType {
        match self {
            LayerParam::Permute(_) => LayerType::Permute,
            LayerParam::Convolution(_) => LayerType::Convolution,
            LayerParam::ReLU => LayerType::ReLU,
        }
    }

    pub fn as_permute(&self) -> Result<&PermuteLayerParam> {
        match self {
            LayerParam::Permute(p) => Ok(p),
            other => Err(wrong_param(LayerType::Permute, other)),
        }
    }

    pub fn as_conv(&self) -> Result<&ConvLayerParam> {
        match self {
            LayerParam::Convolution(p) => Ok(p),
            other => Err(wrong_param(LayerType::Convolution, other)),
        }
    }

    pub fn expect_relu(&self) -> Result<()> {
        match self {
            LayerParam::ReLU => Ok(()),
            other => Err(wrong_param(LayerType::ReLU, other)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            LayerParam::Permute(p) => p.validate(),
            LayerParam::Convolution(p) => p.validate(),
            LayerParam::ReLU => Ok(()),
        }
    }

    /// Output dims for the given input dims. Inputs must already be rank 4.
    pub fn infer_output_dims(&self, inputs: &[&[usize]]) -> Result<Vec<Vec<usize>>> {
        let input = inputs.first().ok_or_else(|| {
            InferError::Model(format!("{} layer has no input", self.layer_type()))
        })?;
        if input.len() != NCHW_RANK {
            return Err(InferError::Param(format!(
                "{} layer expects rank {} input, got {:?}",
                self.layer_type(),
                NCHW_RANK,
                input
            )));
        }

        let out = match self {
            LayerParam::Permute(p) => p.orders.iter().map(|&axis| input[axis]).collect(),
            LayerParam::Convolution(p) => p.infer_output_dims(input)?,
            LayerParam::ReLU => input.to_vec(),
        };
        Ok(vec![out])
    }
}

fn wrong_param(expected: LayerType, got: &LayerParam) -> InferError {
    InferError::Model(format!(
        "expected {} param, got {} param",
        expected,
        got.layer_type()
    ))
}
