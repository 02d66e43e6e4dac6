//! Boundary to an external graph compiler.
//!
//! A deferred-graph network builds one [`ExternalGraph`], hands it to a
//! [`GraphEngine`] and from then on only talks to the resulting
//! [`CompiledGraph`]. Buffers cross the boundary as raw bytes, in port order.

use std::{collections::HashMap, fmt::Debug};

use crate::{model::InputShapesMap, tensor::DataType, utils::error::Result};

pub mod graph;
pub mod reference;

pub use graph::{ExternalGraph, GraphNode, GraphOp, NodeId};
pub use reference::ReferenceEngine;

/// Shape and type of one compiled-graph input or output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDesc {
    pub name: String,
    pub dims: Vec<usize>,
    pub data_type: DataType,
}

impl PortDesc {
    pub fn size_in_bytes(&self) -> usize {
        self.dims.iter().product::<usize>() * self.data_type.size_in_bytes()
    }
}

pub trait CompiledGraph: Debug {
    fn inputs(&self) -> &[PortDesc];

    fn outputs(&self) -> &[PortDesc];

    /// Run the whole graph. `inputs` and `outputs` follow port order and
    /// must be exactly the size each port declares.
    fn infer(&mut self, inputs: &[&[u8]], outputs: &mut [&mut [u8]]) -> Result<()>;
}

pub trait GraphEngine: Debug {
    fn name(&self) -> &str;

    /// Opaque key/value session configuration, applied before compiling.
    fn set_config(&mut self, config: &HashMap<String, String>) -> Result<()>;

    fn compile(
        &self,
        graph: &ExternalGraph,
        input_shapes: &InputShapesMap,
    ) -> Result<Box<dyn CompiledGraph>>;
}
