use std::{fmt::Debug, sync::Arc};

use crate::{
    engine::graph::ExternalGraph,
    model::{layer_param::LayerParam, layer_resource::LayerResource, layer_type::LayerType},
    network::config::DeviceType,
    tensor::{Blob, MemoryPool},
    utils::error::{InferError, Result},
};

/// Per-network state handed to every layer at init.
#[derive(Debug)]
pub struct Context {
    device: DeviceType,
    num_threads: usize,
    graph: Option<ExternalGraph>,
}

impl Context {
    pub fn new(device: DeviceType, num_threads: usize) -> Self {
        Self {
            device,
            num_threads,
            graph: None,
        }
    }

    pub fn with_graph(mut self, graph: ExternalGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn graph(&self) -> Option<&ExternalGraph> {
        self.graph.as_ref()
    }

    /// The graph under construction; only deferred-graph networks have one.
    pub fn graph_mut(&mut self) -> Result<&mut ExternalGraph> {
        self.graph.as_mut().ok_or_else(|| {
            InferError::Build(format!(
                "{} context carries no external graph to build into",
                self.device
            ))
        })
    }

    pub fn take_graph(&mut self) -> Option<ExternalGraph> {
        self.graph.take()
    }
}

/// Contract every per-device operator implementation satisfies.
///
/// The network calls `init` once, `reshape` whenever input shapes change and
/// `forward` once per inference. Inputs are read only; output memory is
/// allocated by the network, never by the layer.
pub trait LayerAcc: Debug {
    // Validate param and resource and do one-time setup. A second call fails.
    fn init(
        &mut self,
        ctx: &mut Context,
        param: Arc<LayerParam>,
        resource: Option<Arc<LayerResource>>,
        inputs: &[Blob],
        outputs: &mut [Blob],
    ) -> Result<()>;

    // Recompute shape-dependent state after the network has resized the blobs
    fn reshape(&mut self, inputs: &[Blob], outputs: &[Blob]) -> Result<()>;

    // Compute outputs from inputs through the network's memory pool
    fn forward(&mut self, inputs: &[Blob], outputs: &[Blob], memory: &mut MemoryPool)
    -> Result<()>;
}

pub(crate) fn ensure_uninitialized<T>(layer: LayerType, slot: &Option<T>) -> Result<()> {
    match slot {
        Some(_) => Err(InferError::State(format!(
            "{} layer is already initialized",
            layer
        ))),
        None => Ok(()),
    }
}

pub(crate) fn initialized<T>(layer: LayerType, slot: &Option<T>) -> Result<&T> {
    slot.as_ref()
        .ok_or_else(|| InferError::State(format!("{} layer used before init", layer)))
}

pub(crate) fn initialized_mut<T>(layer: LayerType, slot: &mut Option<T>) -> Result<&mut T> {
    slot.as_mut()
        .ok_or_else(|| InferError::State(format!("{} layer used before init", layer)))
}

/// The lone input and output of a single-in single-out layer.
pub(crate) fn single_io<'a>(
    layer: LayerType,
    inputs: &'a [Blob],
    outputs: &'a [Blob],
) -> Result<(&'a Blob, &'a Blob)> {
    match (inputs, outputs) {
        ([input], [output]) => Ok((input, output)),
        _ => Err(InferError::Model(format!(
            "{} layer takes 1 input and 1 output, got {} and {}",
            layer,
            inputs.len(),
            outputs.len()
        ))),
    }
}
