use std::collections::HashMap;

use crate::{
    engine::graph::NodeId,
    tensor::{desc::TensorDesc, memory::MemoryHandle},
    utils::error::{InferError, Result},
};

/// Name to blob snapshot handed across the network boundary.
pub type BlobMap = HashMap<String, Blob>;

/// Opaque association between a blob and a node of an externally owned graph.
///
/// The node is unset until the layer producing the blob (or the network, for
/// graph inputs) has emitted it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForeignTensor {
    node: Option<NodeId>,
}

impl ForeignTensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn set_node(&mut self, node: NodeId) {
        self.node = Some(node);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobHandle {
    /// Described but no memory bound yet.
    Unbound,
    Direct(MemoryHandle),
    /// Data identity lives in an external graph; there is no direct memory.
    Foreign(ForeignTensor),
}

/// Shaped, typed view onto memory the blob does not own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    desc: TensorDesc,
    handle: BlobHandle,
}

impl Blob {
    pub fn new(desc: TensorDesc) -> Self {
        Self {
            desc,
            handle: BlobHandle::Unbound,
        }
    }

    pub fn with_memory(desc: TensorDesc, memory: MemoryHandle) -> Self {
        Self {
            desc,
            handle: BlobHandle::Direct(memory),
        }
    }

    pub fn name(&self) -> &str {
        self.desc.name()
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    // Only the owning network reshapes a blob.
    pub(crate) fn desc_mut(&mut self) -> &mut TensorDesc {
        &mut self.desc
    }

    pub fn handle(&self) -> BlobHandle {
        self.handle
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self.handle, BlobHandle::Foreign(_))
    }

    /// Direct memory backing the blob.
    pub fn memory(&self) -> Result<MemoryHandle> {
        match self.handle {
            BlobHandle::Direct(memory) => Ok(memory),
            BlobHandle::Unbound => Err(InferError::Memory(format!(
                "blob '{}' has no memory bound",
                self.name()
            ))),
            BlobHandle::Foreign(_) => Err(InferError::Model(format!(
                "blob '{}' wraps a foreign tensor and has no direct memory",
                self.name()
            ))),
        }
    }

    pub fn foreign(&self) -> Option<&ForeignTensor> {
        match &self.handle {
            BlobHandle::Foreign(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn foreign_mut(&mut self) -> Option<&mut ForeignTensor> {
        match &mut self.handle {
            BlobHandle::Foreign(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// Graph node a foreign blob resolves to.
    pub fn foreign_node(&self) -> Result<NodeId> {
        self.foreign()
            .and_then(ForeignTensor::node)
            .ok_or_else(|| {
                InferError::Model(format!(
                    "blob '{}' does not resolve to a graph node",
                    self.name()
                ))
            })
    }

    /// Wrap this blob in a foreign tensor, keeping its descriptor.
    pub fn into_foreign(self) -> Self {
        match self.handle {
            BlobHandle::Foreign(_) => self,
            _ => Self {
                desc: self.desc,
                handle: BlobHandle::Foreign(ForeignTensor::new()),
            },
        }
    }

    pub(crate) fn bind(&mut self, memory: MemoryHandle) {
        self.handle = BlobHandle::Direct(memory);
    }
}
