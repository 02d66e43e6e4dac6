//! blobrt - device-abstracted neural network inference
//!
//! A static layer graph is bound to named blobs and executed either by
//! dispatching per-layer CPU kernels, or by emitting every layer into one
//! external graph that is compiled and run as a single unit.

pub mod device;

pub mod engine;

pub mod layer;

pub mod model;

pub mod network;

pub mod tensor;

pub mod utils;

pub use engine::{CompiledGraph, ExternalGraph, GraphEngine, GraphOp, NodeId, PortDesc, ReferenceEngine};
pub use layer::{Context, LayerAcc, LayerAccFactory, LayerRegistry};
pub use model::{
    ConvLayerParam, ConvLayerResource, InputShapesMap, LayerInfo, LayerParam, LayerResource,
    LayerType, NetResource, NetStructure, PadType, PermuteLayerParam, RawBuffer,
};
pub use network::{DeviceType, Network, NetworkConfig, NetworkState};
pub use tensor::{Blob, BlobHandle, BlobMap, DataType, MemoryHandle, MemoryPool, TensorDesc, count};
pub use utils::{ErrorKind, InferError, Result, STATUS_OK, status_code};
