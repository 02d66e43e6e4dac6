use std::{
    collections::HashMap,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    sync::Arc,
};

use bytemuck::Pod;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{info, warn};

use crate::{
    engine::{GraphEngine, ReferenceEngine},
    layer::registry::LayerRegistry,
    model::{
        layer_resource::LayerResource,
        net_structure::{InputShapesMap, LayerInfo, NetResource, NetStructure},
        resource_generator::generate_resource,
    },
    network::{
        config::{DeviceType, NetworkConfig},
        default_network::DefaultNetwork,
        graph_network::GraphNetwork,
    },
    tensor::{BlobMap, MemoryHandle, MemoryPool, NCHW_RANK, TensorDesc},
    utils::error::{InferError, Result},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkState {
    Unbuilt,
    Initialized,
    Reshaped,
    Forwarded,
    Deinitialized,
}

impl NetworkState {
    fn is_live(self) -> bool {
        matches!(
            self,
            NetworkState::Initialized | NetworkState::Reshaped | NetworkState::Forwarded
        )
    }
}

impl Display for NetworkState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(self, f)
    }
}

/// One execution strategy behind the [`Network`] facade.
///
/// Lifecycle ordering is enforced by the facade; implementations can assume
/// `init` succeeded before anything else is called.
pub trait NetworkBackend: Debug {
    fn init(
        &mut self,
        structure: &NetStructure,
        resource: &NetResource,
        input_shapes: &InputShapesMap,
    ) -> Result<()>;

    fn reshape(&mut self, input_shapes: &InputShapesMap) -> Result<()>;

    fn forward(&mut self) -> Result<()>;

    fn input_blobs(&self) -> Result<BlobMap>;

    fn output_blobs(&self) -> Result<BlobMap>;

    // Pool backing the boundary blobs
    fn memory(&self) -> &MemoryPool;

    fn memory_mut(&mut self) -> &mut MemoryPool;

    // Bytes of intermediate memory the network itself holds for a forward
    fn forward_memory_size(&self) -> usize;

    fn layer_count(&self) -> usize;

    fn deinit(&mut self) -> Result<()>;
}

/// Settings both backends share when building their layer list.
#[derive(Debug)]
pub(crate) struct BuildOptions {
    pub registry: Arc<LayerRegistry>,
    pub num_threads: usize,
    pub generate_missing_resources: bool,
    pub rng: StdRng,
}

/// Runnable network: a layer list bound to blobs on one device.
pub struct Network {
    device: DeviceType,
    state: NetworkState,
    backend: Box<dyn NetworkBackend>,
}

impl Network {
    /// Network over the built-in layer set and, for graph devices, the
    /// in-process reference engine.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        let registry = Arc::new(LayerRegistry::with_builtin()?);
        Self::with_engine(config, registry, Box::new(ReferenceEngine::new()))
    }

    pub fn with_registry(config: NetworkConfig, registry: Arc<LayerRegistry>) -> Result<Self> {
        Self::with_engine(config, registry, Box::new(ReferenceEngine::new()))
    }

    /// `engine` is only used when the config targets a graph device.
    pub fn with_engine(
        config: NetworkConfig,
        registry: Arc<LayerRegistry>,
        engine: Box<dyn GraphEngine>,
    ) -> Result<Self> {
        let config = config.build()?;
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let options = BuildOptions {
            registry,
            num_threads: config.num_threads,
            generate_missing_resources: config.generate_missing_resources,
            rng: StdRng::seed_from_u64(seed),
        };

        let backend: Box<dyn NetworkBackend> = match config.device_type {
            DeviceType::Cpu => Box::new(DefaultNetwork::new(options)),
            DeviceType::Graph => {
                Box::new(GraphNetwork::new(options, engine, config.engine_config))
            }
        };

        Ok(Self {
            device: config.device_type,
            state: NetworkState::Unbuilt,
            backend,
        })
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    pub fn layer_count(&self) -> usize {
        self.backend.layer_count()
    }

    /// Build the layer list. `input_shapes` overrides the declared input
    /// shapes and may be empty.
    ///
    /// On failure the network stays `Unbuilt` with whatever layers were built
    /// before the failing one; it must be discarded.
    pub fn init(
        &mut self,
        structure: &NetStructure,
        resource: &NetResource,
        input_shapes: &InputShapesMap,
    ) -> Result<()> {
        if self.state != NetworkState::Unbuilt {
            return Err(InferError::State(format!(
                "init called on a {} network",
                self.state
            )));
        }
        info!(
            "init {} network: {} layers, {} inputs",
            self.device,
            structure.layers.len(),
            structure.inputs_shape.len()
        );
        self.backend.init(structure, resource, input_shapes)?;
        self.state = NetworkState::Initialized;
        Ok(())
    }

    pub fn reshape(&mut self, input_shapes: &InputShapesMap) -> Result<()> {
        self.expect_live("reshape")?;
        info!("reshape {} network to {:?}", self.device, input_shapes);
        self.backend.reshape(input_shapes)?;
        self.state = NetworkState::Reshaped;
        Ok(())
    }

    pub fn forward(&mut self) -> Result<()> {
        self.expect_live("forward")?;
        self.backend.forward()?;
        self.state = NetworkState::Forwarded;
        Ok(())
    }

    /// Runs to completion before returning on every device, then hands the
    /// result to `callback`.
    pub fn forward_async<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnOnce(&Result<()>),
    {
        let result = self.forward();
        callback(&result);
        result
    }

    pub fn get_all_input_blobs(&self) -> Result<BlobMap> {
        self.expect_live("get_all_input_blobs")?;
        self.backend.input_blobs()
    }

    pub fn get_all_output_blobs(&self) -> Result<BlobMap> {
        self.expect_live("get_all_output_blobs")?;
        self.backend.output_blobs()
    }

    pub fn blob_bytes(&self, handle: MemoryHandle) -> Result<&[u8]> {
        self.expect_live("blob_bytes")?;
        self.backend.memory().bytes(handle)
    }

    pub fn blob_bytes_mut(&mut self, handle: MemoryHandle) -> Result<&mut [u8]> {
        self.expect_live("blob_bytes_mut")?;
        self.backend.memory_mut().bytes_mut(handle)
    }

    /// Copy `data` into the named input blob.
    pub fn write_input<T: Pod>(&mut self, name: &str, data: &[T]) -> Result<()> {
        let inputs = self.get_all_input_blobs()?;
        let blob = inputs
            .get(name)
            .ok_or_else(|| InferError::Param(format!("'{}' is not a network input", name)))?;
        check_element_size::<T>(blob.desc())?;

        let dst = self.backend.memory_mut().bytes_mut(blob.memory()?)?;
        let src: &[u8] = bytemuck::cast_slice(data);
        if src.len() != dst.len() {
            return Err(InferError::Param(format!(
                "input '{}' holds {} bytes, got {}",
                name,
                dst.len(),
                src.len()
            )));
        }
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Copy the named output blob out as `T`.
    pub fn read_output<T: Pod>(&self, name: &str) -> Result<Vec<T>> {
        let outputs = self.get_all_output_blobs()?;
        let blob = outputs
            .get(name)
            .ok_or_else(|| InferError::Param(format!("'{}' is not a network output", name)))?;
        check_element_size::<T>(blob.desc())?;
        let bytes = self.backend.memory().bytes(blob.memory()?)?;
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }

    pub fn forward_memory_size(&self) -> Result<usize> {
        self.expect_live("forward_memory_size")?;
        Ok(self.backend.forward_memory_size())
    }

    pub fn deinit(&mut self) -> Result<()> {
        self.expect_live("deinit")?;
        self.backend.deinit()?;
        self.state = NetworkState::Deinitialized;
        info!("deinit {} network", self.device);
        Ok(())
    }

    fn expect_live(&self, call: &str) -> Result<()> {
        if self.state.is_live() {
            Ok(())
        } else {
            Err(InferError::State(format!(
                "{} called on a {} network",
                call, self.state
            )))
        }
    }
}

impl Debug for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Network(device={}, state={}, backend={:?})",
            self.device, self.state, self.backend
        )
    }
}

fn check_element_size<T>(desc: &TensorDesc) -> Result<()> {
    if std::mem::size_of::<T>() != desc.data_type().size_in_bytes() {
        return Err(InferError::Param(format!(
            "blob {} cannot be viewed as {}",
            desc,
            std::any::type_name::<T>()
        )));
    }
    Ok(())
}

/// Declared input shapes with `overrides` applied.
pub(crate) fn resolve_input_shapes(
    structure: &NetStructure,
    overrides: &InputShapesMap,
) -> Result<InputShapesMap> {
    check_input_shapes(&structure.inputs_shape, overrides)?;
    let mut shapes = structure.inputs_shape.clone();
    for (name, dims) in overrides {
        shapes.insert(name.clone(), dims.clone());
    }
    Ok(shapes)
}

/// Every name must be a known input and every shape rank 4.
pub(crate) fn check_input_shapes(known: &InputShapesMap, shapes: &InputShapesMap) -> Result<()> {
    for (name, dims) in shapes {
        if !known.contains_key(name) {
            return Err(InferError::Param(format!("'{}' is not a network input", name)));
        }
        if dims.len() != NCHW_RANK {
            return Err(InferError::Param(format!(
                "input '{}' has dims {:?}, expected rank {}",
                name, dims, NCHW_RANK
            )));
        }
    }
    Ok(())
}

/// Descriptors for every blob, inputs first then layer outputs in order.
pub(crate) fn infer_blob_descs(
    structure: &NetStructure,
    input_shapes: &InputShapesMap,
) -> Result<Vec<TensorDesc>> {
    let mut descs: HashMap<String, TensorDesc> = HashMap::new();
    let mut order = Vec::new();

    let mut input_names: Vec<&String> = input_shapes.keys().collect();
    input_names.sort();
    for name in input_names {
        let desc = TensorDesc::new(
            name.clone(),
            input_shapes[name].clone(),
            structure.input_data_type(name),
        );
        order.push(name.clone());
        descs.insert(name.clone(), desc);
    }

    for layer in &structure.layers {
        let inputs: Vec<&TensorDesc> = layer
            .inputs
            .iter()
            .map(|n| {
                descs
                    .get(n)
                    .ok_or_else(|| InferError::Model(format!("unknown blob '{}'", n)))
            })
            .collect::<Result<_>>()?;
        let input_dims: Vec<&[usize]> = inputs.iter().map(|d| d.dims()).collect();
        let out_dims = layer.param.infer_output_dims(&input_dims)?;
        let data_type = inputs
            .first()
            .map(|d| d.data_type())
            .unwrap_or(crate::tensor::DataType::Float);

        for (name, dims) in layer.outputs.iter().zip(out_dims) {
            order.push(name.clone());
            descs.insert(name.clone(), TensorDesc::new(name.clone(), dims, data_type));
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|name| descs.remove(&name))
        .collect())
}

/// The resource a layer is built with, generating one when allowed.
pub(crate) fn resolve_resource(
    layer: &LayerInfo,
    resource: &NetResource,
    options: &mut BuildOptions,
) -> Option<Arc<LayerResource>> {
    if let Some(res) = resource.get(&layer.name) {
        return Some(res);
    }
    if !layer.layer_type.requires_resource() || !options.generate_missing_resources {
        return None;
    }
    warn!(
        "layer '{}' has no resource, generating random weights",
        layer.name
    );
    generate_resource(&layer.param, &mut options.rng).map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layer_param::{ConvLayerParam, LayerParam, PermuteLayerParam};

    fn structure() -> NetStructure {
        NetStructure::new()
            .with_input("in", vec![1, 3, 8, 8])
            .with_layer(LayerInfo::new(
                "conv",
                LayerParam::Convolution(ConvLayerParam::new(3, 4, [3, 3]).with_strides([2, 2])),
                &["in"],
                &["c"],
            ))
            .with_layer(LayerInfo::new(
                "perm",
                LayerParam::Permute(PermuteLayerParam::new(vec![0, 2, 3, 1])),
                &["c"],
                &["out"],
            ))
    }

    #[test]
    fn descs_follow_layer_order() {
        let s = structure();
        let descs = infer_blob_descs(&s, &s.inputs_shape).unwrap();
        let names: Vec<&str> = descs.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["in", "c", "out"]);
        assert_eq!(descs[1].dims(), &[1, 4, 3, 3]);
        assert_eq!(descs[2].dims(), &[1, 3, 3, 4]);
    }

    #[test]
    fn overrides_must_name_inputs_with_rank_four() {
        let s = structure();
        let unknown = HashMap::from([("nope".to_string(), vec![1, 3, 8, 8])]);
        let short = HashMap::from([("in".to_string(), vec![3, 8, 8])]);
        assert!(matches!(
            resolve_input_shapes(&s, &unknown),
            Err(InferError::Param(_))
        ));
        assert!(matches!(
            resolve_input_shapes(&s, &short),
            Err(InferError::Param(_))
        ));

        let bigger = HashMap::from([("in".to_string(), vec![2, 3, 16, 16])]);
        assert_eq!(resolve_input_shapes(&s, &bigger).unwrap()["in"], vec![2, 3, 16, 16]);
    }

    #[test]
    fn resources_are_generated_only_when_asked() {
        let s = structure();
        let mut options = BuildOptions {
            registry: Arc::new(LayerRegistry::new()),
            num_threads: 1,
            generate_missing_resources: false,
            rng: StdRng::seed_from_u64(1),
        };
        let empty = NetResource::new();
        assert!(resolve_resource(&s.layers[0], &empty, &mut options).is_none());

        options.generate_missing_resources = true;
        assert!(resolve_resource(&s.layers[0], &empty, &mut options).is_some());
        assert!(resolve_resource(&s.layers[1], &empty, &mut options).is_none());
    }
}
