use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
};

use tracing::{debug, info, warn};

use crate::{
    engine::{CompiledGraph, GraphEngine, PortDesc, graph::ExternalGraph},
    layer::layer_acc::{Context, LayerAcc},
    model::net_structure::{InputShapesMap, NetResource, NetStructure},
    network::{
        blob_manager::BlobManager,
        config::{CPU_THREADS_NUM, DeviceType},
        network::{
            BuildOptions, NetworkBackend, check_input_shapes, infer_blob_descs, resolve_input_shapes,
            resolve_resource,
        },
    },
    tensor::{BlobMap, MemoryHandle, MemoryPool, TensorDesc},
    utils::error::{InferError, Result},
};

struct LayerEntry {
    name: String,
    input_names: Vec<String>,
    output_names: Vec<String>,
    acc: Box<dyn LayerAcc>,
}

/// Deferred-graph network.
///
/// Every layer emits one node into an [`ExternalGraph`] at init; the graph is
/// compiled once and the compiled artifact is what runs on forward. Internal
/// blobs only carry foreign tensors. The boundary blobs live in their own
/// table, bound to memory sized by the compiled graph's ports.
pub struct GraphNetwork {
    options: BuildOptions,
    engine: Box<dyn GraphEngine>,
    engine_config: HashMap<String, String>,
    blob_manager: BlobManager,
    boundary: BlobManager,
    layers: Vec<LayerEntry>,
    graph: Option<ExternalGraph>,
    compiled: Option<Box<dyn CompiledGraph>>,
    structure: NetStructure,
    input_shapes: InputShapesMap,
}

impl GraphNetwork {
    pub(crate) fn new(
        options: BuildOptions,
        engine: Box<dyn GraphEngine>,
        mut engine_config: HashMap<String, String>,
    ) -> Self {
        // threading is left to the engine's own session
        engine_config
            .entry(CPU_THREADS_NUM.to_string())
            .or_insert_with(|| "1".to_string());
        Self {
            options,
            engine,
            engine_config,
            blob_manager: BlobManager::new(),
            boundary: BlobManager::new(),
            layers: Vec::new(),
            graph: None,
            compiled: None,
            structure: NetStructure::default(),
            input_shapes: InputShapesMap::new(),
        }
    }

    pub fn graph(&self) -> Option<&ExternalGraph> {
        self.graph.as_ref()
    }

    fn compile(&mut self, shapes: &InputShapesMap) -> Result<()> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| InferError::State("graph network has no graph to compile".into()))?;
        let compiled = self.engine.compile(graph, shapes)?;
        info!(
            "{} engine compiled {} nodes: {} inputs, {} outputs",
            self.engine.name(),
            graph.len(),
            compiled.inputs().len(),
            compiled.outputs().len()
        );

        self.boundary.clear();
        let ports = compiled.inputs().iter().chain(compiled.outputs());
        for PortDesc {
            name,
            dims,
            data_type,
        } in ports
        {
            // a graph input exposed directly as an output shares one blob
            if !self.boundary.contains(name) {
                self.boundary
                    .create_blob(TensorDesc::new(name.clone(), dims.clone(), *data_type))?;
            }
        }
        self.boundary.set_boundary(
            compiled.inputs().iter().map(|p| p.name.clone()).collect(),
            compiled.outputs().iter().map(|p| p.name.clone()).collect(),
        );
        self.boundary.allocate_all();

        self.compiled = Some(compiled);
        Ok(())
    }

    fn port_handles(&self, names: &[String]) -> Result<Vec<MemoryHandle>> {
        names
            .iter()
            .map(|n| self.boundary.get(n)?.memory())
            .collect()
    }
}

impl NetworkBackend for GraphNetwork {
    fn init(
        &mut self,
        structure: &NetStructure,
        resource: &NetResource,
        input_shapes: &InputShapesMap,
    ) -> Result<()> {
        structure.validate()?;
        let shapes = resolve_input_shapes(structure, input_shapes)?;
        for desc in infer_blob_descs(structure, &shapes)? {
            self.blob_manager.create_blob(desc)?;
        }

        let mut context =
            Context::new(DeviceType::Graph, self.options.num_threads).with_graph(ExternalGraph::new());

        // graph inputs become parameters before any layer reads them
        let mut input_names: Vec<String> = shapes.keys().cloned().collect();
        input_names.sort();
        for name in &input_names {
            self.blob_manager.wrap_foreign(name)?;
            let mut blob = self.blob_manager.get(name)?.clone();
            let node = context
                .graph_mut()?
                .add_parameter(name.clone(), blob.desc().data_type());
            if let Some(tensor) = blob.foreign_mut() {
                tensor.set_node(node);
            }
            self.blob_manager.replace_blob(name, blob)?;
        }

        for layer in &structure.layers {
            for name in layer.inputs.iter().chain(&layer.outputs) {
                self.blob_manager.wrap_foreign(name)?;
            }

            let mut acc = self
                .options
                .registry
                .create(layer.layer_type, DeviceType::Graph)
                .ok_or_else(|| {
                    InferError::Build(format!(
                        "layer '{}': {} is not supported on {}",
                        layer.name,
                        layer.layer_type,
                        DeviceType::Graph
                    ))
                })?;

            let res = resolve_resource(layer, resource, &mut self.options);
            let inputs = self.blob_manager.blobs_of(&layer.inputs)?;
            let mut outputs = self.blob_manager.blobs_of(&layer.outputs)?;
            acc.init(&mut context, layer.param.clone(), res, &inputs, &mut outputs)?;
            for blob in outputs {
                let name = blob.name().to_string();
                self.blob_manager.replace_blob(&name, blob)?;
            }
            debug!("built layer '{}': {:?}", layer.name, acc);

            self.layers.push(LayerEntry {
                name: layer.name.clone(),
                input_names: layer.inputs.clone(),
                output_names: layer.outputs.clone(),
                acc,
            });
        }

        let output_names = structure.output_names();
        {
            let graph = context.graph_mut()?;
            for name in &output_names {
                let node = self.blob_manager.get(name)?.foreign_node()?;
                graph.mark_output(name.clone(), node)?;
            }
        }
        self.blob_manager.set_boundary(input_names, output_names);
        self.graph = context.take_graph();

        self.engine.set_config(&self.engine_config)?;
        self.compile(&shapes)?;

        self.structure = structure.clone();
        self.input_shapes = shapes;
        Ok(())
    }

    fn reshape(&mut self, input_shapes: &InputShapesMap) -> Result<()> {
        check_input_shapes(&self.input_shapes, input_shapes)?;
        let mut shapes = self.input_shapes.clone();
        for (name, dims) in input_shapes {
            shapes.insert(name.clone(), dims.clone());
        }

        for desc in infer_blob_descs(&self.structure, &shapes)? {
            let name = desc.name().to_string();
            self.blob_manager.set_dims(&name, desc.dims().to_vec())?;
        }
        for entry in &mut self.layers {
            let inputs = self.blob_manager.blobs_of(&entry.input_names)?;
            let outputs = self.blob_manager.blobs_of(&entry.output_names)?;
            entry.acc.reshape(&inputs, &outputs)?;
        }

        warn!("reshape recompiles the whole graph");
        self.compile(&shapes)?;
        self.input_shapes = shapes;
        Ok(())
    }

    fn forward(&mut self) -> Result<()> {
        let in_handles = self.port_handles(self.boundary.input_names())?;
        let out_handles = self.port_handles(self.boundary.output_names())?;
        let compiled = self
            .compiled
            .as_mut()
            .ok_or_else(|| InferError::State("graph network is not compiled".into()))?;

        // A port whose blob is a graph input, or an earlier port of the same
        // name, already holds its value; the engine writes it into scratch.
        let shared: Vec<bool> = out_handles
            .iter()
            .enumerate()
            .map(|(i, h)| in_handles.contains(h) || out_handles[..i].contains(h))
            .collect();
        let bound: Vec<MemoryHandle> = out_handles
            .iter()
            .zip(&shared)
            .filter(|(_, s)| !**s)
            .map(|(h, _)| *h)
            .collect();
        let mut scratch: Vec<Vec<u8>> = compiled
            .outputs()
            .iter()
            .zip(&shared)
            .filter(|(_, s)| **s)
            .map(|(port, _)| vec![0u8; port.size_in_bytes()])
            .collect();

        let (ins, outs) = self.boundary.memory_mut().split_io(&in_handles, &bound)?;
        let mut outs = outs.into_iter();
        let mut spare = scratch.iter_mut();
        let mut views: Vec<&mut [u8]> = Vec::with_capacity(shared.len());
        for (port, is_shared) in compiled.outputs().iter().zip(&shared) {
            let view = if *is_shared {
                spare.next().map(Vec::as_mut_slice)
            } else {
                outs.next()
            };
            views.push(view.ok_or_else(|| {
                InferError::Memory(format!("output port '{}' has no buffer", port.name))
            })?);
        }
        compiled.infer(&ins, &mut views)
    }

    fn input_blobs(&self) -> Result<BlobMap> {
        self.boundary.input_blobs()
    }

    fn output_blobs(&self) -> Result<BlobMap> {
        self.boundary.output_blobs()
    }

    fn memory(&self) -> &MemoryPool {
        self.boundary.memory()
    }

    fn memory_mut(&mut self) -> &mut MemoryPool {
        self.boundary.memory_mut()
    }

    // intermediates belong to the compiled artifact
    fn forward_memory_size(&self) -> usize {
        0
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn deinit(&mut self) -> Result<()> {
        self.compiled = None;
        self.graph = None;
        self.layers.clear();
        self.blob_manager.clear();
        self.boundary.clear();
        Ok(())
    }
}

impl Debug for GraphNetwork {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let names: Vec<&str> = self.layers.iter().map(|l| l.name.as_str()).collect();
        write!(
            f,
            "GraphNetwork(engine={}, layers={:?}, nodes={}, compiled={})",
            self.engine.name(),
            names,
            self.graph.as_ref().map_or(0, ExternalGraph::len),
            self.compiled.is_some()
        )
    }
}
