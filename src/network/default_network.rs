use std::fmt::{Debug, Formatter, Result as FmtResult};

use tracing::debug;

use crate::{
    layer::layer_acc::{Context, LayerAcc},
    model::net_structure::{InputShapesMap, NetResource, NetStructure},
    network::{
        blob_manager::BlobManager,
        config::DeviceType,
        network::{
            BuildOptions, NetworkBackend, check_input_shapes, infer_blob_descs, resolve_input_shapes,
            resolve_resource,
        },
    },
    tensor::{Blob, BlobMap, MemoryPool},
    utils::error::{InferError, Result},
};

struct LayerEntry {
    name: String,
    input_names: Vec<String>,
    output_names: Vec<String>,
    acc: Box<dyn LayerAcc>,
    // copies of the table entries, refreshed whenever memory is rebound
    inputs: Vec<Blob>,
    outputs: Vec<Blob>,
}

/// Immediate-dispatch network: every forward runs each layer's kernel in
/// build order over blobs in one memory pool.
pub struct DefaultNetwork {
    options: BuildOptions,
    context: Context,
    structure: NetStructure,
    input_shapes: InputShapesMap,
    blob_manager: BlobManager,
    layers: Vec<LayerEntry>,
}

impl DefaultNetwork {
    pub(crate) fn new(options: BuildOptions) -> Self {
        let context = Context::new(DeviceType::Cpu, options.num_threads);
        Self {
            options,
            context,
            structure: NetStructure::default(),
            input_shapes: InputShapesMap::new(),
            blob_manager: BlobManager::new(),
            layers: Vec::new(),
        }
    }

    fn refresh_layer_blobs(&mut self) -> Result<()> {
        for entry in &mut self.layers {
            entry.inputs = self.blob_manager.blobs_of(&entry.input_names)?;
            entry.outputs = self.blob_manager.blobs_of(&entry.output_names)?;
        }
        Ok(())
    }
}

impl NetworkBackend for DefaultNetwork {
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
        let mut input_names: Vec<String> = shapes.keys().cloned().collect();
        input_names.sort();
        self.blob_manager
            .set_boundary(input_names, structure.output_names());
        self.blob_manager.allocate_all();

        for layer in &structure.layers {
            let mut acc = self
                .options
                .registry
                .create(layer.layer_type, DeviceType::Cpu)
                .ok_or_else(|| {
                    InferError::Build(format!(
                        "layer '{}': {} is not supported on {}",
                        layer.name,
                        layer.layer_type,
                        DeviceType::Cpu
                    ))
                })?;

            let res = resolve_resource(layer, resource, &mut self.options);
            let inputs = self.blob_manager.blobs_of(&layer.inputs)?;
            let mut outputs = self.blob_manager.blobs_of(&layer.outputs)?;
            acc.init(
                &mut self.context,
                layer.param.clone(),
                res,
                &inputs,
                &mut outputs,
            )?;
            debug!("built layer '{}': {:?}", layer.name, acc);

            self.layers.push(LayerEntry {
                name: layer.name.clone(),
                input_names: layer.inputs.clone(),
                output_names: layer.outputs.clone(),
                acc,
                inputs,
                outputs,
            });
        }

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

        let descs = infer_blob_descs(&self.structure, &shapes)?;
        for desc in descs {
            let name = desc.name().to_string();
            self.blob_manager.set_dims(&name, desc.dims().to_vec())?;
        }
        self.blob_manager.allocate_all();
        self.refresh_layer_blobs()?;

        for entry in &mut self.layers {
            entry.acc.reshape(&entry.inputs, &entry.outputs)?;
        }
        self.input_shapes = shapes;
        Ok(())
    }

    fn forward(&mut self) -> Result<()> {
        for entry in &mut self.layers {
            debug!("forward layer '{}'", entry.name);
            entry
                .acc
                .forward(&entry.inputs, &entry.outputs, self.blob_manager.memory_mut())?;
        }
        Ok(())
    }

    fn input_blobs(&self) -> Result<BlobMap> {
        self.blob_manager.input_blobs()
    }

    fn output_blobs(&self) -> Result<BlobMap> {
        self.blob_manager.output_blobs()
    }

    fn memory(&self) -> &MemoryPool {
        self.blob_manager.memory()
    }

    fn memory_mut(&mut self) -> &mut MemoryPool {
        self.blob_manager.memory_mut()
    }

    fn forward_memory_size(&self) -> usize {
        self.blob_manager.memory().total_bytes()
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn deinit(&mut self) -> Result<()> {
        self.layers.clear();
        self.blob_manager.clear();
        Ok(())
    }
}

impl Debug for DefaultNetwork {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "DefaultNetwork(layers={}, blobs={}, memory={} bytes)",
            self.layers.len(),
            self.blob_manager.len(),
            self.blob_manager.memory().total_bytes()
        )
    }
}
