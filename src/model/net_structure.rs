use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    model::{layer_param::LayerParam, layer_resource::LayerResource, layer_type::LayerType},
    tensor::{DataType, NCHW_RANK},
    utils::error::{InferError, Result},
};

pub type InputShapesMap = HashMap<String, Vec<usize>>;

/// One layer record of the graph description.
#[derive(Clone, Debug)]
pub struct LayerInfo {
    pub layer_type: LayerType,
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub param: Arc<LayerParam>,
}

impl LayerInfo {
    pub fn new(
        name: impl Into<String>,
        param: LayerParam,
        inputs: &[&str],
        outputs: &[&str],
    ) -> Self {
        Self {
            layer_type: param.layer_type(),
            name: name.into(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            param: Arc::new(param),
        }
    }
}

/// Parsed graph description: boundary inputs plus an ordered layer list.
#[derive(Clone, Debug, Default)]
pub struct NetStructure {
    pub inputs_shape: InputShapesMap,
    pub input_data_types: HashMap<String, DataType>,
    pub layers: Vec<LayerInfo>,
    /// Explicit graph outputs. When empty, every produced but unconsumed blob.
    pub outputs: Vec<String>,
}

impl NetStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, name: impl Into<String>, dims: Vec<usize>) -> Self {
        self.inputs_shape.insert(name.into(), dims);
        self
    }

    pub fn with_typed_input(
        mut self,
        name: impl Into<String>,
        dims: Vec<usize>,
        data_type: DataType,
    ) -> Self {
        let name = name.into();
        self.input_data_types.insert(name.clone(), data_type);
        self.inputs_shape.insert(name, dims);
        self
    }

    pub fn with_layer(mut self, layer: LayerInfo) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn input_data_type(&self, name: &str) -> DataType {
        self.input_data_types
            .get(name)
            .copied()
            .unwrap_or(DataType::Float)
    }

    /// Check the description once, before any layer is built.
    ///
    /// Every param must match its declared layer type and be internally
    /// consistent. Every layer input must be a graph input or the output of
    /// an earlier layer; every blob name is produced at most once.
    pub fn validate(&self) -> Result<()> {
        if self.inputs_shape.is_empty() {
            return Err(InferError::Model("network has no inputs".into()));
        }
        for (name, dims) in &self.inputs_shape {
            if dims.len() != NCHW_RANK {
                return Err(InferError::Model(format!(
                    "input '{}' has dims {:?}, expected rank {}",
                    name, dims, NCHW_RANK
                )));
            }
        }

        let mut produced: HashSet<&str> = self.inputs_shape.keys().map(String::as_str).collect();
        let mut layer_names = HashSet::new();

        for layer in &self.layers {
            if !layer_names.insert(layer.name.as_str()) {
                return Err(InferError::Model(format!(
                    "duplicate layer name '{}'",
                    layer.name
                )));
            }
            if layer.param.layer_type() != layer.layer_type {
                return Err(InferError::Model(format!(
                    "layer '{}' is {} but carries a {} param",
                    layer.name,
                    layer.layer_type,
                    layer.param.layer_type()
                )));
            }
            layer.param.validate()?;

            if layer.inputs.len() != 1 || layer.outputs.len() != 1 {
                return Err(InferError::Model(format!(
                    "layer '{}' must have exactly one input and one output",
                    layer.name
                )));
            }
            for input in &layer.inputs {
                if !produced.contains(input.as_str()) {
                    return Err(InferError::Model(format!(
                        "layer '{}' reads blob '{}' before it is produced",
                        layer.name, input
                    )));
                }
            }
            for output in &layer.outputs {
                if !produced.insert(output.as_str()) {
                    return Err(InferError::Model(format!(
                        "blob '{}' is produced more than once",
                        output
                    )));
                }
            }
        }

        let mut declared = HashSet::new();
        for output in &self.outputs {
            if !declared.insert(output.as_str()) {
                return Err(InferError::Model(format!(
                    "output '{}' is declared more than once",
                    output
                )));
            }
            if !produced.contains(output.as_str()) {
                return Err(InferError::Model(format!(
                    "declared output '{}' is never produced",
                    output
                )));
            }
        }
        Ok(())
    }

    /// Graph outputs, in layer order when inferred.
    pub fn output_names(&self) -> Vec<String> {
        if !self.outputs.is_empty() {
            return self.outputs.clone();
        }
        let consumed: HashSet<&str> = self
            .layers
            .iter()
            .flat_map(|l| l.inputs.iter().map(String::as_str))
            .collect();
        self.layers
            .iter()
            .flat_map(|l| l.outputs.iter())
            .filter(|name| !consumed.contains(name.as_str()))
            .cloned()
            .collect()
    }
}

/// Weights by layer name.
#[derive(Clone, Debug, Default)]
pub struct NetResource {
    pub resource_map: HashMap<String, Arc<LayerResource>>,
}

impl NetResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, layer: impl Into<String>, resource: LayerResource) -> Self {
        self.resource_map.insert(layer.into(), Arc::new(resource));
        self
    }

    pub fn get(&self, layer: &str) -> Option<Arc<LayerResource>> {
        self.resource_map.get(layer).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layer_param::PermuteLayerParam;

    fn permute(name: &str, input: &str, output: &str) -> LayerInfo {
        LayerInfo::new(
            name,
            LayerParam::Permute(PermuteLayerParam::new(vec![0, 1, 3, 2])),
            &[input],
            &[output],
        )
    }

    #[test]
    fn outputs_are_inferred_from_unconsumed_blobs() {
        let net = NetStructure::new()
            .with_input("in", vec![1, 2, 3, 4])
            .with_layer(permute("p0", "in", "mid"))
            .with_layer(LayerInfo::new("r0", LayerParam::ReLU, &["mid"], &["out"]));
        net.validate().unwrap();
        assert_eq!(net.output_names(), vec!["out".to_string()]);

        let explicit = net.clone().with_output("mid");
        assert_eq!(explicit.output_names(), vec!["mid".to_string()]);
    }

    #[test]
    fn dangling_input_is_rejected() {
        let net = NetStructure::new()
            .with_input("in", vec![1, 2, 3, 4])
            .with_layer(permute("p0", "missing", "out"));
        assert!(matches!(net.validate(), Err(InferError::Model(_))));
    }

    #[test]
    fn mismatched_param_is_rejected_at_load() {
        let mut layer = permute("p0", "in", "out");
        layer.layer_type = LayerType::ReLU;
        let net = NetStructure::new()
            .with_input("in", vec![1, 2, 3, 4])
            .with_layer(layer);
        assert!(matches!(net.validate(), Err(InferError::Model(_))));
    }

    #[test]
    fn repeated_output_is_rejected() {
        let net = NetStructure::new()
            .with_input("in", vec![1, 2, 3, 4])
            .with_layer(permute("p0", "in", "out"))
            .with_output("out")
            .with_output("out");
        assert!(matches!(net.validate(), Err(InferError::Model(_))));

        // a graph input may be exposed as an output
        let passthrough = NetStructure::new()
            .with_input("in", vec![1, 2, 3, 4])
            .with_layer(permute("p0", "in", "out"))
            .with_output("in")
            .with_output("out");
        passthrough.validate().unwrap();
    }

    #[test]
    fn non_nchw_input_is_rejected() {
        let net = NetStructure::new().with_input("in", vec![2, 3]);
        assert!(matches!(net.validate(), Err(InferError::Model(_))));
    }
}
