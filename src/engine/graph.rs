use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use crate::{
    model::layer_param::PadType,
    tensor::DataType,
    utils::error::{InferError, Result},
};

/// Index of a node inside an [`ExternalGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "%{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GraphOp {
    /// Graph input, fed at inference time.
    Parameter { name: String, data_type: DataType },
    Constant { dims: Vec<usize>, data: Vec<f32> },
    Transpose { input: NodeId, order: Vec<usize> },
    Convolution {
        input: NodeId,
        filter: NodeId,
        bias: Option<NodeId>,
        strides: Vec<usize>,
        pads_begin: Vec<usize>,
        pads_end: Vec<usize>,
        dilations: Vec<usize>,
        group: usize,
        auto_pad: PadType,
    },
    Relu { input: NodeId },
}

impl GraphOp {
    pub fn inputs(&self) -> Vec<NodeId> {
        match self {
            GraphOp::Parameter { .. } | GraphOp::Constant { .. } => Vec::new(),
            GraphOp::Transpose { input, .. } | GraphOp::Relu { input } => vec![*input],
            GraphOp::Convolution {
                input,
                filter,
                bias,
                ..
            } => {
                let mut ids = vec![*input, *filter];
                ids.extend(bias);
                ids
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GraphOp::Parameter { .. } => "Parameter",
            GraphOp::Constant { .. } => "Constant",
            GraphOp::Transpose { .. } => "Transpose",
            GraphOp::Convolution { .. } => "Convolution",
            GraphOp::Relu { .. } => "Relu",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub name: String,
    pub op: GraphOp,
}

/// Node graph owned outside the layer list and compiled as one unit.
///
/// Nodes can only reference nodes added before them, so insertion order is
/// always a valid topological order.
#[derive(Clone, Default, PartialEq)]
pub struct ExternalGraph {
    nodes: Vec<GraphNode>,
    parameters: Vec<NodeId>,
    results: Vec<(String, NodeId)>,
}

impl ExternalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, data_type: DataType) -> NodeId {
        let name = name.into();
        let id = self.push(name.clone(), GraphOp::Parameter { name, data_type });
        self.parameters.push(id);
        id
    }

    pub fn add_node(&mut self, name: impl Into<String>, op: GraphOp) -> Result<NodeId> {
        let name = name.into();
        match op {
            GraphOp::Parameter { .. } => {
                return Err(InferError::Build(format!(
                    "parameter '{}' must be added with add_parameter",
                    name
                )));
            }
            _ => {
                for input in op.inputs() {
                    self.check(input)?;
                }
            }
        }
        Ok(self.push(name, op))
    }

    /// Expose `node` as a graph result under `name`.
    pub fn mark_output(&mut self, name: impl Into<String>, node: NodeId) -> Result<()> {
        self.check(node)?;
        self.results.push((name.into(), node));
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn results(&self) -> &[(String, NodeId)] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, name: String, op: GraphOp) -> NodeId {
        self.nodes.push(GraphNode { name, op });
        NodeId::new(self.nodes.len() - 1)
    }

    fn check(&self, id: NodeId) -> Result<()> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(InferError::Build(format!(
                "node {} does not exist in a graph of {} nodes",
                id,
                self.nodes.len()
            )))
        }
    }
}

impl Debug for ExternalGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(
            f,
            "ExternalGraph({} nodes, {} parameters, {} results)",
            self.nodes.len(),
            self.parameters.len(),
            self.results.len()
        )?;
        for (i, node) in self.nodes.iter().enumerate() {
            let inputs: Vec<String> = node.op.inputs().iter().map(|n| n.to_string()).collect();
            writeln!(
                f,
                "  %{} = {}({}) '{}'",
                i,
                node.op.kind(),
                inputs.join(", "),
                node.name
            )?;
        }
        Ok(())
    }
}
