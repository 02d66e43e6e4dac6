use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    device::cpu::{conv::f32_cpu as conv_f32, permute::naive_cpu::naive_permute, relu::f32_cpu as relu_f32},
    engine::{
        CompiledGraph, GraphEngine, PortDesc,
        graph::{ExternalGraph, GraphOp},
    },
    model::{InputShapesMap, layer_param::PadType},
    network::config::CPU_THREADS_NUM,
    tensor::{DataType, NCHW_RANK, count},
    utils::{
        auto_pads_calc::calc_begin_and_end_pads,
        error::{InferError, Result},
    },
};

/// In-process graph compiler that runs every node on the CPU kernels.
///
/// Supports f32 graphs only. Config keys other than `CPU_THREADS_NUM` are
/// accepted and kept without interpretation.
#[derive(Debug)]
pub struct ReferenceEngine {
    num_threads: usize,
    config: HashMap<String, String>,
}

impl ReferenceEngine {
    pub fn new() -> Self {
        Self {
            num_threads: 1,
            config: HashMap::new(),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn config(&self) -> &HashMap<String, String> {
        &self.config
    }
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphEngine for ReferenceEngine {
    fn name(&self) -> &str {
        "reference"
    }

    fn set_config(&mut self, config: &HashMap<String, String>) -> Result<()> {
        for (key, value) in config {
            if key == CPU_THREADS_NUM {
                self.num_threads = value.parse().map_err(|_| {
                    InferError::Backend(format!("{} is not a number: '{}'", CPU_THREADS_NUM, value))
                })?;
            }
            self.config.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn compile(
        &self,
        graph: &ExternalGraph,
        input_shapes: &InputShapesMap,
    ) -> Result<Box<dyn CompiledGraph>> {
        let mut dims: Vec<Vec<usize>> = Vec::with_capacity(graph.len());
        let mut steps = Vec::with_capacity(graph.len());

        for node in graph.nodes() {
            let (out_dims, step) = compile_node(&node.op, &node.name, &dims, input_shapes)?;
            dims.push(out_dims);
            steps.push(step);
        }

        let inputs = graph
            .parameters()
            .iter()
            .map(|id| PortDesc {
                name: graph.nodes()[id.index()].name.clone(),
                dims: dims[id.index()].clone(),
                data_type: DataType::Float,
            })
            .collect();
        let outputs = graph
            .results()
            .iter()
            .map(|(name, id)| PortDesc {
                name: name.clone(),
                dims: dims[id.index()].clone(),
                data_type: DataType::Float,
            })
            .collect();

        info!(
            "reference engine compiled {} nodes ({} threads)",
            steps.len(),
            self.num_threads
        );
        Ok(Box::new(ReferenceGraph {
            dims,
            steps,
            parameters: graph.parameters().iter().map(|id| id.index()).collect(),
            results: graph.results().iter().map(|(_, id)| id.index()).collect(),
            inputs,
            outputs,
        }))
    }
}

#[derive(Debug)]
enum Step {
    Input,
    Constant(Vec<f32>),
    Transpose {
        input: usize,
        order: Vec<usize>,
    },
    Convolution {
        input: usize,
        filter: usize,
        bias: Option<usize>,
        strides: Vec<usize>,
        pads_begin: Vec<usize>,
        dilations: Vec<usize>,
        group: usize,
    },
    Relu {
        input: usize,
    },
}

fn backend_err(node: &str, msg: String) -> InferError {
    InferError::Backend(format!("node '{}': {}", node, msg))
}

fn nchw<'a>(dims: &'a [Vec<usize>], idx: usize, node: &str) -> Result<&'a [usize]> {
    let d = &dims[idx];
    if d.len() != NCHW_RANK {
        return Err(backend_err(node, format!("expected a rank 4 input, got {:?}", d)));
    }
    Ok(d)
}

fn compile_node(
    op: &GraphOp,
    name: &str,
    dims: &[Vec<usize>],
    input_shapes: &InputShapesMap,
) -> Result<(Vec<usize>, Step)> {
    match op {
        GraphOp::Parameter { name, data_type } => {
            if *data_type != DataType::Float {
                return Err(backend_err(
                    name,
                    format!("unsupported parameter precision {:?}", data_type),
                ));
            }
            let shape = input_shapes
                .get(name)
                .ok_or_else(|| backend_err(name, "no shape given for parameter".into()))?;
            if shape.len() != NCHW_RANK {
                return Err(backend_err(name, format!("parameter shape {:?} is not rank 4", shape)));
            }
            Ok((shape.clone(), Step::Input))
        }
        GraphOp::Constant { dims: d, data } => {
            if count(d, 0) != data.len() {
                return Err(backend_err(
                    name,
                    format!("constant of {} values does not fill {:?}", data.len(), d),
                ));
            }
            Ok((d.clone(), Step::Constant(data.clone())))
        }
        GraphOp::Transpose { input, order } => {
            let in_dims = nchw(dims, input.index(), name)?;
            let mut seen = [false; NCHW_RANK];
            for &o in order {
                if o >= NCHW_RANK || seen[o] {
                    return Err(backend_err(name, format!("invalid transpose order {:?}", order)));
                }
                seen[o] = true;
            }
            if order.len() != NCHW_RANK {
                return Err(backend_err(name, format!("invalid transpose order {:?}", order)));
            }
            Ok((
                order.iter().map(|&o| in_dims[o]).collect(),
                Step::Transpose {
                    input: input.index(),
                    order: order.clone(),
                },
            ))
        }
        GraphOp::Convolution {
            input,
            filter,
            bias,
            strides,
            pads_begin,
            pads_end,
            dilations,
            group,
            auto_pad,
        } => {
            let in_dims = nchw(dims, input.index(), name)?;
            let w_dims = nchw(dims, filter.index(), name)?;
            if *group == 0 || w_dims[1] * group != in_dims[1] || !w_dims[0].is_multiple_of(*group) {
                return Err(backend_err(
                    name,
                    format!(
                        "filter {:?} with group {} does not fit input {:?}",
                        w_dims, group, in_dims
                    ),
                ));
            }
            if let Some(b) = bias {
                if count(&dims[b.index()], 0) != w_dims[0] {
                    return Err(backend_err(name, format!("bias does not have {} values", w_dims[0])));
                }
            }

            let kernels = &w_dims[2..];
            if strides.len() != 2
                || dilations.len() != 2
                || strides.contains(&0)
                || dilations.contains(&0)
                || kernels.contains(&0)
            {
                return Err(backend_err(
                    name,
                    format!(
                        "invalid strides {:?}, dilations {:?} or kernel {:?}",
                        strides, dilations, kernels
                    ),
                ));
            }
            let (begin, end) = match auto_pad {
                PadType::Explicit => (pads_begin.clone(), pads_end.clone()),
                other => {
                    calc_begin_and_end_pads(*other, &[], kernels, strides, dilations, &in_dims[2..])
                }
            };
            if begin.len() != 2 || end.len() != 2 {
                return Err(backend_err(name, format!("invalid pads {:?} / {:?}", begin, end)));
            }

            let mut out = vec![in_dims[0], w_dims[0]];
            for i in 0..2 {
                let padded = in_dims[2 + i] + begin[i] + end[i];
                let extent = dilations[i] * (kernels[i] - 1) + 1;
                if padded < extent {
                    return Err(backend_err(
                        name,
                        format!("kernel does not fit padded input {:?}", in_dims),
                    ));
                }
                out.push((padded - extent) / strides[i] + 1);
            }

            Ok((
                out,
                Step::Convolution {
                    input: input.index(),
                    filter: filter.index(),
                    bias: bias.map(|b| b.index()),
                    strides: strides.clone(),
                    pads_begin: begin,
                    dilations: dilations.clone(),
                    group: *group,
                },
            ))
        }
        GraphOp::Relu { input } => Ok((
            nchw(dims, input.index(), name)?.to_vec(),
            Step::Relu {
                input: input.index(),
            },
        )),
    }
}

#[derive(Debug)]
struct ReferenceGraph {
    dims: Vec<Vec<usize>>,
    steps: Vec<Step>,
    parameters: Vec<usize>,
    results: Vec<usize>,
    inputs: Vec<PortDesc>,
    outputs: Vec<PortDesc>,
}

impl CompiledGraph for ReferenceGraph {
    fn inputs(&self) -> &[PortDesc] {
        &self.inputs
    }

    fn outputs(&self) -> &[PortDesc] {
        &self.outputs
    }

    fn infer(&mut self, inputs: &[&[u8]], outputs: &mut [&mut [u8]]) -> Result<()> {
        if inputs.len() != self.inputs.len() || outputs.len() != self.outputs.len() {
            return Err(InferError::Backend(format!(
                "expected {} inputs and {} outputs, got {} and {}",
                self.inputs.len(),
                self.outputs.len(),
                inputs.len(),
                outputs.len()
            )));
        }

        let mut values: Vec<Vec<f32>> = vec![Vec::new(); self.steps.len()];
        for ((&node, bytes), port) in self.parameters.iter().zip(inputs).zip(&self.inputs) {
            if bytes.len() != port.size_in_bytes() {
                return Err(InferError::Backend(format!(
                    "input '{}' needs {} bytes, got {}",
                    port.name,
                    port.size_in_bytes(),
                    bytes.len()
                )));
            }
            values[node] = bytemuck::pod_collect_to_vec(bytes);
        }

        for (idx, step) in self.steps.iter().enumerate() {
            let out = match step {
                Step::Input => continue,
                Step::Constant(data) => data.clone(),
                Step::Transpose { input, order } => {
                    let mut out = vec![0f32; values[*input].len()];
                    naive_permute(
                        std::mem::size_of::<f32>(),
                        bytemuck::cast_slice(&values[*input]),
                        &self.dims[*input],
                        bytemuck::cast_slice_mut(&mut out),
                        &self.dims[idx],
                        order,
                    )?;
                    out
                }
                Step::Convolution {
                    input,
                    filter,
                    bias,
                    strides,
                    pads_begin,
                    dilations,
                    group,
                } => {
                    let mut out = vec![0f32; count(&self.dims[idx], 0)];
                    conv_f32::f32_cpu(
                        &self.dims[*input],
                        &self.dims[*filter],
                        &self.dims[idx],
                        &values[*input],
                        &values[*filter],
                        bias.map(|b| values[b].as_slice()),
                        &mut out,
                        strides,
                        pads_begin,
                        dilations,
                        *group,
                    )?;
                    out
                }
                Step::Relu { input } => {
                    let mut out = vec![0f32; values[*input].len()];
                    relu_f32::f32_cpu(&values[*input], &mut out);
                    out
                }
            };
            values[idx] = out;
        }

        for ((&node, dst), port) in self.results.iter().zip(outputs.iter_mut()).zip(&self.outputs) {
            let src: &[u8] = bytemuck::cast_slice(&values[node]);
            if dst.len() != src.len() {
                return Err(InferError::Backend(format!(
                    "output '{}' needs {} bytes, got {}",
                    port.name,
                    src.len(),
                    dst.len()
                )));
            }
            dst.copy_from_slice(src);
        }
        debug!("reference graph ran {} steps", self.steps.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::NodeId;

    fn shapes(dims: Vec<usize>) -> InputShapesMap {
        HashMap::from([("x".to_string(), dims)])
    }

    #[test]
    fn runs_transpose_then_relu() {
        let mut graph = ExternalGraph::new();
        let x = graph.add_parameter("x", DataType::Float);
        let t = graph
            .add_node(
                "t",
                GraphOp::Transpose {
                    input: x,
                    order: vec![0, 1, 3, 2],
                },
            )
            .unwrap();
        let r = graph.add_node("r", GraphOp::Relu { input: t }).unwrap();
        graph.mark_output("y", r).unwrap();

        let mut compiled = ReferenceEngine::new()
            .compile(&graph, &shapes(vec![1, 1, 2, 2]))
            .unwrap();
        assert_eq!(compiled.outputs()[0].dims, vec![1, 1, 2, 2]);

        let input = [1.0f32, -2.0, 3.0, -4.0];
        let mut out = [0f32; 4];
        compiled
            .infer(
                &[bytemuck::cast_slice::<f32, u8>(&input)],
                &mut [bytemuck::cast_slice_mut::<f32, u8>(&mut out)],
            )
            .unwrap();
        assert_eq!(out, [1.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn int8_parameters_are_rejected() {
        let mut graph = ExternalGraph::new();
        let x = graph.add_parameter("x", DataType::Int8);
        graph.mark_output("x", x).unwrap();
        let err = ReferenceEngine::new()
            .compile(&graph, &shapes(vec![1, 1, 1, 1]))
            .unwrap_err();
        assert!(matches!(err, InferError::Backend(_)));
    }

    #[test]
    fn bad_shapes_fail_compile() {
        let mut graph = ExternalGraph::new();
        let x = graph.add_parameter("x", DataType::Float);
        let r = graph.add_node("r", GraphOp::Relu { input: x }).unwrap();
        graph.mark_output("r", r).unwrap();
        let engine = ReferenceEngine::new();
        assert!(engine.compile(&graph, &shapes(vec![1, 2])).is_err());
        assert!(engine.compile(&graph, &HashMap::new()).is_err());
        assert_eq!(r, NodeId::new(1));
    }

    #[test]
    fn thread_config_is_parsed_and_kept() {
        let mut engine = ReferenceEngine::new();
        let config = HashMap::from([
            (CPU_THREADS_NUM.to_string(), "1".to_string()),
            ("VENDOR_FLAG".to_string(), "on".to_string()),
        ]);
        engine.set_config(&config).unwrap();
        assert_eq!(engine.num_threads(), 1);
        assert_eq!(engine.config().get("VENDOR_FLAG").map(String::as_str), Some("on"));

        let bad = HashMap::from([(CPU_THREADS_NUM.to_string(), "many".to_string())]);
        assert!(matches!(engine.set_config(&bad), Err(InferError::Backend(_))));
    }
}
