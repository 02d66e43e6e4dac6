// Deferred-graph network tests: parity with the CPU path, compile errors, reshape

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use blobrt::{
    CompiledGraph, ConvLayerParam, ConvLayerResource, DataType, DeviceType, ExternalGraph,
    GraphEngine, InferError, InputShapesMap, LayerInfo, LayerParam, LayerRegistry, LayerResource,
    NetResource, NetStructure, Network, NetworkConfig, NetworkState, PermuteLayerParam, RawBuffer,
    ReferenceEngine, Result,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Reference engine that counts how often it is asked to compile
#[derive(Debug)]
struct CountingEngine {
    inner: ReferenceEngine,
    compiles: Arc<AtomicUsize>,
}

impl GraphEngine for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    fn set_config(&mut self, config: &HashMap<String, String>) -> Result<()> {
        self.inner.set_config(config)
    }

    fn compile(
        &self,
        graph: &ExternalGraph,
        input_shapes: &InputShapesMap,
    ) -> Result<Box<dyn CompiledGraph>> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(graph, input_shapes)
    }
}

fn conv_relu_permute() -> NetStructure {
    NetStructure::new()
        .with_input("image", vec![1, 2, 5, 4])
        .with_layer(LayerInfo::new(
            "conv",
            LayerParam::Convolution(
                ConvLayerParam::new(2, 4, [3, 3])
                    .with_strides([1, 2])
                    .with_pads([1, 1, 0, 1])
                    .with_bias(true),
            ),
            &["image"],
            &["features"],
        ))
        .with_layer(LayerInfo::new("relu", LayerParam::ReLU, &["features"], &["act"]))
        .with_layer(LayerInfo::new(
            "to_nhwc",
            LayerParam::Permute(PermuteLayerParam::new(vec![0, 2, 3, 1])),
            &["act"],
            &["out"],
        ))
}

fn random_resource(rng: &mut StdRng) -> NetResource {
    let filter: Vec<f32> = (0..4 * 2 * 9).map(|_| rng.random_range(-1.0..1.0)).collect();
    let bias: Vec<f32> = (0..4).map(|_| rng.random_range(-0.5..0.5)).collect();
    NetResource::new().with_resource(
        "conv",
        LayerResource::Convolution(ConvLayerResource {
            filter: RawBuffer::from_f32(vec![4, 2, 3, 3], &filter),
            bias: Some(RawBuffer::from_f32(vec![4], &bias)),
        }),
    )
}

fn run(device: DeviceType, structure: &NetStructure, resource: &NetResource, input: &[f32]) -> Vec<f32> {
    let mut net = Network::new(NetworkConfig::new(device)).unwrap();
    net.init(structure, resource, &HashMap::new()).unwrap();
    net.write_input("image", input).unwrap();
    net.forward().unwrap();
    net.read_output("out").unwrap()
}

#[test]
fn test_graph_matches_cpu() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(2024);
    let structure = conv_relu_permute();
    let resource = random_resource(&mut rng);
    let input: Vec<f32> = (0..40).map(|_| rng.random_range(-2.0..2.0)).collect();

    let cpu = run(DeviceType::Cpu, &structure, &resource, &input);
    let graph = run(DeviceType::Graph, &structure, &resource, &input);
    assert_eq!(cpu.len(), graph.len());
    for (a, b) in cpu.iter().zip(&graph) {
        assert!((a - b).abs() < 1e-5, "cpu {} vs graph {}", a, b);
    }
}

#[test]
fn test_graph_output_shapes() {
    init_tracing();
    let mut net = Network::new(NetworkConfig::new(DeviceType::Graph)).unwrap();
    let resource = random_resource(&mut StdRng::seed_from_u64(1));
    net.init(&conv_relu_permute(), &resource, &HashMap::new())
        .unwrap();
    assert_eq!(net.layer_count(), 3);

    let inputs = net.get_all_input_blobs().unwrap();
    let outputs = net.get_all_output_blobs().unwrap();
    assert_eq!(inputs["image"].desc().dims(), &[1, 2, 5, 4]);
    assert!(!inputs["image"].is_foreign());
    // H: (5 + 2 - 3) / 1 + 1 = 5, W: (4 + 1 - 3) / 2 + 1 = 2
    assert_eq!(outputs["out"].desc().dims(), &[1, 5, 2, 4]);
    assert!(!outputs["out"].is_foreign());
}

#[test]
fn test_graph_holds_no_forward_memory() {
    init_tracing();
    let mut net = Network::new(NetworkConfig::new(DeviceType::Graph)).unwrap();
    let resource = random_resource(&mut StdRng::seed_from_u64(5));
    net.init(&conv_relu_permute(), &resource, &HashMap::new())
        .unwrap();
    assert_eq!(net.forward_memory_size().unwrap(), 0);
}

#[test]
fn test_int8_input_fails_compile() {
    init_tracing();
    let structure = NetStructure::new()
        .with_typed_input("q", vec![1, 1, 2, 2], DataType::Int8)
        .with_layer(LayerInfo::new("relu", LayerParam::ReLU, &["q"], &["out"]));

    let mut net = Network::new(NetworkConfig::new(DeviceType::Graph)).unwrap();
    let err = net
        .init(&structure, &NetResource::new(), &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, InferError::Backend(_)), "{:?}", err);
    assert_eq!(net.state(), NetworkState::Unbuilt);

    // the same network runs on the CPU device
    let mut cpu = Network::new(NetworkConfig::new(DeviceType::Cpu)).unwrap();
    cpu.init(&structure, &NetResource::new(), &HashMap::new())
        .unwrap();
    cpu.write_input("q", &[-3i8, 4, 0, -1]).unwrap();
    cpu.forward().unwrap();
    assert_eq!(cpu.read_output::<i8>("out").unwrap(), vec![0, 4, 0, 0]);
}

#[test]
fn test_reshape_recompiles_and_stales_handles() {
    init_tracing();
    let compiles = Arc::new(AtomicUsize::new(0));
    let engine = CountingEngine {
        inner: ReferenceEngine::new(),
        compiles: compiles.clone(),
    };
    let mut net = Network::with_engine(
        NetworkConfig::new(DeviceType::Graph),
        Arc::new(LayerRegistry::with_builtin().unwrap()),
        Box::new(engine),
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(9);
    let structure = conv_relu_permute();
    let resource = random_resource(&mut rng);
    net.init(&structure, &resource, &HashMap::new()).unwrap();
    assert_eq!(compiles.load(Ordering::SeqCst), 1);

    let old_in = net.get_all_input_blobs().unwrap()["image"].memory().unwrap();
    let shapes = HashMap::from([("image".to_string(), vec![2, 2, 6, 6])]);
    net.reshape(&shapes).unwrap();
    assert_eq!(compiles.load(Ordering::SeqCst), 2);
    assert!(matches!(net.blob_bytes(old_in), Err(InferError::Memory(_))));

    let outputs = net.get_all_output_blobs().unwrap();
    // H: (6 + 2 - 3) + 1 = 6, W: (6 + 1 - 3) / 2 + 1 = 3
    assert_eq!(outputs["out"].desc().dims(), &[2, 6, 3, 4]);

    // the reshaped graph still agrees with the CPU path at the new shape
    let input: Vec<f32> = (0..2 * 2 * 36).map(|_| rng.random_range(-1.0..1.0)).collect();
    net.write_input("image", &input).unwrap();
    net.forward().unwrap();
    let graph: Vec<f32> = net.read_output("out").unwrap();

    let mut cpu = Network::new(NetworkConfig::new(DeviceType::Cpu)).unwrap();
    cpu.init(&structure, &resource, &shapes).unwrap();
    cpu.write_input("image", &input).unwrap();
    cpu.forward().unwrap();
    let expected: Vec<f32> = cpu.read_output("out").unwrap();
    for (a, b) in expected.iter().zip(&graph) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_bad_reshape_keeps_compiled_graph() {
    init_tracing();
    let mut net = Network::new(NetworkConfig::new(DeviceType::Graph)).unwrap();
    let resource = random_resource(&mut StdRng::seed_from_u64(3));
    net.init(&conv_relu_permute(), &resource, &HashMap::new())
        .unwrap();
    let bad = HashMap::from([("image".to_string(), vec![1, 2, 5])]);
    assert!(matches!(net.reshape(&bad), Err(InferError::Param(_))));

    net.write_input("image", &[0.5f32; 40]).unwrap();
    net.forward().unwrap();
}

#[test]
fn test_engine_thread_config() {
    init_tracing();
    let mut config = NetworkConfig::new(DeviceType::Graph);
    config
        .engine_config
        .insert(blobrt::network::CPU_THREADS_NUM.to_string(), "0".to_string());
    assert!(matches!(Network::new(config), Err(InferError::Param(_))));

    let mut config = NetworkConfig::new(DeviceType::Graph);
    config
        .engine_config
        .insert(blobrt::network::CPU_THREADS_NUM.to_string(), "2".to_string());
    let mut net = Network::new(config).unwrap();
    let resource = random_resource(&mut StdRng::seed_from_u64(4));
    net.init(&conv_relu_permute(), &resource, &HashMap::new())
        .unwrap();
}

#[test]
fn test_generated_resources_on_graph() {
    init_tracing();
    let mut config = NetworkConfig::new(DeviceType::Graph);
    config.generate_missing_resources = true;
    config.seed = Some(77);
    let mut net = Network::new(config).unwrap();
    net.init(&conv_relu_permute(), &NetResource::new(), &HashMap::new())
        .unwrap();
    net.write_input("image", &[1.0f32; 40]).unwrap();

    let mut seen = None;
    net.forward_async(|r| seen = Some(r.is_ok())).unwrap();
    assert_eq!(seen, Some(true));
    assert!(net.read_output::<f32>("out").unwrap().iter().all(|v| *v >= 0.0));
}

#[test]
fn test_missing_resource_fails_on_graph() {
    init_tracing();
    let mut net = Network::new(NetworkConfig::new(DeviceType::Graph)).unwrap();
    let err = net
        .init(&conv_relu_permute(), &NetResource::new(), &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, InferError::Model(_)), "{:?}", err);
}

#[test]
fn test_input_exposed_as_output_on_both_devices() {
    init_tracing();
    let structure = NetStructure::new()
        .with_input("in", vec![1, 1, 2, 2])
        .with_layer(LayerInfo::new("relu", LayerParam::ReLU, &["in"], &["out"]))
        .with_output("in")
        .with_output("out");
    let input = [1.0f32, -1.0, 2.0, -2.0];

    for device in [DeviceType::Cpu, DeviceType::Graph] {
        let mut net = Network::new(NetworkConfig::new(device)).unwrap();
        net.init(&structure, &NetResource::new(), &HashMap::new())
            .unwrap();
        let outputs = net.get_all_output_blobs().unwrap();
        assert_eq!(outputs.len(), 2);

        net.write_input("in", &input).unwrap();
        net.forward().unwrap();
        assert_eq!(net.read_output::<f32>("out").unwrap(), vec![1.0, 0.0, 2.0, 0.0]);
        assert_eq!(net.read_output::<f32>("in").unwrap(), input.to_vec());
    }
}

#[test]
fn test_repeated_output_name_is_rejected() {
    init_tracing();
    let structure = NetStructure::new()
        .with_input("in", vec![1, 1, 2, 2])
        .with_layer(LayerInfo::new("relu", LayerParam::ReLU, &["in"], &["out"]))
        .with_output("out")
        .with_output("out");
    let mut net = Network::new(NetworkConfig::new(DeviceType::Graph)).unwrap();
    let err = net
        .init(&structure, &NetResource::new(), &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, InferError::Model(_)));
}
