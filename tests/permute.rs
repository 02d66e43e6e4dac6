// Permute tests: the byte kernel over every rank-4 order, and through a CPU network

use std::collections::HashMap;

use blobrt::device::cpu::permute::naive_cpu::naive_permute;
use blobrt::{
    DeviceType, LayerInfo, LayerParam, NetResource, NetStructure, Network, NetworkConfig,
    PermuteLayerParam, TensorDesc,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn all_orders() -> Vec<Vec<usize>> {
    let mut orders = Vec::new();
    for a in 0..4 {
        for b in 0..4 {
            for c in 0..4 {
                for d in 0..4 {
                    let o = vec![a, b, c, d];
                    let mut seen = [false; 4];
                    o.iter().for_each(|&x| seen[x] = true);
                    if seen.iter().all(|&s| s) {
                        orders.push(o);
                    }
                }
            }
        }
    }
    orders
}

fn permute_bytes(elem: usize, input: &[u8], dims: &[usize], order: &[usize]) -> (Vec<u8>, Vec<usize>) {
    let out_dims: Vec<usize> = order.iter().map(|&o| dims[o]).collect();
    let mut out = vec![0u8; input.len()];
    naive_permute(elem, input, dims, &mut out, &out_dims, order).unwrap();
    (out, out_dims)
}

#[test]
fn test_all_24_orders() {
    assert_eq!(all_orders().len(), 24);
}

#[test]
fn test_round_trip_f32_every_order() {
    let mut rng = StdRng::seed_from_u64(42);
    let dims = [2, 3, 4, 5];
    let data: Vec<f32> = (0..120).map(|_| rng.random_range(-10.0..10.0)).collect();
    let bytes: &[u8] = bytemuck::cast_slice(&data);

    for order in all_orders() {
        let inverse = PermuteLayerParam::new(order.clone()).inverse().orders;
        let (forward, out_dims) = permute_bytes(4, bytes, &dims, &order);
        let (back, back_dims) = permute_bytes(4, &forward, &out_dims, &inverse);
        assert_eq!(back_dims, dims.to_vec());
        assert_eq!(back, bytes, "order {:?} did not round trip", order);
    }
}

#[test]
fn test_round_trip_int8_every_order() {
    let mut rng = StdRng::seed_from_u64(7);
    let dims = [3, 1, 2, 4];
    let data: Vec<i8> = (0..24).map(|_| rng.random()).collect();
    let bytes: &[u8] = bytemuck::cast_slice(&data);

    for order in all_orders() {
        let inverse = PermuteLayerParam::new(order.clone()).inverse().orders;
        let (forward, out_dims) = permute_bytes(1, bytes, &dims, &order);
        let (back, _) = permute_bytes(1, &forward, &out_dims, &inverse);
        assert_eq!(back, bytes, "order {:?} did not round trip", order);
    }
}

#[test]
fn test_output_reads_input_through_order() {
    let mut rng = StdRng::seed_from_u64(3);
    let dims = [2, 3, 2, 3];
    let data: Vec<f32> = (0..36).map(|_| rng.random()).collect();
    let in_strides = TensorDesc::compute_strides(&dims);

    for order in all_orders() {
        let (out_bytes, out_dims) = permute_bytes(4, bytemuck::cast_slice(&data), &dims, &order);
        let out: Vec<f32> = bytemuck::pod_collect_to_vec(&out_bytes);
        for (i, v) in out.iter().enumerate() {
            let coords = TensorDesc::unravel(i, &out_dims);
            let mut src = [0usize; 4];
            for axis in 0..4 {
                src[order[axis]] = coords[axis];
            }
            assert_eq!(*v, data[TensorDesc::offset(&src, &in_strides)]);
        }
    }
}

#[test]
fn test_single_permute_network_scenario() {
    init_tracing();
    let structure = NetStructure::new()
        .with_input("in", vec![1, 2, 3, 4])
        .with_layer(LayerInfo::new(
            "permute",
            LayerParam::Permute(PermuteLayerParam::new(vec![0, 1, 3, 2])),
            &["in"],
            &["out"],
        ));
    let mut net = Network::new(NetworkConfig::new(DeviceType::Cpu)).unwrap();
    net.init(&structure, &NetResource::new(), &HashMap::new())
        .unwrap();

    let outputs = net.get_all_output_blobs().unwrap();
    assert_eq!(outputs["out"].desc().dims(), &[1, 2, 4, 3]);

    let input: Vec<f32> = (0..24).map(|v| v as f32).collect();
    net.write_input("in", &input).unwrap();
    net.forward().unwrap();
    let out: Vec<f32> = net.read_output("out").unwrap();

    let in_strides = TensorDesc::compute_strides(&[1, 2, 3, 4]);
    let out_strides = TensorDesc::compute_strides(&[1, 2, 4, 3]);
    for c in 0..2 {
        for h in 0..3 {
            for w in 0..4 {
                assert_eq!(
                    out[TensorDesc::offset(&[0, c, w, h], &out_strides)],
                    input[TensorDesc::offset(&[0, c, h, w], &in_strides)]
                );
            }
        }
    }
}

#[test]
fn test_int8_network_round_trip() {
    init_tracing();
    let order = vec![2, 0, 3, 1];
    let inverse = PermuteLayerParam::new(order.clone()).inverse();
    let structure = NetStructure::new()
        .with_typed_input("in", vec![1, 2, 3, 4], blobrt::DataType::Int8)
        .with_layer(LayerInfo::new(
            "p",
            LayerParam::Permute(PermuteLayerParam::new(order)),
            &["in"],
            &["mid"],
        ))
        .with_layer(LayerInfo::new(
            "p_inv",
            LayerParam::Permute(inverse),
            &["mid"],
            &["out"],
        ));
    let mut net = Network::new(NetworkConfig::new(DeviceType::Cpu)).unwrap();
    net.init(&structure, &NetResource::new(), &HashMap::new())
        .unwrap();

    let input: Vec<i8> = (0..24).map(|v| v as i8 - 12).collect();
    net.write_input("in", &input).unwrap();
    net.forward().unwrap();
    assert_eq!(net.read_output::<i8>("out").unwrap(), input);
}
