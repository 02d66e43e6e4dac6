use rand::Rng;

use crate::{
    model::{
        layer_param::{ConvLayerParam, LayerParam},
        layer_resource::{ConvLayerResource, LayerResource, RawBuffer},
    },
    utils::math::{he_std, normal_sample},
};

/// Random weights shaped for `param`, or `None` for layers that take no resource.
///
/// Used to run a network whose structure is known but whose weights are not.
pub fn generate_resource<R: Rng + ?Sized>(param: &LayerParam, rng: &mut R) -> Option<LayerResource> {
    match param {
        LayerParam::Convolution(conv) => Some(LayerResource::Convolution(conv_resource(conv, rng))),
        LayerParam::Permute(_) | LayerParam::ReLU => None,
    }
}

fn conv_resource<R: Rng + ?Sized>(param: &ConvLayerParam, rng: &mut R) -> ConvLayerResource {
    let dims = param.filter_dims();
    let fan_in: usize = dims[1..].iter().product();
    let std_dev = he_std(fan_in);

    let filter: Vec<f32> = (0..param.filter_count())
        .map(|_| normal_sample(rng, 0.0, std_dev))
        .collect();

    let bias = param.bias.then(|| {
        RawBuffer::from_f32(
            vec![param.output_channel],
            &vec![0.0; param.output_channel],
        )
    });

    ConvLayerResource {
        filter: RawBuffer::from_f32(dims, &filter),
        bias,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layer_resource::check_conv_resource;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn generated_conv_resource_matches_param() {
        let mut rng = StdRng::seed_from_u64(7);
        let param = ConvLayerParam::new(4, 8, [3, 3]).with_group(2).with_bias(true);
        let res = generate_resource(&LayerParam::Convolution(param.clone()), &mut rng).unwrap();
        let conv = res.as_conv().unwrap();

        assert_eq!(conv.filter.dims(), &[8, 2, 3, 3]);
        check_conv_resource(&param, conv).unwrap();
        assert!(conv.filter.to_f32().unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn weightless_layers_get_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(generate_resource(&LayerParam::ReLU, &mut rng).is_none());
    }
}
