use crate::{
    tensor::{TensorDesc, count},
    utils::error::{InferError, Result},
};

/// A simple single-threaded 2-D convolution for f32 NCHW tensors.
///
/// weight layout: [M, C/group, kh, kw]
/// src layout: [N, C, H, W]
/// dst layout: [N, M, OH, OW]
#[allow(clippy::too_many_arguments)]
pub fn f32_cpu(
    src_dims: &[usize],
    weight_dims: &[usize],
    dst_dims: &[usize],
    src: &[f32],
    weight: &[f32],
    bias: Option<&[f32]>,
    dst: &mut [f32],
    strides: &[usize],
    pads_begin: &[usize],
    dilations: &[usize],
    group: usize,
) -> Result<()> {
    if src_dims.len() != 4 || weight_dims.len() != 4 || dst_dims.len() != 4 {
        return Err(InferError::Model(format!(
            "conv f32_cpu: expected rank 4 dims, got src {:?} weight {:?} dst {:?}",
            src_dims, weight_dims, dst_dims
        )));
    }

    let (n, c) = (src_dims[0], src_dims[1]);
    let (in_h, in_w) = (src_dims[2] as isize, src_dims[3] as isize);
    let m = weight_dims[0];
    let (kh, kw) = (weight_dims[2], weight_dims[3]);
    let (out_h, out_w) = (dst_dims[2], dst_dims[3]);

    // Validate group configuration
    if group == 0 || !c.is_multiple_of(group) || !m.is_multiple_of(group) {
        return Err(InferError::Model(format!(
            "conv f32_cpu: unsupported group configuration: group={}, C={}, M={}",
            group, c, m
        )));
    }
    let m_per_group = m / group;
    let c_per_group = c / group;
    if weight_dims[1] != c_per_group || dst_dims[0] != n || dst_dims[1] != m {
        return Err(InferError::Model(format!(
            "conv f32_cpu: weight {:?} and dst {:?} do not match src {:?}",
            weight_dims, dst_dims, src_dims
        )));
    }

    if src.len() != count(src_dims, 0)
        || weight.len() != count(weight_dims, 0)
        || dst.len() != count(dst_dims, 0)
        || bias.is_some_and(|b| b.len() != m)
    {
        return Err(InferError::Memory(
            "conv f32_cpu: buffer lengths do not match dims".into(),
        ));
    }

    let src_strides = TensorDesc::compute_strides(src_dims);
    let dst_strides = TensorDesc::compute_strides(dst_dims);
    let weight_strides = TensorDesc::compute_strides(weight_dims);

    let (stride_h, stride_w) = (strides[0] as isize, strides[1] as isize);
    let (pad_t, pad_l) = (pads_begin[0] as isize, pads_begin[1] as isize);
    let (dil_h, dil_w) = (dilations[0] as isize, dilations[1] as isize);

    for ni in 0..n {
        for mi in 0..m {
            // channel range for this output channel's group
            let c_start = (mi / m_per_group) * c_per_group;

            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = bias.map_or(0.0, |b| b[mi]);

                    for ci in 0..c_per_group {
                        for ky in 0..kh {
                            // in_pos = out_pos*stride - pad_begin + k*dilation
                            let iy = oy as isize * stride_h - pad_t + ky as isize * dil_h;
                            if iy < 0 || iy >= in_h {
                                continue;
                            }
                            for kx in 0..kw {
                                let ix = ox as isize * stride_w - pad_l + kx as isize * dil_w;
                                if ix < 0 || ix >= in_w {
                                    continue;
                                }
                                let src_off = TensorDesc::offset(
                                    &[ni, c_start + ci, iy as usize, ix as usize],
                                    &src_strides,
                                );
                                let w_off = TensorDesc::offset(&[mi, ci, ky, kx], &weight_strides);
                                acc += src[src_off] * weight[w_off];
                            }
                        }
                    }

                    dst[TensorDesc::offset(&[ni, mi, oy, ox], &dst_strides)] = acc;
                }
            }
        }
    }
    Ok(())
}
