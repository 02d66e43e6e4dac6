use crate::{
    tensor::{TensorDesc, count},
    utils::error::{InferError, Result},
};

/// Reorder the axes of a dense row-major tensor.
///
/// Output axis `i` reads input axis `orders[i]`. Elements are moved as opaque
/// `elem_size`-byte chunks, so one routine serves every element type.
pub fn naive_permute(
    elem_size: usize,
    input: &[u8],
    input_dims: &[usize],
    output: &mut [u8],
    output_dims: &[usize],
    orders: &[usize],
) -> Result<()> {
    let rank = input_dims.len();
    if elem_size == 0 {
        return Err(InferError::Model("permute element size is zero".into()));
    }
    if output_dims.len() != rank || orders.len() != rank {
        return Err(InferError::Model(format!(
            "permute rank mismatch: input {:?}, output {:?}, orders {:?}",
            input_dims, output_dims, orders
        )));
    }
    for (axis, &src_axis) in orders.iter().enumerate() {
        if input_dims.get(src_axis) != Some(&output_dims[axis]) {
            return Err(InferError::Model(format!(
                "permute output {:?} is not input {:?} reordered by {:?}",
                output_dims, input_dims, orders
            )));
        }
    }

    let output_count = count(output_dims, 0);
    if input.len() != count(input_dims, 0) * elem_size || output.len() != output_count * elem_size {
        return Err(InferError::Memory(format!(
            "permute buffers of {} and {} bytes do not fit dims {:?} -> {:?}",
            input.len(),
            output.len(),
            input_dims,
            output_dims
        )));
    }

    let input_step = TensorDesc::compute_strides(input_dims);
    let output_step = TensorDesc::compute_strides(output_dims);

    for (i, dst) in output.chunks_exact_mut(elem_size).enumerate() {
        let mut rem = i;
        let mut src = 0;
        for axis in 0..rank {
            let coord = rem / output_step[axis];
            rem %= output_step[axis];
            src += coord * input_step[orders[axis]];
        }
        let at = src * elem_size;
        dst.copy_from_slice(&input[at..at + elem_size]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permute_f32(input: &[f32], dims: &[usize], orders: &[usize]) -> (Vec<f32>, Vec<usize>) {
        let out_dims: Vec<usize> = orders.iter().map(|&o| dims[o]).collect();
        let mut out = vec![0f32; input.len()];
        naive_permute(
            4,
            bytemuck::cast_slice(input),
            dims,
            bytemuck::cast_slice_mut(&mut out),
            &out_dims,
            orders,
        )
        .unwrap();
        (out, out_dims)
    }

    #[test]
    fn swaps_last_two_axes() {
        let dims = [1, 2, 3, 4];
        let input: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let (out, out_dims) = permute_f32(&input, &dims, &[0, 1, 3, 2]);
        assert_eq!(out_dims, vec![1, 2, 4, 3]);

        let in_strides = TensorDesc::compute_strides(&dims);
        let out_strides = TensorDesc::compute_strides(&out_dims);
        for c in 0..2 {
            for h in 0..3 {
                for w in 0..4 {
                    let src = TensorDesc::offset(&[0, c, h, w], &in_strides);
                    let dst = TensorDesc::offset(&[0, c, w, h], &out_strides);
                    assert_eq!(out[dst], input[src]);
                }
            }
        }
    }

    #[test]
    fn identity_order_copies() {
        let input: Vec<f32> = (0..6).map(|v| v as f32 * 0.5).collect();
        let (out, _) = permute_f32(&input, &[1, 1, 2, 3], &[0, 1, 2, 3]);
        assert_eq!(out, input);
    }

    #[test]
    fn int8_moves_single_bytes() {
        let dims = [1, 1, 2, 3];
        let input: Vec<i8> = vec![-3, -2, -1, 0, 1, 2];
        let mut out = vec![0i8; 6];
        naive_permute(
            1,
            bytemuck::cast_slice(&input),
            &dims,
            bytemuck::cast_slice_mut(&mut out),
            &[1, 1, 3, 2],
            &[0, 1, 3, 2],
        )
        .unwrap();
        assert_eq!(out, vec![-3, 0, -2, 1, -1, 2]);
    }

    #[test]
    fn mismatched_output_dims_are_rejected() {
        let input = [0u8; 24];
        let mut out = [0u8; 24];
        let err = naive_permute(1, &input, &[1, 2, 3, 4], &mut out, &[1, 2, 3, 4], &[0, 1, 3, 2]);
        assert!(matches!(err, Err(InferError::Model(_))));
    }
}
