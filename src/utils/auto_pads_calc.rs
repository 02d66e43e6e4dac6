use crate::model::layer_param::PadType;

/// Compute pads_begin and pads_end for the spatial axes of an NCHW input.
///
/// `pads` is laid out `[top, bottom, left, right]` and is only consulted for
/// `PadType::Explicit`. `spatial_dims` are the input `[H, W]`.
pub fn calc_begin_and_end_pads(
    pad_type: PadType,
    pads: &[usize],
    kernel_shape: &[usize],
    strides: &[usize],
    dilations: &[usize],
    spatial_dims: &[usize],
) -> (Vec<usize>, Vec<usize>) {
    let spatial_rank = spatial_dims.len();

    let mut pads_begin: Vec<usize> = vec![0; spatial_rank];
    let mut pads_end: Vec<usize> = vec![0; spatial_rank];

    match pad_type {
        PadType::Explicit => {
            for i in 0..spatial_rank {
                pads_begin[i] = pads.get(i * 2).copied().unwrap_or(0);
                pads_end[i] = pads.get(i * 2 + 1).copied().unwrap_or(0);
            }
        }
        PadType::Valid => {}
        PadType::SameUpper | PadType::SameLower => {
            for i in 0..spatial_rank {
                let in_i = spatial_dims[i] as i64;
                let k = kernel_shape.get(i).copied().unwrap_or(1) as i64;
                let s = strides.get(i).copied().unwrap_or(1).max(1) as i64;
                let d = dilations.get(i).copied().unwrap_or(1) as i64;

                let out = (in_i + s - 1) / s; // ceil
                let pad_needed = ((out - 1) * s + d * (k - 1) + 1) - in_i;
                let pad_needed = pad_needed.max(0) as usize;
                if pad_type == PadType::SameUpper {
                    pads_begin[i] = pad_needed / 2;
                    pads_end[i] = pad_needed - pads_begin[i];
                } else {
                    pads_end[i] = pad_needed / 2;
                    pads_begin[i] = pad_needed - pads_end[i];
                }
            }
        }
    }

    (pads_begin, pads_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_pads_are_split_per_axis() {
        let (b, e) =
            calc_begin_and_end_pads(PadType::Explicit, &[1, 2, 3, 4], &[3, 3], &[1, 1], &[1, 1], &[8, 8]);
        assert_eq!(b, vec![1, 3]);
        assert_eq!(e, vec![2, 4]);
    }

    #[test]
    fn same_upper_puts_extra_pad_at_end() {
        // in=4, k=2, s=1 -> need 1 pad
        let (b, e) = calc_begin_and_end_pads(PadType::SameUpper, &[], &[2, 2], &[1, 1], &[1, 1], &[4, 4]);
        assert_eq!(b, vec![0, 0]);
        assert_eq!(e, vec![1, 1]);

        let (b, e) = calc_begin_and_end_pads(PadType::SameLower, &[], &[2, 2], &[1, 1], &[1, 1], &[4, 4]);
        assert_eq!(b, vec![1, 1]);
        assert_eq!(e, vec![0, 0]);
    }

    #[test]
    fn valid_has_no_padding() {
        let (b, e) = calc_begin_and_end_pads(PadType::Valid, &[5, 5, 5, 5], &[3, 3], &[2, 2], &[1, 1], &[9, 9]);
        assert_eq!(b, vec![0, 0]);
        assert_eq!(e, vec![0, 0]);
    }
}
