/// Element-wise max(0, x); `dst` must be as long as `src`.
pub fn f32_cpu(src: &[f32], dst: &mut [f32]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = s.max(0.0);
    }
}
