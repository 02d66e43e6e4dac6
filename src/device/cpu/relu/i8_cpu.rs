pub fn i8_cpu(src: &[i8], dst: &mut [i8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = (*s).max(0);
    }
}
