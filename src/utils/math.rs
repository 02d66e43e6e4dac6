use rand::Rng;
use std::f32::consts::PI;

/// Box-Muller transform to generate normal distribution
pub fn normal_sample<R: Rng + ?Sized>(rng: &mut R, mean: f32, std_dev: f32) -> f32 {
    // shift into (0, 1] so ln never sees zero
    let u1 = 1.0 - rng.random::<f32>();
    let u2 = rng.random::<f32>();

    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    mean + std_dev * z
}

/// He-normal standard deviation for a given fan-in.
pub fn he_std(fan_in: usize) -> f32 {
    (2.0 / fan_in.max(1) as f32).sqrt()
}
