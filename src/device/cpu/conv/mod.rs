pub mod conv;
pub mod f32_cpu;
