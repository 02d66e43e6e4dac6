pub mod f32_cpu;
pub mod i8_cpu;
pub mod relu;
