pub mod naive_cpu;
pub mod permute;
