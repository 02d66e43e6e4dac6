pub mod cpu;
pub mod graph;
