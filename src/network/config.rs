use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
};

use crate::utils::error::{InferError, Result};

/// Engine key for the number of threads a compiled graph may use.
pub const CPU_THREADS_NUM: &str = "CPU_THREADS_NUM";

/// Execution backend a network targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceType {
    /// Immediate per-layer kernel dispatch.
    Cpu,
    /// Layers emit nodes into one externally compiled graph.
    Graph,
}

impl DeviceType {
    pub fn is_deferred(self) -> bool {
        matches!(self, DeviceType::Graph)
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DeviceType::Cpu => write!(f, "CPU"),
            DeviceType::Graph => write!(f, "GRAPH"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub device_type: DeviceType,
    /// Zero means "ask the host".
    pub num_threads: usize,
    /// Passed through to the graph engine untouched, apart from the thread count.
    pub engine_config: HashMap<String, String>,
    /// Give weightless resource-bearing layers random weights instead of failing.
    pub generate_missing_resources: bool,
    pub seed: Option<u64>,
}

impl NetworkConfig {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            ..Self::default()
        }
    }

    pub fn build(mut self) -> Result<Self> {
        if self.num_threads == 0 {
            self.num_threads = sys_info::cpu_num().map(|n| n as usize).unwrap_or(1).max(1);
        }

        if let Some(value) = self.engine_config.get(CPU_THREADS_NUM) {
            if !matches!(value.parse::<usize>(), Ok(n) if n > 0) {
                return Err(InferError::Param(format!(
                    "{} must be a positive integer, got '{}'",
                    CPU_THREADS_NUM, value
                )));
            }
        }

        Ok(self)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Cpu,
            num_threads: 0,
            engine_config: HashMap::new(),
            generate_missing_resources: false,
            seed: None,
        }
    }
}
