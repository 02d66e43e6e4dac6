use std::fmt::{Display, Formatter, Result as FmtResult};

/// Logical operator kind, independent of the device that runs it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerType {
    Permute,
    Convolution,
    ReLU,
}

impl LayerType {
    pub fn name(self) -> &'static str {
        match self {
            LayerType::Permute => "Permute",
            LayerType::Convolution => "Convolution",
            LayerType::ReLU => "ReLU",
        }
    }

    // Layers that cannot run without trained weights
    pub fn requires_resource(self) -> bool {
        matches!(self, LayerType::Convolution)
    }
}

impl Display for LayerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}
