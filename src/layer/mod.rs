pub mod layer_acc;
pub mod registry;

pub use layer_acc::{Context, LayerAcc};
pub use registry::{LayerAccFactory, LayerRegistry};
