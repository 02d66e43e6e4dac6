pub mod layer_param;
pub mod layer_resource;
pub mod layer_type;
pub mod net_structure;
pub mod resource_generator;

pub use layer_param::{ConvLayerParam, LayerParam, PadType, PermuteLayerParam};
pub use layer_resource::{ConvLayerResource, LayerResource, RawBuffer, check_conv_resource};
pub use layer_type::LayerType;
pub use net_structure::{InputShapesMap, LayerInfo, NetResource, NetStructure};
pub use resource_generator::generate_resource;
