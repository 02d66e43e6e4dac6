pub mod blob_manager;
pub mod config;
pub mod default_network;
pub mod graph_network;
#[allow(clippy::module_inception)]
pub mod network;

pub use blob_manager::BlobManager;
pub use config::{CPU_THREADS_NUM, DeviceType, NetworkConfig};
pub use default_network::DefaultNetwork;
pub use graph_network::GraphNetwork;
pub use network::{Network, NetworkBackend, NetworkState};
