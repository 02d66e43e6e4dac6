pub mod blob;
pub mod desc;
pub mod memory;

pub use blob::{Blob, BlobHandle, BlobMap, ForeignTensor};
pub use desc::{DataFormat, DataType, NCHW_RANK, TensorDesc, count};
pub use memory::{MemoryHandle, MemoryPool};
