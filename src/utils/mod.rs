pub mod auto_pads_calc;
pub mod error;
pub mod math;

pub use error::{ErrorKind, InferError, Result, STATUS_OK, status_code};
