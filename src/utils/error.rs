use thiserror::Error;

pub type Result<T> = std::result::Result<T, InferError>;

/// Status code returned for a successful call.
pub const STATUS_OK: i32 = 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferError {
    // Malformed or missing param/resource, wrong layout, rank mismatch
    #[error("Model error: {0}")]
    Model(String),

    // Unsupported or inconsistent input shapes at reshape
    #[error("Param error: {0}")]
    Param(String),

    // No registered factory, duplicate registration
    #[error("Build error: {0}")]
    Build(String),

    // Opaque failure surfaced from a compiled graph
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Network state error: {0}")]
    State(String),

    // Stale, released or aliased memory handles
    #[error("Memory error: {0}")]
    Memory(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Model,
    Param,
    Build,
    Backend,
    State,
    Memory,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Model => 0x1000,
            ErrorKind::Param => 0x2000,
            ErrorKind::Build => 0x3000,
            ErrorKind::Backend => 0x4000,
            ErrorKind::State => 0x5000,
            ErrorKind::Memory => 0x6000,
        }
    }
}

impl InferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InferError::Model(_) => ErrorKind::Model,
            InferError::Param(_) => ErrorKind::Param,
            InferError::Build(_) => ErrorKind::Build,
            InferError::Backend(_) => ErrorKind::Backend,
            InferError::State(_) => ErrorKind::State,
            InferError::Memory(_) => ErrorKind::Memory,
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    pub fn message(&self) -> &str {
        match self {
            InferError::Model(msg)
            | InferError::Param(msg)
            | InferError::Build(msg)
            | InferError::Backend(msg)
            | InferError::State(msg)
            | InferError::Memory(msg) => msg,
        }
    }
}

/// Flatten a result into the numeric status surface, `STATUS_OK` on success.
pub fn status_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.code(),
    }
}
