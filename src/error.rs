use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ARGS_WRONG {0}")]
    ArgsWrong(&'static str),
    #[error("CONFLICT commit lost the race on a watched key")]
    Conflict,
    #[error("UNSUPPORTED {0}")]
    Unsupported(&'static str),
    #[error("CORRUPTION {0}")]
    Corruption(&'static str),
    #[error("IO {0}")]
    Io(#[from] io::Error),
    #[error("OUT_OF_MEMORY allocation of {0} bytes failed")]
    OutOfMemory(usize),
}

impl StoreError {
    /// First word of the rendered message; stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::ArgsWrong(_) => "ARGS_WRONG",
            StoreError::Conflict => "CONFLICT",
            StoreError::Unsupported(_) => "UNSUPPORTED",
            StoreError::Corruption(_) => "CORRUPTION",
            StoreError::Io(_) => "IO",
            StoreError::OutOfMemory(_) => "OUT_OF_MEMORY",
        }
    }
}
