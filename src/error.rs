use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArborError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Out of range: {0}")]
    OutOfRange(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },
    #[error("Structural integrity violated: {0}")]
    StructuralIntegrity(String),
    #[error("Allocation failure: {0}")]
    AllocationFailure(String),
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Encoding exhausted: every delimiter candidate occurs in the payload")]
    EncodingExhausted,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, ArborError>;

// Helper conversions
impl From<config::ConfigError> for ArborError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
impl From<std::collections::TryReserveError> for ArborError {
    fn from(e: std::collections::TryReserveError) -> Self {
        Self::AllocationFailure(e.to_string())
    }
}
