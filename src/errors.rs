//! Error types for the quantizer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantizationError {
    #[error("{type_name} ({bits}-bit) is not supported by the quantizer")]
    UnsupportedType { type_name: &'static str, bits: u32 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, QuantizationError>;
