pub mod errors;
pub mod matrices;
pub mod quantization;

pub use errors::{QuantizationError, Result};
pub use quantization::{
    QuantizationScheme, QuantizedValue, Quantizer, RawValue, SymmetricQuantizer,
    DEFAULT_EXTRA_BITS,
};
