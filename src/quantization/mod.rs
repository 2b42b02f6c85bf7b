pub mod range;
pub mod symmetric;

use std::fmt::Debug;

use num_traits::{AsPrimitive, Float, PrimInt, Signed};

use crate::errors::Result;

pub use range::{compute_abs_max, compute_scale, ensure_supported, is_supported_width};
pub use symmetric::SymmetricQuantizer;

/// Margin recommended for 16-bit targets. One extra bit halves the largest
/// quantized magnitude, leaving headroom for accumulation.
pub const DEFAULT_EXTRA_BITS: u32 = 1;

/// Floating-point type fed into a quantizer.
pub trait RawValue:
    Float
    + AsPrimitive<i8>
    + AsPrimitive<i16>
    + AsPrimitive<i32>
    + AsPrimitive<i64>
    + Default
    + Debug
    + Send
    + Sync
    + 'static
{
    fn from_quantized<Q: QuantizedValue>(q: Q) -> Self;

    /// Lossless conversion to f64. The product of two f32 values is exact in f64.
    fn widen(self) -> f64;
}

impl RawValue for f32 {
    fn from_quantized<Q: QuantizedValue>(q: Q) -> Self {
        AsPrimitive::<f32>::as_(q)
    }

    fn widen(self) -> f64 {
        f64::from(self)
    }
}

impl RawValue for f64 {
    fn from_quantized<Q: QuantizedValue>(q: Q) -> Self {
        AsPrimitive::<f64>::as_(q)
    }

    fn widen(self) -> f64 {
        self
    }
}

/// Fixed-width signed integer produced by a quantizer.
///
/// Implementing this trait only makes a type expressible; whether a quantizer
/// accepts it is decided by [`is_supported_width`].
pub trait QuantizedValue:
    PrimInt
    + Signed
    + AsPrimitive<f32>
    + AsPrimitive<f64>
    + Default
    + Debug
    + Send
    + Sync
    + 'static
{
    const BITS: u32;
    const NAME: &'static str;

    /// Float to integer conversion that saturates at the type bounds (NaN maps to 0).
    fn saturating_from_raw<R: RawValue>(value: R) -> Self;

    /// Widening conversion used by integer accumulators.
    fn to_accumulator(self) -> i64;
}

macro_rules! impl_quantized_value {
    ($($t:ty),*) => {
        $(
            impl QuantizedValue for $t {
                const BITS: u32 = <$t>::BITS;
                const NAME: &'static str = stringify!($t);

                fn saturating_from_raw<R: RawValue>(value: R) -> Self {
                    AsPrimitive::<$t>::as_(value)
                }

                fn to_accumulator(self) -> i64 {
                    self as i64
                }
            }
        )*
    };
}

impl_quantized_value!(i8, i16, i32, i64);

/// Element-wise transform shared by every quantization scheme.
pub trait Quantizer<R: RawValue, Q: QuantizedValue> {
    fn quantize(&self, input: &[R]) -> Result<Vec<Q>>;
    fn dequantize(&self, input: &[Q]) -> Vec<R>;

    /// Multiplier taking raw values into quantized units.
    fn scale(&self) -> R;
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantizationScheme<R: RawValue, Q: QuantizedValue> {
    Symmetric(SymmetricQuantizer<R, Q>),
}

impl<R: RawValue, Q: QuantizedValue> QuantizationScheme<R, Q> {
    pub fn symmetric_from_samples(samples: &[R], extra_bits: u32) -> Result<Self> {
        SymmetricQuantizer::from_samples(samples, extra_bits).map(QuantizationScheme::Symmetric)
    }

    pub fn symmetric_from_absolute_max(absolute_max: R, extra_bits: u32) -> Result<Self> {
        SymmetricQuantizer::from_absolute_max(absolute_max, extra_bits)
            .map(QuantizationScheme::Symmetric)
    }
}

impl<R: RawValue, Q: QuantizedValue> Quantizer<R, Q> for QuantizationScheme<R, Q> {
    fn quantize(&self, input: &[R]) -> Result<Vec<Q>> {
        match self {
            QuantizationScheme::Symmetric(q) => q.quantize(input),
        }
    }

    fn dequantize(&self, input: &[Q]) -> Vec<R> {
        match self {
            QuantizationScheme::Symmetric(q) => q.dequantize(input),
        }
    }

    fn scale(&self) -> R {
        match self {
            QuantizationScheme::Symmetric(q) => q.scale(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::QuantizationError;

    #[test]
    fn scheme_dispatches_to_symmetric() {
        let scheme = QuantizationScheme::<f32, i16>::symmetric_from_samples(&[-3.0, 1.0, 2.5], 1)
            .unwrap();
        let direct = SymmetricQuantizer::<f32, i16>::from_samples(&[-3.0, 1.0, 2.5], 1).unwrap();

        assert_eq!(scheme.scale(), direct.scale());
        assert_eq!(scheme.quantize(&[-3.0, 2.5]).unwrap(), vec![-16384, 13653]);
        assert_eq!(
            scheme.dequantize(&[-16384]),
            direct.dequantize(&[-16384])
        );
    }

    #[test]
    fn scheme_rejects_unsupported_width() {
        let err = QuantizationScheme::<f64, i32>::symmetric_from_absolute_max(1.0, 1).unwrap_err();
        assert_eq!(
            err,
            QuantizationError::UnsupportedType {
                type_name: "i32",
                bits: 32
            }
        );
    }

    #[test]
    fn saturating_conversion_clamps_to_type_bounds() {
        assert_eq!(i16::saturating_from_raw(1.0e9f32), i16::MAX);
        assert_eq!(i16::saturating_from_raw(-1.0e9f64), i16::MIN);
        assert_eq!(i8::saturating_from_raw(f32::NAN), 0);
        assert_eq!(f32::from_quantized(-16384i16), -16384.0);
    }
}
