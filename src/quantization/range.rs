//! Scale derivation: absolute-max scan and the range-to-scale mapping.

use tracing::debug;

use super::{QuantizedValue, RawValue};
use crate::errors::{QuantizationError, Result};

/// Integer widths the scale calculation is implemented for.
const SUPPORTED_WIDTHS: &[u32] = &[16];

pub fn is_supported_width(bits: u32) -> bool {
    SUPPORTED_WIDTHS.contains(&bits)
}

/// Capability check run before any quantizer arithmetic.
pub fn ensure_supported<Q: QuantizedValue>() -> Result<()> {
    if is_supported_width(Q::BITS) {
        Ok(())
    } else {
        Err(QuantizationError::UnsupportedType {
            type_name: Q::NAME,
            bits: Q::BITS,
        })
    }
}

/// Largest absolute value in `buffer`.
///
/// Returns zero for an all-zero buffer, which callers treat as "no dynamic range".
pub fn compute_abs_max<R: RawValue>(buffer: &[R]) -> Result<R> {
    let (first, rest) = buffer.split_first().ok_or_else(|| {
        QuantizationError::InvalidArgument("cannot compute the range of an empty buffer".into())
    })?;

    let mut abs_max = checked_abs(*first, 0)?;
    for (i, &value) in rest.iter().enumerate() {
        abs_max = abs_max.max(checked_abs(value, i + 1)?);
    }

    Ok(abs_max)
}

fn checked_abs<R: RawValue>(value: R, index: usize) -> Result<R> {
    if value.is_finite() {
        Ok(value.abs())
    } else {
        Err(QuantizationError::InvalidArgument(format!(
            "non-finite value {value:?} at index {index}"
        )))
    }
}

/// Maps `absolute_max`, widened by `2^extra_bits`, onto the positive edge of a
/// `quantized_bits`-wide signed integer: `scale = 2^(bits-1) / (absolute_max * 2^extra_bits)`.
///
/// A zero range yields the sentinel scale `1`, so all-zero data stays zero in
/// both directions.
pub fn compute_scale<R: RawValue>(absolute_max: R, extra_bits: u32, quantized_bits: u32) -> Result<R> {
    if !is_supported_width(quantized_bits) {
        return Err(QuantizationError::UnsupportedType {
            type_name: "signed integer",
            bits: quantized_bits,
        });
    }

    if !absolute_max.is_finite() || absolute_max < R::zero() {
        return Err(QuantizationError::InvalidArgument(format!(
            "absolute max must be finite and non-negative, got {absolute_max:?}"
        )));
    }

    // checked before widening: 0 * 2^extra_bits is NaN once 2^extra_bits overflows
    if absolute_max == R::zero() {
        debug!(extra_bits, "zero dynamic range, using sentinel scale 1");
        return Ok(R::one());
    }

    let extra_bits_exp = i32::try_from(extra_bits).map_err(|_| {
        QuantizationError::InvalidArgument(format!("extra bits {extra_bits} out of range"))
    })?;
    let two = R::one() + R::one();
    let effective_range = absolute_max * two.powi(extra_bits_exp);

    // quantized_bits is a supported width here, so the exponent fits in i32
    let scale = two.powi(quantized_bits as i32 - 1) / effective_range;
    if !scale.is_finite() || scale <= R::zero() {
        return Err(QuantizationError::InvalidArgument(format!(
            "range {absolute_max:?} with {extra_bits} extra bits has no representable scale"
        )));
    }

    debug!(?absolute_max, extra_bits, quantized_bits, ?scale, "computed quantization scale");
    Ok(scale)
}
