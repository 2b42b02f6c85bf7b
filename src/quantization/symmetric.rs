use std::marker::PhantomData;

use tracing::debug;

use super::range::{compute_abs_max, compute_scale, ensure_supported};
use super::{QuantizedValue, Quantizer, RawValue};
use crate::errors::{QuantizationError, Result};

/// Linear quantization centered at zero with a single scale for both signs.
///
/// `extra_bits` widens the assumed range to `absolute_max * 2^extra_bits` so
/// that sums of quantized values stay inside `Q` during accumulation. Higher
/// values cost precision. For 16-bit output 1 or 2 is usually enough.
///
/// Quantized values saturate at `±Q::MAX`, so every output has a representable
/// negation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricQuantizer<R: RawValue, Q: QuantizedValue> {
    scale: R,
    absolute_max: R,
    extra_bits: u32,
    _quantized: PhantomData<Q>,
}

impl<R: RawValue, Q: QuantizedValue> SymmetricQuantizer<R, Q> {
    /// Builds a quantizer whose range is the absolute max of `samples`.
    pub fn from_samples(samples: &[R], extra_bits: u32) -> Result<Self> {
        ensure_supported::<Q>()?;
        let absolute_max = compute_abs_max(samples)?;
        Self::from_absolute_max(absolute_max, extra_bits)
    }

    /// Builds a quantizer for a known (or imposed) bound on `|x|`.
    pub fn from_absolute_max(absolute_max: R, extra_bits: u32) -> Result<Self> {
        ensure_supported::<Q>()?;
        let scale = compute_scale(absolute_max, extra_bits, Q::BITS)?;
        Ok(SymmetricQuantizer {
            scale,
            absolute_max,
            extra_bits,
            _quantized: PhantomData,
        })
    }

    pub fn scale(&self) -> R {
        self.scale
    }

    /// Width of one quantization step in raw units.
    pub fn step(&self) -> R {
        self.scale.recip()
    }

    pub fn absolute_max(&self) -> R {
        self.absolute_max
    }

    pub fn extra_bits(&self) -> u32 {
        self.extra_bits
    }

    /// True when built from an all-zero range and the sentinel scale is in use.
    pub fn is_degenerate(&self) -> bool {
        self.absolute_max == R::zero()
    }

    pub fn quantize(&self, input: &[R]) -> Result<Vec<Q>> {
        let mut output = Vec::with_capacity(input.len());
        self.quantize_into(input, &mut output)?;
        Ok(output)
    }

    /// Replaces the contents of `output` with the quantized `input`.
    /// `output` is left untouched if `input` holds a non-finite value.
    pub fn quantize_into(&self, input: &[R], output: &mut Vec<Q>) -> Result<()> {
        if let Some(index) = input.iter().position(|x| !x.is_finite()) {
            return Err(QuantizationError::InvalidArgument(format!(
                "cannot quantize non-finite value {:?} at index {index}",
                input[index]
            )));
        }

        let mut saturated = 0usize;
        output.clear();
        output.extend(input.iter().map(|&x| {
            let (q, clamped) = self.quantize_finite(x);
            saturated += usize::from(clamped);
            q
        }));

        if saturated > 0 {
            debug!(saturated, len = input.len(), "quantized values saturated");
        }
        Ok(())
    }

    pub fn quantize_value(&self, value: R) -> Result<Q> {
        if !value.is_finite() {
            return Err(QuantizationError::InvalidArgument(format!(
                "cannot quantize non-finite value {value:?}"
            )));
        }
        Ok(self.quantize_finite(value).0)
    }

    /// Rounds half away from zero, then saturates at `±Q::MAX`.
    ///
    /// The product is formed in f64 so f32 input rounds on the exact value of
    /// `value * scale`, not on an already rounded f32 product.
    fn quantize_finite(&self, value: R) -> (Q, bool) {
        let limit = Q::max_value();
        let rounded = (value.widen() * self.scale.widen()).round();
        // saturating_from_raw already caps the positive side at Q::MAX
        let q = Q::saturating_from_raw(rounded);

        if q < -limit {
            (-limit, true)
        } else {
            (q, rounded.abs() > f64::from_quantized(limit))
        }
    }

    pub fn dequantize(&self, input: &[Q]) -> Vec<R> {
        input.iter().map(|&q| self.dequantize_value(q)).collect()
    }

    /// Replaces the contents of `output` with the dequantized `input`.
    pub fn dequantize_into(&self, input: &[Q], output: &mut Vec<R>) {
        output.clear();
        output.extend(input.iter().map(|&q| self.dequantize_value(q)));
    }

    pub fn dequantize_value(&self, value: Q) -> R {
        R::from_quantized(value) / self.scale
    }
}

impl<R: RawValue, Q: QuantizedValue> Quantizer<R, Q> for SymmetricQuantizer<R, Q> {
    fn quantize(&self, input: &[R]) -> Result<Vec<Q>> {
        SymmetricQuantizer::quantize(self, input)
    }

    fn dequantize(&self, input: &[Q]) -> Vec<R> {
        SymmetricQuantizer::dequantize(self, input)
    }

    fn scale(&self) -> R {
        self.scale
    }
}
