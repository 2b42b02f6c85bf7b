use std::ops::Range;

use rand::distr::uniform::SampleUniform;
use rand::Rng;

use crate::errors::{QuantizationError, Result};
use crate::quantization::{compute_abs_max, QuantizedValue, Quantizer, RawValue};

/// Dense row-major matrix.
#[derive(PartialEq, Debug, Clone)]
pub struct Matrix<T> {
    pub data: Vec<T>,
    pub rows: usize,
    pub cols: usize,
}

impl<T> Matrix<T>
where
    T: Copy + Default,
{
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::default(); rows * cols],
            rows,
            cols,
        }
    }

    pub fn transpose(&self) -> Self {
        let mut transposed = Matrix::new(self.cols, self.rows);

        for i in 0..self.rows {
            for j in 0..self.cols {
                transposed.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }

        transposed
    }

    fn check_product_shape<U>(&self, other: &Matrix<U>) -> Result<()> {
        if self.cols != other.rows {
            return Err(QuantizationError::DimensionMismatch {
                expected: self.cols,
                actual: other.rows,
            });
        }
        Ok(())
    }
}

impl<R: RawValue> Matrix<R> {
    pub fn random_square(dimension: usize, range: Range<R>) -> Self
    where
        R: SampleUniform,
    {
        let size = dimension * dimension;
        let mut rng = rand::rng();
        let data = (0..size)
            .map(|_| rng.random_range(range.clone()))
            .collect();

        Matrix {
            data,
            rows: dimension,
            cols: dimension,
        }
    }

    pub fn abs_max(&self) -> Result<R> {
        compute_abs_max(&self.data)
    }

    /// Quantize every entry, keeping the shape.
    pub fn quantize<Q: QuantizedValue>(&self, quantizer: &impl Quantizer<R, Q>) -> Result<Matrix<Q>> {
        Ok(Matrix {
            data: quantizer.quantize(&self.data)?,
            rows: self.rows,
            cols: self.cols,
        })
    }

    /// Reference floating-point product.
    pub fn multiply(&self, other: &Self) -> Result<Self> {
        self.check_product_shape(other)?;

        let mut result = Matrix::new(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let lhs = self.data[i * self.cols + k];
                for j in 0..other.cols {
                    let out = &mut result.data[i * other.cols + j];
                    *out = *out + lhs * other.data[k * other.cols + j];
                }
            }
        }

        Ok(result)
    }
}

impl<Q: QuantizedValue> Matrix<Q> {
    pub fn dequantize<R: RawValue>(&self, quantizer: &impl Quantizer<R, Q>) -> Matrix<R> {
        Matrix {
            data: quantizer.dequantize(&self.data),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Multiply quantized matrices, returning the raw i64 accumulators.
    ///
    /// Symmetric quantization has no zero point, so no offset correction is
    /// needed: `lhs * rhs` in quantized units is `scale_lhs * scale_rhs` times
    /// the real product. See [`Matrix::rescale`].
    pub fn qmultiply(&self, other: &Self) -> Result<Matrix<i64>> {
        self.check_product_shape(other)?;

        // column-major copy of rhs so each dot product walks contiguous memory
        let rhs = other.transpose();
        let mut accumulators = Vec::with_capacity(self.rows * other.cols);

        for i in 0..self.rows {
            let lhs_row = &self.data[i * self.cols..(i + 1) * self.cols];
            for j in 0..other.cols {
                let rhs_col = &rhs.data[j * other.rows..(j + 1) * other.rows];
                let accumulator: i64 = lhs_row
                    .iter()
                    .zip(rhs_col)
                    .map(|(&a, &b)| a.to_accumulator() * b.to_accumulator())
                    .sum();
                accumulators.push(accumulator);
            }
        }

        Ok(Matrix {
            data: accumulators,
            rows: self.rows,
            cols: other.cols,
        })
    }
}

impl Matrix<i64> {
    /// Map accumulated quantized products back to raw space:
    /// `sum_of_products / (lhs_scale * rhs_scale)`.
    pub fn rescale<R: RawValue>(&self, lhs_scale: R, rhs_scale: R) -> Matrix<R> {
        let denominator = lhs_scale * rhs_scale;
        Matrix {
            data: self
                .data
                .iter()
                .map(|&acc| R::from_quantized(acc) / denominator)
                .collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantization::SymmetricQuantizer;

    #[test]
    fn transpose_rectangular() {
        let m = Matrix {
            data: vec![1, 2, 3, 4, 5, 6],
            rows: 2,
            cols: 3,
        };
        let expected = Matrix {
            data: vec![1, 4, 2, 5, 3, 6],
            rows: 3,
            cols: 2,
        };
        assert_eq!(expected, m.transpose());
    }

    #[test]
    fn quantize_keeps_shape() {
        let m: Matrix<f32> = Matrix {
            data: vec![1., -2., 3., -4., 5., -6.],
            rows: 3,
            cols: 2,
        };
        let quantizer = SymmetricQuantizer::<f32, i16>::from_samples(&m.data, 1).unwrap();
        let q = m.quantize(&quantizer).unwrap();

        assert_eq!(q.rows, 3);
        assert_eq!(q.cols, 2);
        assert_eq!(q.data[5], -16384);
        assert_eq!(m.abs_max().unwrap(), 6.0);
    }

    #[test]
    fn quantize_propagates_nan() {
        let m: Matrix<f32> = Matrix {
            data: vec![1., f32::NAN],
            rows: 1,
            cols: 2,
        };
        let quantizer = SymmetricQuantizer::<f32, i16>::from_absolute_max(1.0, 1).unwrap();
        assert!(matches!(
            m.quantize(&quantizer),
            Err(QuantizationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn float_multiply() {
        let lhs: Matrix<f64> = Matrix {
            data: vec![1., 2., 3., 4., 5., 6.],
            rows: 2,
            cols: 3,
        };
        let rhs: Matrix<f64> = Matrix {
            data: vec![7., 8., 9., 10., 11., 12.],
            rows: 3,
            cols: 2,
        };
        let expected = Matrix {
            data: vec![58., 64., 139., 154.],
            rows: 2,
            cols: 2,
        };
        assert_eq!(expected, lhs.multiply(&rhs).unwrap());
    }

    #[test]
    fn qmultiply_matches_integer_product() {
        let lhs: Matrix<i16> = Matrix {
            data: vec![1, -2, 3, 4, 5, -6],
            rows: 2,
            cols: 3,
        };
        let rhs: Matrix<i16> = Matrix {
            data: vec![7, 8, 9, 10, 11, 12],
            rows: 3,
            cols: 2,
        };
        let expected = Matrix {
            data: vec![22, 24, 7, 10],
            rows: 2,
            cols: 2,
        };
        assert_eq!(expected, lhs.qmultiply(&rhs).unwrap());
    }

    #[test]
    fn product_shape_mismatch() {
        let lhs = Matrix::<i16>::new(2, 3);
        let rhs = Matrix::<i16>::new(2, 3);
        assert_eq!(
            lhs.qmultiply(&rhs),
            Err(QuantizationError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
        assert!(Matrix::<f32>::new(2, 3).multiply(&Matrix::new(4, 1)).is_err());
    }

    #[test]
    fn rescaled_product_approximates_float_product() {
        let lhs = Matrix::<f32>::random_square(16, -1.0..1.0);
        let rhs = Matrix::<f32>::random_square(16, -1.0..1.0);

        let lhs_quantizer = SymmetricQuantizer::<f32, i16>::from_samples(&lhs.data, 1).unwrap();
        let rhs_quantizer = SymmetricQuantizer::<f32, i16>::from_samples(&rhs.data, 1).unwrap();

        let expected = lhs.multiply(&rhs).unwrap();
        let approx = lhs
            .quantize(&lhs_quantizer)
            .unwrap()
            .qmultiply(&rhs.quantize(&rhs_quantizer).unwrap())
            .unwrap()
            .rescale(lhs_quantizer.scale(), rhs_quantizer.scale());

        for (e, a) in expected.data.iter().zip(&approx.data) {
            assert!((e - a).abs() < 1e-2, "{e} vs {a}");
        }
    }

    #[test]
    fn dequantize_restores_values() {
        let quantizer = SymmetricQuantizer::<f64, i16>::from_absolute_max(2.0, 1).unwrap();
        let q = Matrix {
            data: vec![-16384i16, 8192, 0, 16384],
            rows: 2,
            cols: 2,
        };
        let expected = Matrix {
            data: vec![-2.0, 1.0, 0.0, 2.0],
            rows: 2,
            cols: 2,
        };
        assert_eq!(expected, q.dequantize(&quantizer));
    }
}
