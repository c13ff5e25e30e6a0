use std::fmt::Debug;
use std::ops::{AddAssign, DivAssign, MulAssign, Neg, SubAssign};

use ndarray::{Array2, ArrayView2, LinalgScalar, ScalarOperand};
use num_complex::Complex64;

use crate::Matrix;
use crate::signal::Element;

/// Scalar type decompositions are computed in: `f64` or `Complex64`.
pub trait Field:
    Element
    + LinalgScalar
    + ScalarOperand
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + PartialEq
    + Debug
{
    const IS_COMPLEX: bool;

    fn from_real(value: f64) -> Self;

    fn conj(self) -> Self;

    /// Squared modulus.
    fn abs_sqr(self) -> f64;

    fn modulus(self) -> f64 {
        self.abs_sqr().sqrt()
    }

    fn re(self) -> f64;

    fn im(self) -> f64;

    /// Multiplies by a real factor.
    fn scale(self, factor: f64) -> Self;

    fn finite(self) -> bool;

    /// Real copy of the matrix, `None` for complex fields.
    fn to_real_matrix(matrix: ArrayView2<'_, Self>) -> Option<Matrix>;

    fn from_real_matrix(matrix: Matrix) -> Array2<Self>;
}

impl Field for f64 {
    const IS_COMPLEX: bool = false;

    fn from_real(value: f64) -> Self {
        value
    }

    fn conj(self) -> Self {
        self
    }

    fn abs_sqr(self) -> f64 {
        self * self
    }

    fn modulus(self) -> f64 {
        self.abs()
    }

    fn re(self) -> f64 {
        self
    }

    fn im(self) -> f64 {
        0.0
    }

    fn scale(self, factor: f64) -> Self {
        self * factor
    }

    fn finite(self) -> bool {
        self.is_finite()
    }

    fn to_real_matrix(matrix: ArrayView2<'_, Self>) -> Option<Matrix> {
        Some(matrix.to_owned())
    }

    fn from_real_matrix(matrix: Matrix) -> Array2<Self> {
        matrix
    }
}

impl Field for Complex64 {
    const IS_COMPLEX: bool = true;

    fn from_real(value: f64) -> Self {
        Complex64::new(value, 0.0)
    }

    fn conj(self) -> Self {
        Complex64::new(self.re, -self.im)
    }

    fn abs_sqr(self) -> f64 {
        self.norm_sqr()
    }

    fn modulus(self) -> f64 {
        self.norm()
    }

    fn re(self) -> f64 {
        self.re
    }

    fn im(self) -> f64 {
        self.im
    }

    fn scale(self, factor: f64) -> Self {
        Complex64::new(self.re * factor, self.im * factor)
    }

    fn finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    fn to_real_matrix(_matrix: ArrayView2<'_, Self>) -> Option<Matrix> {
        None
    }

    fn from_real_matrix(matrix: Matrix) -> Array2<Self> {
        matrix.mapv(|x| Complex64::new(x, 0.0))
    }
}
