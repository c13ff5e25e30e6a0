//! Dense linear-algebra primitives used by the decomposition algorithms.
//!
//! - `Svd`: thin singular value decomposition (one-sided Jacobi), real or complex
//! - `randomized_svd`: Halko-style sketched SVD for the `fast_*` algorithms
//! - `orthonormalize`: Gram-Schmidt QR factor
//! - `solve` / `inverse`: Gaussian elimination with partial pivoting

mod qr;
mod randomized;
mod scalar;
mod solve;
mod svd;

pub use qr::orthonormalize;
pub use randomized::{RandomizedSettings, randomized_svd};
pub use scalar::Field;
pub use solve::{inverse, solve};
pub use svd::Svd;

use ndarray::{Array2, ArrayView2};

/// Conjugate transpose.
pub fn adjoint<T: Field>(a: ArrayView2<'_, T>) -> Array2<T> {
    Array2::from_shape_fn((a.ncols(), a.nrows()), |(i, j)| a[[j, i]].conj())
}

/// Plain transpose in standard layout.
pub fn transpose<T: Field>(a: ArrayView2<'_, T>) -> Array2<T> {
    Array2::from_shape_fn((a.ncols(), a.nrows()), |(i, j)| a[[j, i]])
}
