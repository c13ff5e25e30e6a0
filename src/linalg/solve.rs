use ndarray::{Array2, ArrayView2};

use super::Field;
use crate::error::{MvaError, Result};

/// Solves `a x = b` for square `a`.
pub fn solve<T: Field>(a: ArrayView2<'_, T>, b: ArrayView2<'_, T>) -> Result<Array2<T>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(MvaError::Shape(format!(
            "cannot solve with a non-square {}x{} matrix",
            n,
            a.ncols()
        )));
    }
    if b.nrows() != n {
        return Err(MvaError::Shape(format!(
            "right-hand side has {} rows, expected {}",
            b.nrows(),
            n
        )));
    }

    let mut lu = a.to_owned();
    let mut x = b.to_owned();
    let scale = lu.iter().map(|v| v.modulus()).fold(0.0, f64::max);
    let tiny = f64::EPSILON * scale * n as f64;

    for col in 0..n {
        let mut pivot = col;
        for row in (col + 1)..n {
            if lu[[row, col]].modulus() > lu[[pivot, col]].modulus() {
                pivot = row;
            }
        }
        if lu[[pivot, col]].modulus() <= tiny {
            return Err(MvaError::Numerical("matrix is singular".to_string()));
        }
        if pivot != col {
            for j in 0..n {
                lu.swap([pivot, j], [col, j]);
            }
            for j in 0..x.ncols() {
                x.swap([pivot, j], [col, j]);
            }
        }
        let diag = lu[[col, col]];
        for row in (col + 1)..n {
            let factor = lu[[row, col]] / diag;
            for j in col..n {
                let v = lu[[col, j]];
                lu[[row, j]] -= factor * v;
            }
            for j in 0..x.ncols() {
                let v = x[[col, j]];
                x[[row, j]] -= factor * v;
            }
        }
    }

    for col in (0..n).rev() {
        let diag = lu[[col, col]];
        for j in 0..x.ncols() {
            let mut acc = x[[col, j]];
            for k in (col + 1)..n {
                acc -= lu[[col, k]] * x[[k, j]];
            }
            x[[col, j]] = acc / diag;
        }
    }
    Ok(x)
}

pub fn inverse<T: Field>(a: ArrayView2<'_, T>) -> Result<Array2<T>> {
    let identity = Array2::<T>::eye(a.nrows());
    solve(a, identity.view())
}
