use ndarray::{Array1, Array2, ArrayView2, s};
use num_traits::Zero;
use std::cmp::Ordering;

use super::{Field, adjoint};
use crate::error::{MvaError, Result};
use crate::Vector;

const MAX_SWEEPS: usize = 80;

/// Columns whose squared norm is at or below this are treated as null.
const NULL_COLUMN: f64 = f64::MIN_POSITIVE / f64::EPSILON;

/// Thin singular value decomposition `A = U diag(s) V^H`.
///
/// For an `m x n` input, `u` is `m x r`, `v` is `n x r` with `r = min(m, n)`,
/// and singular values are sorted in decreasing order. The entry of largest
/// modulus in every column of `u` is real and positive, so the result is
/// fully determined by the input.
#[derive(Clone, Debug)]
pub struct Svd<T> {
    pub u: Array2<T>,
    pub singular_values: Vector,
    pub v: Array2<T>,
}

impl<T: Field> Svd<T> {
    pub fn compute(a: ArrayView2<'_, T>) -> Result<Self> {
        let (m, n) = a.dim();
        if m == 0 || n == 0 {
            return Err(MvaError::Shape(format!(
                "cannot decompose an empty {m}x{n} matrix"
            )));
        }
        if a.iter().any(|x| !x.finite()) {
            return Err(MvaError::Numerical(
                "matrix contains non-finite values".to_string(),
            ));
        }

        let svd = if m >= n {
            one_sided_jacobi(a)
        } else {
            // A^H = U' S V'^H  =>  A = V' S U'^H
            let ah = adjoint(a);
            let Svd { u, singular_values, v } = one_sided_jacobi(ah.view());
            Svd { u: v, singular_values, v: u }
        };
        let finite = svd.singular_values.iter().all(|s| s.is_finite())
            && svd.u.iter().all(|x| x.finite())
            && svd.v.iter().all(|x| x.finite());
        if !finite {
            return Err(MvaError::Numerical(format!(
                "singular value decomposition of a {m}x{n} matrix produced non-finite values"
            )));
        }
        Ok(svd)
    }

    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }

    /// Keeps the leading `k` singular triplets.
    pub fn truncate(self, k: usize) -> Self {
        let k = k.min(self.rank());
        Svd {
            u: self.u.slice(s![.., ..k]).to_owned(),
            singular_values: self.singular_values.slice(s![..k]).to_owned(),
            v: self.v.slice(s![.., ..k]).to_owned(),
        }
    }

    pub fn reconstruct(&self) -> Array2<T> {
        let mut us = self.u.clone();
        for (j, &sigma) in self.singular_values.iter().enumerate() {
            us.column_mut(j).mapv_inplace(|x| x.scale(sigma));
        }
        us.dot(&adjoint(self.v.view()))
    }
}

/// Hestenes one-sided Jacobi on a tall matrix (`m >= n`).
///
/// Columns of `a` are stored as rows of `w` so rotations touch contiguous
/// memory; `v` accumulates the same rotations starting from the identity.
fn one_sided_jacobi<T: Field>(a: ArrayView2<'_, T>) -> Svd<T> {
    let (m, n) = a.dim();
    let mut w = Array2::from_shape_fn((n, m), |(j, i)| a[[i, j]]);
    let mut v = Array2::<T>::eye(n);
    let tol = f64::EPSILON * m as f64;

    let mut converged = false;
    for sweep in 0..MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..n {
            for q in (p + 1)..n {
                let mut alpha = 0.0;
                let mut beta = 0.0;
                let mut gamma = T::zero();
                for i in 0..m {
                    let wp = w[[p, i]];
                    let wq = w[[q, i]];
                    alpha += wp.abs_sqr();
                    beta += wq.abs_sqr();
                    gamma += wp.conj() * wq;
                }

                if alpha <= NULL_COLUMN || beta <= NULL_COLUMN {
                    continue;
                }
                // both norms exceed NULL_COLUMN, so any g past this test is normal
                let g = gamma.modulus();
                if g <= tol * alpha.sqrt() * beta.sqrt() {
                    continue;
                }

                let zeta = (beta - alpha) / (2.0 * g);
                let t = if zeta.is_finite() {
                    zeta.signum() / (zeta.abs() + zeta.hypot(1.0))
                } else {
                    0.0
                };
                if t == 0.0 {
                    continue;
                }
                rotated = true;
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                // aligns the phase of column q so that <w_p, w_q> is real
                let phase = gamma.conj().scale(1.0 / g);

                rotate(&mut w, p, q, c, s, phase);
                rotate(&mut v, p, q, c, s, phase);
            }
        }
        if !rotated {
            tracing::trace!(sweep, "jacobi svd converged");
            converged = true;
            break;
        }
    }
    if !converged {
        tracing::warn!(rows = m, cols = n, "jacobi svd reached the sweep limit");
    }

    let norms: Vec<f64> = (0..n)
        .map(|j| w.row(j).iter().map(|x| x.abs_sqr()).sum::<f64>().sqrt())
        .collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| norms[j].partial_cmp(&norms[i]).unwrap_or(Ordering::Equal));

    let mut u = Array2::<T>::zeros((m, n));
    let mut vmat = Array2::<T>::zeros((n, n));
    let mut singular_values = Array1::zeros(n);
    for (k, &j) in order.iter().enumerate() {
        let sigma = norms[j];
        singular_values[k] = sigma;
        if sigma > f64::MIN_POSITIVE {
            for i in 0..m {
                u[[i, k]] = w[[j, i]].scale(1.0 / sigma);
            }
        }
        for r in 0..n {
            vmat[[r, k]] = v[[j, r]];
        }
    }

    fix_phases(&mut u, &mut vmat);
    Svd { u, singular_values, v: vmat }
}

fn rotate<T: Field>(rows: &mut Array2<T>, p: usize, q: usize, c: f64, s: f64, phase: T) {
    for i in 0..rows.ncols() {
        let xp = rows[[p, i]];
        let xq = rows[[q, i]] * phase;
        rows[[p, i]] = xp.scale(c) - xq.scale(s);
        rows[[q, i]] = xp.scale(s) + xq.scale(c);
    }
}

/// Makes the largest-modulus entry of each `u` column real positive,
/// falling back to `v` for null columns.
fn fix_phases<T: Field>(u: &mut Array2<T>, v: &mut Array2<T>) {
    for k in 0..u.ncols() {
        let pivot = largest_entry(u.column(k).iter().copied())
            .or_else(|| largest_entry(v.column(k).iter().copied()));
        let Some(pivot) = pivot else { continue };
        let phase = pivot.conj().scale(1.0 / pivot.modulus());
        u.column_mut(k).mapv_inplace(|x| x * phase);
        v.column_mut(k).mapv_inplace(|x| x * phase);
    }
}

fn largest_entry<T: Field>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut best: Option<T> = None;
    for x in values {
        let better = match best {
            Some(b) => x.modulus() > b.modulus(),
            None => x.modulus() > 0.0,
        };
        if better {
            best = Some(x);
        }
    }
    best.filter(|b| !b.is_zero())
}
