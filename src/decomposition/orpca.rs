use ndarray::{Array1, ArrayView1, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{RobustInfo, soft_threshold};
use crate::Matrix;
use crate::error::{MvaError, Result};
use crate::linalg::{inverse, orthonormalize};

const PROJECTION_TOL: f64 = 1e-8;
const PROJECTION_MAX_ITER: usize = 100;

/// Online robust PCA by stochastic optimisation (Feng, Xu & Yan).
///
/// Samples (rows of `x`) are streamed once. Each sample is split into a
/// coefficient vector on the current basis and a sparse outlier by
/// alternating closed-form ridge projections and soft-thresholding; the
/// basis is then refreshed by block coordinate descent on the accumulated
/// statistics. `lambda1` weights the nuclear-norm surrogate and `lambda2`
/// the sparse error.
pub fn orpca(x: &Matrix, rank: usize, lambda1: f64, lambda2: f64, seed: u64) -> Result<RobustInfo> {
    let (n_samples, n_features) = x.dim();
    if rank == 0 || rank > n_samples.min(n_features) {
        return Err(MvaError::Shape(format!(
            "cannot fit {rank} components to a {n_samples}x{n_features} matrix"
        )));
    }
    if lambda1 <= 0.0 || lambda2 < 0.0 {
        return Err(MvaError::Configuration(format!(
            "ORPCA needs lambda1 > 0 and lambda2 >= 0, got {lambda1} and {lambda2}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut basis = orthonormalize(&Matrix::random_using((n_features, rank), StandardNormal, &mut rng));
    let mut a = Matrix::zeros((rank, rank));
    let mut b = Matrix::zeros((n_features, rank));
    let mut coefficients = Matrix::zeros((n_samples, rank));
    let mut sparse_error = Matrix::zeros((n_samples, n_features));

    for (i, sample) in x.axis_iter(Axis(0)).enumerate() {
        let (r, e) = project(sample, &basis, lambda1, lambda2)?;

        let r_col = r.view().insert_axis(Axis(1));
        a = a + r_col.dot(&r_col.t());
        let clean = &sample - &e;
        b = b + clean.view().insert_axis(Axis(1)).dot(&r_col.t());

        update_basis(&mut basis, &a, &b, lambda1);
        coefficients.row_mut(i).assign(&r);
        sparse_error.row_mut(i).assign(&e);
    }

    Ok(RobustInfo {
        low_rank: coefficients.dot(&basis.t()),
        sparse_error,
        iterations: n_samples,
    })
}

fn project(
    sample: ArrayView1<'_, f64>,
    basis: &Matrix,
    lambda1: f64,
    lambda2: f64,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let k = basis.ncols();
    let regularised = basis.t().dot(basis) + &(Matrix::eye(k) * lambda1);
    let pseudo_inverse = inverse(regularised.view())?.dot(&basis.t());

    let mut r = Array1::zeros(k);
    let mut e = Array1::zeros(sample.len());
    for _ in 0..PROJECTION_MAX_ITER {
        let r_new = pseudo_inverse.dot(&(&sample - &e));
        let e_new = (&sample - &basis.dot(&r_new)).mapv(|v| soft_threshold(v, lambda2));
        let change = max_abs_diff(&r_new, &r).max(max_abs_diff(&e_new, &e));
        r = r_new;
        e = e_new;
        if change < PROJECTION_TOL {
            break;
        }
    }
    Ok((r, e))
}

fn update_basis(basis: &mut Matrix, a: &Matrix, b: &Matrix, lambda1: f64) {
    let k = basis.ncols();
    let a_reg = a + &(Matrix::eye(k) * lambda1);
    for j in 0..k {
        let diagonal = a_reg[[j, j]];
        let step = (&b.column(j) - &basis.dot(&a_reg.column(j))) / diagonal;
        let mut column = basis.column_mut(j);
        column += &step;
    }
}

fn max_abs_diff(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}
