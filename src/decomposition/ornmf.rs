use ndarray::{Array1, ArrayView1, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{RobustInfo, soft_threshold};
use crate::Matrix;
use crate::error::{MvaError, Result};

const PROJECTION_TOL: f64 = 1e-8;
const PROJECTION_MAX_ITER: usize = 200;

/// Online robust non-negative matrix factorisation.
///
/// Returns `(w, h, info)` with `w` the `(n_features, rank)` non-negative
/// basis, `h` the `(n_samples, rank)` non-negative coefficients and `info`
/// holding `h . w^T` and the soft-thresholded outliers. Samples are streamed
/// once; each is projected on the current basis by projected gradient steps
/// and the basis columns are then refreshed by block coordinate descent,
/// clipped at zero and kept inside the unit ball.
pub fn ornmf(x: &Matrix, rank: usize, lambda: f64, seed: u64) -> Result<(Matrix, Matrix, RobustInfo)> {
    let (n_samples, n_features) = x.dim();
    if rank == 0 || rank > n_samples.min(n_features) {
        return Err(MvaError::Shape(format!(
            "cannot fit {rank} components to a {n_samples}x{n_features} matrix"
        )));
    }
    if lambda < 0.0 {
        return Err(MvaError::Configuration(format!(
            "ORNMF needs lambda >= 0, got {lambda}"
        )));
    }
    if x.iter().any(|&v| v < 0.0) {
        return Err(MvaError::Configuration(
            "ORNMF requires non-negative data".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let scale = (x.mean().unwrap_or(0.0) / rank as f64).sqrt();
    let mut w = Matrix::random_using((n_features, rank), StandardNormal, &mut rng).mapv(|v: f64| v.abs() * scale);
    for mut column in w.columns_mut() {
        let norm = column.dot(&column).sqrt();
        if norm > 1.0 {
            column /= norm;
        }
    }

    let mut a = Matrix::zeros((rank, rank));
    let mut b = Matrix::zeros((n_features, rank));
    let mut h = Matrix::zeros((n_samples, rank));
    let mut sparse_error = Matrix::zeros((n_samples, n_features));

    for (i, sample) in x.axis_iter(Axis(0)).enumerate() {
        let (coefficients, outlier) = project(sample, &w, lambda);

        let h_col = coefficients.view().insert_axis(Axis(1));
        a = a + h_col.dot(&h_col.t());
        let clean = &sample - &outlier;
        b = b + clean.view().insert_axis(Axis(1)).dot(&h_col.t());

        update_basis(&mut w, &a, &b);
        h.row_mut(i).assign(&coefficients);
        sparse_error.row_mut(i).assign(&outlier);
    }

    let info = RobustInfo {
        low_rank: h.dot(&w.t()),
        sparse_error,
        iterations: n_samples,
    };
    Ok((w, h, info))
}

fn project(sample: ArrayView1<'_, f64>, w: &Matrix, lambda: f64) -> (Array1<f64>, Array1<f64>) {
    let k = w.ncols();
    let frobenius = w.iter().map(|v| v * v).sum::<f64>();
    let step = if frobenius > 0.0 { 1.0 / frobenius } else { 0.0 };

    let mut h = Array1::<f64>::zeros(k);
    let mut e = Array1::<f64>::zeros(sample.len());
    for _ in 0..PROJECTION_MAX_ITER {
        let residual = &w.dot(&h) + &e - &sample;
        let h_new = (&h - &(w.t().dot(&residual) * step)).mapv(|v| v.max(0.0));
        let e_new = (&sample - &w.dot(&h_new)).mapv(|v| soft_threshold(v, lambda));
        let change = max_abs_diff(&h_new, &h).max(max_abs_diff(&e_new, &e));
        h = h_new;
        e = e_new;
        if change < PROJECTION_TOL {
            break;
        }
    }
    (h, e)
}

fn update_basis(w: &mut Matrix, a: &Matrix, b: &Matrix) {
    for j in 0..w.ncols() {
        let diagonal = a[[j, j]];
        if diagonal <= 0.0 {
            continue;
        }
        let updated = (&w.column(j) + &((&b.column(j) - &w.dot(&a.column(j))) / diagonal))
            .mapv(|v| v.max(0.0));
        let norm = updated.dot(&updated).sqrt();
        let mut column = w.column_mut(j);
        column.assign(&updated);
        if norm > 1.0 {
            column /= norm;
        }
    }
}

fn max_abs_diff(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}
