use ndarray::{ArrayView2, Axis, Zip};

use crate::error::{MvaError, Result};
use crate::linalg::{RandomizedSettings, Svd, randomized_svd, solve};
use crate::{Matrix, Vector};

/// Rank-`k` maximum-likelihood model `U diag(s) V^T` of the data.
#[derive(Clone, Debug)]
pub struct Mlpca {
    pub u: Matrix,
    pub singular_values: Vector,
    pub v: Matrix,
    /// Variance-weighted sum of squared residuals.
    pub objective: f64,
    pub iterations: usize,
}

/// Maximum-likelihood PCA (Wentzell et al.) for noise with a known,
/// element-wise variance.
///
/// Alternates weighted least-squares projections of the columns and rows
/// onto the current rank-`k` subspace until the weighted residual changes by
/// less than `tol` (relative) between two passes in the same orientation.
/// `fast` swaps the exact SVDs for randomized ones.
pub fn mlpca(
    x: &Matrix,
    variance: &Matrix,
    rank: usize,
    tol: f64,
    max_iter: usize,
    fast: Option<RandomizedSettings>,
) -> Result<Mlpca> {
    if x.dim() != variance.dim() {
        return Err(MvaError::Shape(format!(
            "variance of shape {:?} does not match data of shape {:?}",
            variance.dim(),
            x.dim()
        )));
    }
    if variance.iter().any(|&v| !(v > 0.0 && v.is_finite())) {
        return Err(MvaError::Configuration(
            "the noise variance must be positive and finite".to_string(),
        ));
    }
    let (m, n) = x.dim();
    if rank == 0 || rank > m.min(n) {
        return Err(MvaError::Shape(format!(
            "cannot fit {rank} components to a {m}x{n} matrix"
        )));
    }

    let scale = Zip::from(x).and(variance).fold(0.0, |acc, &x, &v| acc + x * x / v);
    let floor = f64::EPSILON * f64::EPSILON * scale;

    let mut basis = truncated(x.view(), rank, fast)?.u;
    let mut data = x.clone();
    let mut var = variance.clone();
    let mut transposed = false;
    let mut previous: Option<f64> = None;
    let mut loops = 0;

    let (estimate, objective) = loop {
        let (coefficients, objective) = project(&basis, &data, &var)?;
        let mut converged = objective <= floor;
        if loops % 2 == 0 {
            if let Some(before) = previous {
                converged |= (objective - before).abs() <= tol * objective;
            }
            previous = Some(objective);
        }
        loops += 1;
        if converged || loops >= max_iter {
            if !converged {
                tracing::warn!(max_iter, objective, "mlpca reached the iteration limit");
            }
            break (basis.dot(&coefficients), objective);
        }

        // the row space of the current estimate is the basis for the other orientation
        basis = Svd::compute(coefficients.view())?.truncate(rank).v;
        data = data.t().to_owned();
        var = var.t().to_owned();
        transposed = !transposed;
    };
    tracing::debug!(loops, objective, "mlpca converged");

    let estimate = if transposed { estimate.reversed_axes() } else { estimate };
    let svd = truncated(estimate.view(), rank, fast)?;
    Ok(Mlpca {
        u: svd.u,
        singular_values: svd.singular_values,
        v: svd.v,
        objective,
        iterations: loops,
    })
}

fn truncated(x: ArrayView2<'_, f64>, rank: usize, fast: Option<RandomizedSettings>) -> Result<Svd<f64>> {
    match fast {
        Some(settings) => randomized_svd(x, rank, settings),
        None => Ok(Svd::compute(x)?.truncate(rank)),
    }
}

/// Weighted least-squares coefficients of every column of `data` on
/// `basis`, and the weighted residual.
fn project(basis: &Matrix, data: &Matrix, variance: &Matrix) -> Result<(Matrix, f64)> {
    let p = basis.ncols();
    let mut coefficients = Matrix::zeros((p, data.ncols()));
    let mut objective = 0.0;
    for (j, (column, var)) in data
        .axis_iter(Axis(1))
        .zip(variance.axis_iter(Axis(1)))
        .enumerate()
    {
        let weights = var.mapv(|v| 1.0 / v);
        let weighted = basis * &weights.view().insert_axis(Axis(1));
        let gram = weighted.t().dot(basis);
        let rhs = weighted.t().dot(&column);
        let c = solve(gram.view(), rhs.view().insert_axis(Axis(1)))?;
        let c = c.column(0);
        let fitted = basis.dot(&c);
        objective += Zip::from(&column)
            .and(&fitted)
            .and(&weights)
            .fold(0.0, |acc, &x, &f, &w| acc + w * (x - f) * (x - f));
        coefficients.column_mut(j).assign(&c);
    }
    Ok((coefficients, objective))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn low_rank_with_noise() -> Matrix {
        let a = array![[1.0, 0.5], [2.0, -1.0], [0.0, 1.0], [1.5, 1.5], [-1.0, 2.0], [0.5, 0.0]];
        let b = array![[1.0, 2.0, 0.0, -1.0, 1.0], [0.5, -1.0, 2.0, 1.0, 0.0]];
        let noise = Array2::from_shape_fn((6, 5), |(i, j)| 1e-2 * (((i * 7 + j * 3) % 5) as f64 - 2.0));
        a.dot(&b) + noise
    }

    #[test]
    fn test_uniform_variance_matches_truncated_svd() {
        let x = low_rank_with_noise();
        let variance = Matrix::ones(x.dim());
        let result = mlpca(&x, &variance, 2, 1e-10, 1000, None).unwrap();
        let svd = Svd::compute(x.view()).unwrap().truncate(2);
        for k in 0..2 {
            assert!((result.singular_values[k] - svd.singular_values[k]).abs() < 1e-8);
        }
        assert_eq!(result.u.dim(), (6, 2));
        assert_eq!(result.v.dim(), (5, 2));
    }

    #[test]
    fn test_weighted_objective_improves_on_svd_start() {
        let x = low_rank_with_noise().mapv(|v| v.abs() + 0.1);
        let variance = x.clone();
        let start = Svd::compute(x.view()).unwrap().truncate(2).u;
        let (_, initial) = project(&start, &x, &variance).unwrap();
        let result = mlpca(&x, &variance, 2, 1e-10, 5000, None).unwrap();
        assert!(result.objective <= initial + 1e-12);
        assert!(result.iterations >= 1);
    }

    #[test]
    fn test_fast_variant_recovers_exact_low_rank() {
        let a = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 1.0]];
        let b = array![[1.0, 2.0, 3.0], [0.0, 1.0, -1.0]];
        let x = a.dot(&b);
        let variance = Matrix::ones(x.dim());
        let result = mlpca(&x, &variance, 2, 1e-10, 100, Some(RandomizedSettings::default())).unwrap();
        let mut model = result.u.clone();
        for (j, &s) in result.singular_values.iter().enumerate() {
            model.column_mut(j).mapv_inplace(|v| v * s);
        }
        let model = model.dot(&result.v.t());
        assert!((&model - &x).mapv(f64::abs).sum() < 1e-8);
    }

    #[test]
    fn test_rejects_bad_variance() {
        let x = low_rank_with_noise();
        let mut variance = Matrix::ones(x.dim());
        variance[[1, 1]] = 0.0;
        assert!(matches!(
            mlpca(&x, &variance, 2, 1e-10, 10, None),
            Err(MvaError::Configuration(_))
        ));
        let variance = Matrix::ones((2, 2));
        assert!(matches!(
            mlpca(&x, &variance, 2, 1e-10, 10, None),
            Err(MvaError::Shape(_))
        ));
    }
}
