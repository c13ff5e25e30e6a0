use super::{RobustInfo, soft_threshold};
use crate::Matrix;
use crate::error::{MvaError, Result};
use crate::linalg::{RandomizedSettings, randomized_svd};

/// GoDec robust PCA (Zhou & Tao): `X = L + E` with `L` of rank `rank` and
/// `E` sparse.
///
/// Alternates a randomized rank-`rank` fit of `X - E` with soft-thresholding
/// of `X - L` at `lambda`, until `L` changes by less than `tol` relative to
/// its norm.
pub fn rpca_godec(
    x: &Matrix,
    rank: usize,
    lambda: f64,
    tol: f64,
    max_iter: usize,
    settings: RandomizedSettings,
) -> Result<RobustInfo> {
    let (m, n) = x.dim();
    if rank == 0 || rank > m.min(n) {
        return Err(MvaError::Shape(format!(
            "cannot fit {rank} components to a {m}x{n} matrix"
        )));
    }
    if lambda < 0.0 {
        return Err(MvaError::Configuration(format!(
            "the sparsity threshold must be non-negative, got {lambda}"
        )));
    }

    let mut low_rank = Matrix::zeros(x.dim());
    let mut sparse_error = Matrix::zeros(x.dim());
    let mut iterations = max_iter;
    for iteration in 1..=max_iter {
        let target = x - &sparse_error;
        let updated = randomized_svd(target.view(), rank, settings)?.reconstruct();
        sparse_error = (x - &updated).mapv(|v| soft_threshold(v, lambda));

        let change = (&updated - &low_rank).mapv(|v| v * v).sum().sqrt();
        let norm = updated.mapv(|v| v * v).sum().sqrt();
        low_rank = updated;
        if change <= tol * norm.max(f64::MIN_POSITIVE) {
            iterations = iteration;
            break;
        }
    }
    if iterations == max_iter {
        tracing::warn!(max_iter, "RPCA_GoDec reached the iteration limit");
    }
    tracing::debug!(iterations, "RPCA_GoDec finished");

    Ok(RobustInfo {
        low_rank,
        sparse_error,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn corrupted() -> (Matrix, Matrix) {
        let a = array![[1.0], [2.0], [0.5], [1.5], [1.0], [3.0], [2.0], [1.0], [0.5], [2.5]];
        let b = array![[1.0, 0.5, 2.0, 1.0, 1.5, 1.0, 2.0, 0.5, 1.0, 1.5, 2.0, 1.0]];
        let clean = a.dot(&b);
        let mut noisy = clean.clone();
        noisy[[2, 3]] += 6.0;
        noisy[[7, 0]] += 5.0;
        noisy[[5, 9]] -= 4.0;
        (clean, noisy)
    }

    #[test]
    fn test_godec_isolates_outliers() {
        let (clean, noisy) = corrupted();
        let info = rpca_godec(&noisy, 1, 0.3, 1e-10, 1000, RandomizedSettings::default()).unwrap();
        assert!(info.sparse_error[[2, 3]] > 4.0);
        assert!(info.sparse_error[[7, 0]] > 3.0);
        assert!(info.sparse_error[[5, 9]] < -2.0);
        let plain = crate::linalg::Svd::compute(noisy.view()).unwrap().truncate(1).reconstruct();
        let robust_error = (&info.low_rank - &clean).mapv(f64::abs).sum();
        let plain_error = (&plain - &clean).mapv(f64::abs).sum();
        assert!(robust_error * 5.0 < plain_error);
    }

    #[test]
    fn test_godec_without_corruption_is_low_rank_fit() {
        let (clean, _) = corrupted();
        let info = rpca_godec(&clean, 1, 0.3, 1e-9, 100, RandomizedSettings::default()).unwrap();
        assert!((&info.low_rank - &clean).mapv(f64::abs).sum() < 1e-8);
        assert!(info.sparse_error.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_godec_rank_bounds() {
        let (clean, _) = corrupted();
        assert!(rpca_godec(&clean, 11, 1.0, 1e-6, 10, RandomizedSettings::default()).is_err());
    }
}
