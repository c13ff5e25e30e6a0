use ndarray::Array2;
use num_traits::Zero;

use super::Field;

/// Orthonormal basis of the column space of `a` (the Q factor of a thin QR).
///
/// Modified Gram-Schmidt with one reorthogonalisation pass. Columns that are
/// numerically dependent on earlier ones come out as zero columns.
pub fn orthonormalize<T: Field>(a: &Array2<T>) -> Array2<T> {
    let (m, k) = a.dim();
    let mut q = a.clone();
    for j in 0..k {
        let original = (0..m).map(|r| q[[r, j]].abs_sqr()).sum::<f64>().sqrt();
        for _ in 0..2 {
            for i in 0..j {
                let proj = (0..m).fold(T::zero(), |acc, r| acc + q[[r, i]].conj() * q[[r, j]]);
                if proj.is_zero() {
                    continue;
                }
                for r in 0..m {
                    let qi = q[[r, i]];
                    q[[r, j]] -= qi * proj;
                }
            }
        }
        let norm = (0..m).map(|r| q[[r, j]].abs_sqr()).sum::<f64>().sqrt();
        if norm > 1e-12 * original.max(f64::MIN_POSITIVE) && norm > 0.0 {
            for r in 0..m {
                q[[r, j]] = q[[r, j]].scale(1.0 / norm);
            }
        } else {
            q.column_mut(j).fill(T::zero());
        }
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_columns_are_orthonormal() {
        let a = array![[1.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let q = orthonormalize(&a);
        let gram = q.t().dot(&q);
        assert!((gram[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((gram[[1, 1]] - 1.0).abs() < 1e-12);
        assert!(gram[[0, 1]].abs() < 1e-12);
    }

    #[test]
    fn test_dependent_column_is_zeroed() {
        let a = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]];
        let q = orthonormalize(&a);
        assert!(q.column(1).iter().all(|x| x.abs() < 1e-12));
    }
}
