use ndarray::{Array2, ArrayView2};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{Field, Svd, adjoint, orthonormalize};
use crate::error::{MvaError, Result};

/// Sketch parameters for `randomized_svd`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomizedSettings {
    pub n_oversamples: usize,
    pub n_power_iterations: usize,
    pub seed: u64,
}

impl Default for RandomizedSettings {
    fn default() -> Self {
        Self {
            n_oversamples: 10,
            n_power_iterations: 4,
            seed: 0,
        }
    }
}

/// Approximate leading `k` singular triplets of `a` (Halko, Martinsson & Tropp).
///
/// The range of `a` is sketched with a seeded Gaussian test matrix, refined by
/// power iterations with re-orthonormalisation, and the small projected
/// matrix is decomposed exactly.
pub fn randomized_svd<T: Field>(
    a: ArrayView2<'_, T>,
    k: usize,
    settings: RandomizedSettings,
) -> Result<Svd<T>> {
    let (m, n) = a.dim();
    let max_rank = m.min(n);
    if k == 0 || k > max_rank {
        return Err(MvaError::Shape(format!(
            "cannot extract {k} components from a {m}x{n} matrix"
        )));
    }

    let sketch = (k + settings.n_oversamples).min(max_rank);
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let omega = Array2::<f64>::random_using((n, sketch), StandardNormal, &mut rng).mapv(T::from_real);

    let ah = adjoint(a);
    let mut q = orthonormalize(&a.dot(&omega));
    for _ in 0..settings.n_power_iterations {
        let z = orthonormalize(&ah.dot(&q));
        q = orthonormalize(&a.dot(&z));
    }

    let projected = adjoint(q.view()).dot(&a);
    let small = Svd::compute(projected.view())?;
    let svd = Svd {
        u: q.dot(&small.u),
        singular_values: small.singular_values,
        v: small.v,
    };
    Ok(svd.truncate(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn low_rank(m: usize, n: usize) -> Array2<f64> {
        let a = Array2::from_shape_fn((m, 2), |(i, j)| ((i + 1) * (j + 2)) as f64 / m as f64);
        let b = Array2::from_shape_fn((2, n), |(i, j)| ((i as f64) - (j as f64) / n as f64).cos());
        a.dot(&b)
    }

    #[test]
    fn test_matches_exact_singular_values_on_low_rank_data() {
        let x = low_rank(30, 12);
        let exact = Svd::compute(x.view()).unwrap();
        let approx = randomized_svd(x.view(), 2, RandomizedSettings::default()).unwrap();
        let diff: Array1<f64> = &exact.singular_values.slice(ndarray::s![..2]) - &approx.singular_values;
        assert!(diff.iter().all(|d| d.abs() < 1e-8));
    }

    #[test]
    fn test_is_deterministic_for_a_seed() {
        let x = low_rank(20, 15);
        let first = randomized_svd(x.view(), 2, RandomizedSettings::default()).unwrap();
        let second = randomized_svd(x.view(), 2, RandomizedSettings::default()).unwrap();
        assert_eq!(first.u, second.u);
        assert_eq!(first.v, second.v);
    }

    #[test]
    fn test_rejects_too_many_components() {
        let x = low_rank(5, 3);
        assert!(randomized_svd(x.view(), 4, RandomizedSettings::default()).is_err());
    }
}
