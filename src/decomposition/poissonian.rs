use ndarray::{Array2, ArrayView2, Axis, Zip};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::error::{MvaError, Result};
use crate::linalg::Field;
use crate::{Matrix, Vector};

/// Square roots of the per-sample and per-feature totals of count data.
///
/// Dividing every element by `navigation[i] * signal[j]` scales Poisson
/// noise to roughly uniform variance (Keenan & Kotula); factors and loadings
/// found in that space are mapped back by multiplying their rows with
/// `signal` and `navigation` respectively.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoissonianWeights {
    pub navigation: Vector,
    pub signal: Vector,
}

impl PoissonianWeights {
    /// Fails on negative data or data with a non-zero imaginary part.
    pub fn estimate<T: Field>(data: ArrayView2<'_, T>) -> Result<Self> {
        if data.iter().any(|x| x.im() != 0.0) {
            return Err(MvaError::Configuration(
                "Poissonian noise normalization requires real-valued data".to_string(),
            ));
        }
        if data.iter().any(|x| x.re() < 0.0 || !x.finite()) {
            return Err(MvaError::Configuration(
                "negative values found in data, Poissonian noise normalization requires \
                 non-negative counts"
                    .to_string(),
            ));
        }
        let real = data.mapv(|x| x.re());
        Ok(Self {
            navigation: real.sum_axis(Axis(1)).mapv(f64::sqrt),
            signal: real.sum_axis(Axis(0)).mapv(f64::sqrt),
        })
    }

    /// Normalised copy of `data`; elements whose weight is zero become zero.
    pub fn normalize<T: Field>(&self, data: ArrayView2<'_, T>) -> Array2<T> {
        let mut out = data.to_owned();
        for (mut row, &a) in out.axis_iter_mut(Axis(0)).zip(self.navigation.iter()) {
            Zip::from(&mut row).and(&self.signal).for_each(|x, &b| {
                let denominator = a * b;
                *x = if denominator > 0.0 {
                    x.scale(1.0 / denominator)
                } else {
                    T::zero()
                };
            });
        }
        out
    }

    /// Noise variance expressed in the normalised space.
    pub fn normalize_variance(&self, variance: &Matrix) -> Matrix {
        let mut out = variance.clone();
        for (mut row, &a) in out.axis_iter_mut(Axis(0)).zip(self.navigation.iter()) {
            Zip::from(&mut row).and(&self.signal).for_each(|v, &b| {
                let denominator = a * a * b * b;
                if denominator > 0.0 {
                    *v /= denominator;
                }
            });
        }
        out
    }

    /// Maps factors `(n_features, k)` and loadings `(n_samples, k)` back to
    /// the scale of the raw data.
    pub fn restore<T: Field>(&self, factors: &mut Array2<T>, loadings: &mut Array2<T>) {
        scale_rows(factors, &self.signal);
        scale_rows(loadings, &self.navigation);
    }
}

fn scale_rows<T: Field>(matrix: &mut Array2<T>, weights: &Vector) {
    for (mut row, &w) in matrix.axis_iter_mut(Axis(0)).zip(weights.iter()) {
        row.mapv_inplace(|x| x.scale(w));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use num_complex::Complex64;

    #[test]
    fn test_weights_are_root_totals() {
        let data = array![[1.0, 3.0], [4.0, 0.0]];
        let weights = PoissonianWeights::estimate(data.view()).unwrap();
        assert_eq!(weights.navigation, array![2.0, 2.0]);
        assert_eq!(weights.signal, array![5.0f64.sqrt(), 3.0f64.sqrt()]);
    }

    #[test]
    fn test_normalize_then_restore_model() {
        let data = array![[1.0, 3.0, 2.0], [4.0, 1.0, 0.0], [2.0, 2.0, 2.0]];
        let weights = PoissonianWeights::estimate(data.view()).unwrap();
        let normalized = weights.normalize(data.view());
        // identity factorisation of the normalised data
        let mut loadings = normalized.clone();
        let mut factors = Matrix::eye(3);
        weights.restore(&mut factors, &mut loadings);
        let model = loadings.dot(&factors.t());
        assert!((&model - &data).mapv(f64::abs).sum() < 1e-12);
    }

    #[test]
    fn test_zero_rows_stay_zero() {
        let data = array![[0.0, 0.0], [1.0, 2.0]];
        let weights = PoissonianWeights::estimate(data.view()).unwrap();
        let normalized = weights.normalize(data.view());
        assert_eq!(normalized.row(0).to_vec(), vec![0.0, 0.0]);
        assert!(normalized.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_rejects_negative_and_complex_data() {
        let data = array![[1.0, -1.0], [0.0, 2.0]];
        assert!(matches!(
            PoissonianWeights::estimate(data.view()),
            Err(MvaError::Configuration(_))
        ));
        let data = array![[Complex64::new(1.0, 0.5)]];
        assert!(matches!(
            PoissonianWeights::estimate(data.view()),
            Err(MvaError::Configuration(_))
        ));
        let data = array![[Complex64::new(1.0, 0.0)]];
        assert!(PoissonianWeights::estimate(data.view()).is_ok());
    }
}
