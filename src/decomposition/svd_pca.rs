use ndarray::{Array2, ArrayView2};

use super::DecompositionOutput;
use crate::Vector;
use crate::error::{MvaError, Result};
use crate::linalg::{Field, RandomizedSettings, Svd, randomized_svd};

/// PCA by singular value decomposition of the uncentred data.
///
/// Wide matrices are decomposed through their transpose, so that swapping
/// the roles of samples and features swaps factors and loadings exactly.
/// `randomized` selects the sketched solver, which needs `output_dimension`.
/// The explained variance is `s^2 / n_samples` over every computed singular
/// value, so the exact solver reports the full spectrum even when truncated.
pub fn svd_pca<T: Field>(
    data: ArrayView2<'_, T>,
    output_dimension: Option<usize>,
    randomized: Option<RandomizedSettings>,
) -> Result<DecompositionOutput<T>> {
    let (n_samples, n_features) = data.dim();
    let transposed = n_samples < n_features;
    let tall = if transposed { data.reversed_axes() } else { data };

    let svd = match randomized {
        Some(settings) => {
            let k = output_dimension.ok_or_else(|| MvaError::missing_output_dimension("fast_svd"))?;
            randomized_svd(tall, k, settings)?
        }
        None => Svd::compute(tall)?,
    };
    let explained_variance = svd.singular_values.mapv(|s| s * s / n_samples as f64);
    tracing::debug!(
        n_samples,
        n_features,
        transposed,
        rank = svd.rank(),
        "svd pca computed"
    );

    let svd = match output_dimension {
        Some(k) => svd.truncate(k),
        None => svd,
    };
    let (factors, loadings) = factors_and_loadings(svd.u, &svd.singular_values, svd.v, transposed);
    Ok(DecompositionOutput {
        factors,
        loadings,
        explained_variance: Some(explained_variance),
        explained_variance_ratio: None,
        mean: None,
        info: None,
    })
}

/// Splits `U S V^H` of the (possibly transposed) data into factors and
/// loadings whose plain product `loadings . factors^T` is the data.
pub(crate) fn factors_and_loadings<T: Field>(
    u: Array2<T>,
    singular_values: &Vector,
    v: Array2<T>,
    transposed: bool,
) -> (Array2<T>, Array2<T>) {
    let mut us = u;
    for (j, &sigma) in singular_values.iter().enumerate() {
        us.column_mut(j).mapv_inplace(|x| x.scale(sigma));
    }
    let v_conj = v.mapv(|x| x.conj());
    if transposed {
        (us, v_conj)
    } else {
        (v_conj, us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use num_complex::Complex64;

    fn model<T: Field>(output: &DecompositionOutput<T>) -> Array2<T> {
        output.loadings.dot(&output.factors.t())
    }

    #[test]
    fn test_model_reproduces_tall_and_wide_data() {
        let tall = array![[1.0, 2.0], [3.0, 1.0], [0.0, 1.0], [2.0, 2.0]];
        for data in [tall.clone(), tall.t().to_owned()] {
            let output = svd_pca(data.view(), None, None).unwrap();
            let diff = (&model(&output) - &data).mapv(f64::abs).sum();
            assert!(diff < 1e-12);
        }
    }

    #[test]
    fn test_transposed_data_swaps_factors_and_loadings() {
        let data = array![[1.0, 2.0, 0.0], [3.0, 1.0, 1.0], [0.0, 1.0, 4.0], [2.0, 2.0, 1.0], [1.0, 0.0, 0.0]];
        let direct = svd_pca(data.view(), Some(2), None).unwrap();
        let swapped = svd_pca(data.t(), Some(2), None).unwrap();
        assert!((&direct.factors - &swapped.loadings).mapv(f64::abs).sum() < 1e-12);
        assert!((&direct.loadings - &swapped.factors).mapv(f64::abs).sum() < 1e-12);
    }

    #[test]
    fn test_explained_variance_keeps_full_spectrum() {
        let data = array![[3.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]];
        let output = svd_pca(data.view(), Some(1), None).unwrap();
        assert_eq!(output.factors.ncols(), 1);
        let variance = output.explained_variance.unwrap();
        assert_eq!(variance.len(), 3);
        assert!((variance[0] - 9.0 / 4.0).abs() < 1e-12);
        assert!((variance[2] - 1.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_fast_svd_needs_output_dimension() {
        let data = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0]];
        assert!(matches!(
            svd_pca(data.view(), None, Some(RandomizedSettings::default())),
            Err(MvaError::Configuration(_))
        ));
        let output = svd_pca(data.view(), Some(2), Some(RandomizedSettings::default())).unwrap();
        assert_eq!(output.explained_variance.unwrap().len(), 2);
    }

    #[test]
    fn test_complex_model_uses_plain_transpose() {
        let data = array![
            [Complex64::new(1.0, 1.0), Complex64::new(0.0, 2.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(2.0, -1.0), Complex64::new(1.0, 0.0), Complex64::new(0.0, -1.0)]
        ];
        let output = svd_pca(data.view(), None, None).unwrap();
        let diff = (&model(&output) - &data).mapv(|x| x.norm()).sum();
        assert!(diff < 1e-12);
    }
}
