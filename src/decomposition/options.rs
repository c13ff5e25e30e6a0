use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use super::{Algorithm, Estimator};
use crate::Matrix;
use crate::error::{MvaError, Result};
use crate::signal::Unfolding;

/// Per-element noise variance handed to `mlpca` and `fast_mlpca`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseModel {
    /// Variance equals the counts themselves.
    Poissonian,
    /// Explicit variance with the same shape as the signal data.
    Variance(ArrayD<f64>),
    /// Variance as a polynomial of the data, lowest order first.
    Polynomial(Vec<f64>),
}

impl NoiseModel {
    /// Variance matrix matching the unfolded `data`.
    ///
    /// Every variance must be strictly positive, since the likelihood
    /// weights are its reciprocals.
    pub fn variance(&self, data: &Matrix, unfolding: &Unfolding) -> Result<Matrix> {
        let variance = match self {
            NoiseModel::Poissonian => data.clone(),
            NoiseModel::Variance(variance) => {
                if variance.shape() != unfolding.shape() {
                    return Err(MvaError::Shape(format!(
                        "noise variance has shape {:?}, the signal has shape {:?}",
                        variance.shape(),
                        unfolding.shape()
                    )));
                }
                unfolding.unfold(variance.view())?
            }
            NoiseModel::Polynomial(coefficients) => data.mapv(|x| {
                coefficients
                    .iter()
                    .rev()
                    .fold(0.0, |acc, &c| acc * x + c)
            }),
        };
        if variance.iter().any(|&v| v <= 0.0 || !v.is_finite()) {
            return Err(MvaError::Configuration(
                "the noise variance must be strictly positive everywhere".to_string(),
            ));
        }
        Ok(variance)
    }
}

/// Settings of one decomposition run.
///
/// ```rust
/// use signal_mva::decomposition::{Algorithm, DecompositionOptions};
///
/// let options = DecompositionOptions::new()
///     .algorithm(Algorithm::Mlpca)
///     .output_dimension(3)
///     .print_info(false);
/// assert_eq!(options.output_dimension, Some(3));
/// ```
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionOptions {
    pub algorithm: Algorithm,
    pub output_dimension: Option<usize>,
    pub normalize_poissonian_noise: bool,
    pub return_info: bool,
    pub print_info: bool,
    pub noise_model: Option<NoiseModel>,
    pub seed: u64,
    pub tol: Option<f64>,
    pub max_iter: Option<usize>,
    /// Sparsity weight: GoDec threshold, ORPCA and ORNMF `lambda1`,
    /// sparse PCA `alpha`.
    pub lambda1: Option<f64>,
    /// ORPCA outlier threshold.
    pub lambda2: Option<f64>,
    /// Consumed by `Algorithm::Custom`.
    #[serde(skip)]
    pub estimator: Option<Box<dyn Estimator>>,
}

impl Default for DecompositionOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Svd,
            output_dimension: None,
            normalize_poissonian_noise: false,
            return_info: false,
            print_info: true,
            noise_model: None,
            seed: 0,
            tol: None,
            max_iter: None,
            lambda1: None,
            lambda2: None,
            estimator: None,
        }
    }
}

impl DecompositionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads options from JSON; absent keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn output_dimension(mut self, output_dimension: usize) -> Self {
        self.output_dimension = Some(output_dimension);
        self
    }

    pub fn normalize_poissonian_noise(mut self, normalize: bool) -> Self {
        self.normalize_poissonian_noise = normalize;
        self
    }

    pub fn return_info(mut self, return_info: bool) -> Self {
        self.return_info = return_info;
        self
    }

    pub fn print_info(mut self, print_info: bool) -> Self {
        self.print_info = print_info;
        self
    }

    pub fn noise_model(mut self, noise_model: NoiseModel) -> Self {
        self.noise_model = Some(noise_model);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    pub fn lambda1(mut self, lambda1: f64) -> Self {
        self.lambda1 = Some(lambda1);
        self
    }

    pub fn lambda2(mut self, lambda2: f64) -> Self {
        self.lambda2 = Some(lambda2);
        self
    }

    pub fn estimator(mut self, estimator: Box<dyn Estimator>) -> Self {
        self.algorithm = Algorithm::Custom;
        self.estimator = Some(estimator);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{IxDyn, array};

    #[test]
    fn test_defaults() {
        let options = DecompositionOptions::default();
        assert_eq!(options.algorithm, Algorithm::Svd);
        assert!(options.print_info);
        assert!(!options.return_info);
        assert!(options.output_dimension.is_none());
    }

    #[test]
    fn test_from_json_fills_missing_keys() {
        let options = DecompositionOptions::from_json(
            r#"{"algorithm": "RPCA_GoDec", "output_dimension": 3, "lambda1": 0.5}"#,
        )
        .unwrap();
        assert_eq!(options.algorithm, Algorithm::RpcaGoDec);
        assert_eq!(options.output_dimension, Some(3));
        assert_eq!(options.lambda1, Some(0.5));
        assert!(options.print_info);
    }

    #[test]
    fn test_from_json_rejects_unknown_algorithm() {
        let err = DecompositionOptions::from_json(r#"{"algorithm": "kmeans"}"#).unwrap_err();
        assert!(matches!(err, MvaError::Archive(_)));
    }

    #[test]
    fn test_polynomial_noise_model() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let unfolding = Unfolding::new(&[2, 2], &[true, false]).unwrap();
        let variance = NoiseModel::Polynomial(vec![1.0, 0.0, 2.0])
            .variance(&data, &unfolding)
            .unwrap();
        assert_eq!(variance, array![[3.0, 9.0], [19.0, 33.0]]);
    }

    #[test]
    fn test_explicit_variance_is_unfolded() {
        // navigation is the second array axis
        let unfolding = Unfolding::new(&[2, 3], &[false, true]).unwrap();
        let raw = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let data = Matrix::ones((3, 2));
        let variance = NoiseModel::Variance(raw).variance(&data, &unfolding).unwrap();
        assert_eq!(variance, array![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]);
    }

    #[test]
    fn test_non_positive_variance_is_rejected() {
        let data = array![[1.0, 0.0], [3.0, 4.0]];
        let unfolding = Unfolding::new(&[2, 2], &[true, false]).unwrap();
        assert!(matches!(
            NoiseModel::Poissonian.variance(&data, &unfolding),
            Err(MvaError::Configuration(_))
        ));
    }
}
