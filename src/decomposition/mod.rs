//! Decomposition algorithms and the registry that dispatches between them.
//!
//! Every algorithm consumes the unfolded `(n_samples, n_features)` matrix
//! and produces factors `(n_features, k)` and loadings `(n_samples, k)` such
//! that `loadings . factors^T` models the data:
//!
//! - `svd`, `fast_svd`: exact and randomized SVD (real or complex data)
//! - `mlpca`, `fast_mlpca`: maximum-likelihood PCA for heteroscedastic noise
//! - `RPCA_GoDec`, `ORPCA`, `ORNMF`: robust low-rank plus sparse models
//! - `pca`, `truncated_svd`, `nmf`, `sparse_pca`, `mini_batch_sparse_pca`,
//!   `custom`: delegated `Estimator`s
//!
//! # Examples
//!
//! ```rust
//! use signal_mva::decomposition::{PCA, Estimator};
//! use ndarray::array;
//!
//! let x = array![
//!     [1.0, 2.0, 3.0],
//!     [4.0, 5.0, 6.0],
//!     [7.0, 8.0, 10.0]
//! ];
//!
//! let mut pca = PCA::new().n_components(2);
//! let loadings = pca.fit_transform(&x).unwrap();
//! assert_eq!(loadings.dim(), (3, 2));
//! assert!(pca.explained_variance_ratio.is_some());
//! ```

mod estimator;
mod mlpca;
mod nmf;
mod options;
mod ornmf;
mod orpca;
mod pca;
mod poissonian;
mod rpca;
mod sparse_pca;
mod svd_pca;
mod truncated_svd;

pub use estimator::Estimator;
pub use mlpca::{Mlpca, mlpca};
pub use nmf::NMF;
pub use options::{DecompositionOptions, NoiseModel};
pub use ornmf::ornmf;
pub use orpca::orpca;
pub use pca::{PCA, SvdSolver};
pub use poissonian::PoissonianWeights;
pub use rpca::rpca_godec;
pub use sparse_pca::{MiniBatchSparsePCA, SparsePCA};
pub use svd_pca::svd_pca;
pub use truncated_svd::{TruncatedSVD, TruncatedSvdAlgorithm};

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{MvaError, Result};
use crate::linalg::{Field, RandomizedSettings, Svd};
use crate::{Matrix, Vector};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    #[serde(rename = "svd")]
    Svd,
    #[serde(rename = "fast_svd")]
    FastSvd,
    #[serde(rename = "mlpca")]
    Mlpca,
    #[serde(rename = "fast_mlpca")]
    FastMlpca,
    #[serde(rename = "RPCA_GoDec")]
    RpcaGoDec,
    #[serde(rename = "ORPCA")]
    Orpca,
    #[serde(rename = "ORNMF")]
    Ornmf,
    #[serde(rename = "pca", alias = "sklearn_pca")]
    Pca,
    #[serde(rename = "truncated_svd")]
    TruncatedSvd,
    #[serde(rename = "nmf")]
    Nmf,
    #[serde(rename = "sparse_pca")]
    SparsePca,
    #[serde(rename = "mini_batch_sparse_pca")]
    MiniBatchSparsePca,
    #[serde(rename = "custom")]
    Custom,
}

impl Algorithm {
    pub const ALL: [Algorithm; 13] = [
        Algorithm::Svd,
        Algorithm::FastSvd,
        Algorithm::Mlpca,
        Algorithm::FastMlpca,
        Algorithm::RpcaGoDec,
        Algorithm::Orpca,
        Algorithm::Ornmf,
        Algorithm::Pca,
        Algorithm::TruncatedSvd,
        Algorithm::Nmf,
        Algorithm::SparsePca,
        Algorithm::MiniBatchSparsePca,
        Algorithm::Custom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Svd => "svd",
            Algorithm::FastSvd => "fast_svd",
            Algorithm::Mlpca => "mlpca",
            Algorithm::FastMlpca => "fast_mlpca",
            Algorithm::RpcaGoDec => "RPCA_GoDec",
            Algorithm::Orpca => "ORPCA",
            Algorithm::Ornmf => "ORNMF",
            Algorithm::Pca => "pca",
            Algorithm::TruncatedSvd => "truncated_svd",
            Algorithm::Nmf => "nmf",
            Algorithm::SparsePca => "sparse_pca",
            Algorithm::MiniBatchSparsePca => "mini_batch_sparse_pca",
            Algorithm::Custom => "custom",
        }
    }

    /// The component count cannot be deduced and must be given.
    pub fn requires_output_dimension(self) -> bool {
        matches!(
            self,
            Algorithm::FastSvd
                | Algorithm::Mlpca
                | Algorithm::FastMlpca
                | Algorithm::RpcaGoDec
                | Algorithm::Orpca
                | Algorithm::Ornmf
        )
    }

    /// Stores an elbow-based `number_significant_components`.
    pub fn estimates_rank(self) -> bool {
        matches!(
            self,
            Algorithm::Svd
                | Algorithm::FastSvd
                | Algorithm::Mlpca
                | Algorithm::FastMlpca
                | Algorithm::Pca
                | Algorithm::TruncatedSvd
        )
    }

    pub fn is_delegate(self) -> bool {
        matches!(
            self,
            Algorithm::Pca
                | Algorithm::TruncatedSvd
                | Algorithm::Nmf
                | Algorithm::SparsePca
                | Algorithm::MiniBatchSparsePca
                | Algorithm::Custom
        )
    }

    pub fn supports_complex(self) -> bool {
        matches!(self, Algorithm::Svd | Algorithm::FastSvd)
    }

    pub fn uses_noise_model(self) -> bool {
        matches!(self, Algorithm::Mlpca | Algorithm::FastMlpca)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = MvaError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "sklearn_pca" {
            return Ok(Algorithm::Pca);
        }
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| MvaError::UnknownAlgorithm(s.to_string()))
    }
}

/// Low-rank and sparse parts found by a robust algorithm, in the
/// `(n_samples, n_features)` layout.
#[derive(Clone, Debug, PartialEq)]
pub struct RobustInfo {
    pub low_rank: Matrix,
    pub sparse_error: Matrix,
    pub iterations: usize,
}

/// Algorithm-specific diagnostics returned when `return_info` is set.
#[derive(Debug)]
pub enum DecompositionInfo {
    Robust(RobustInfo),
    Estimator(Box<dyn Estimator>),
}

impl DecompositionInfo {
    pub fn robust(&self) -> Option<&RobustInfo> {
        match self {
            DecompositionInfo::Robust(info) => Some(info),
            DecompositionInfo::Estimator(_) => None,
        }
    }

    pub fn estimator(&self) -> Option<&(dyn Estimator + 'static)> {
        match self {
            DecompositionInfo::Estimator(estimator) => Some(estimator.as_ref()),
            DecompositionInfo::Robust(_) => None,
        }
    }
}

/// Result of one algorithm run on an unfolded matrix.
#[derive(Debug)]
pub struct DecompositionOutput<T> {
    pub factors: Array2<T>,
    pub loadings: Array2<T>,
    /// May hold more values than components (full spectrum of `svd`).
    pub explained_variance: Option<Vector>,
    /// Set by estimators that normalise against the total data variance.
    pub explained_variance_ratio: Option<Vector>,
    pub mean: Option<Array1<T>>,
    pub info: Option<DecompositionInfo>,
}

impl<T: Field> DecompositionOutput<T> {
    fn from_svd(svd: Svd<T>, n_samples: usize) -> Self {
        let (factors, loadings) = svd_pca::factors_and_loadings(svd.u, &svd.singular_values, svd.v, false);
        Self {
            factors,
            loadings,
            explained_variance: Some(svd.singular_values.mapv(|s| s * s / n_samples as f64)),
            explained_variance_ratio: None,
            mean: None,
            info: None,
        }
    }

    fn from_real(
        factors: Matrix,
        loadings: Matrix,
        explained_variance: Option<Vector>,
        info: Option<DecompositionInfo>,
    ) -> Self {
        Self {
            factors: T::from_real_matrix(factors),
            loadings: T::from_real_matrix(loadings),
            explained_variance,
            explained_variance_ratio: None,
            mean: None,
            info,
        }
    }
}

pub(crate) fn soft_threshold(x: f64, threshold: f64) -> f64 {
    x.signum() * (x.abs() - threshold).max(0.0)
}

/// Checks the options against a `(n_samples, n_features)` matrix of `T` and
/// returns the requested component count.
pub fn validate<T: Field>(options: &DecompositionOptions, dim: (usize, usize)) -> Result<Option<usize>> {
    let algorithm = options.algorithm;
    if T::IS_COMPLEX && !algorithm.supports_complex() {
        return Err(MvaError::real_only(algorithm.name()));
    }
    let rank = options.output_dimension;
    if rank.is_none() && algorithm.requires_output_dimension() {
        return Err(MvaError::missing_output_dimension(algorithm.name()));
    }
    let (n_samples, n_features) = dim;
    if n_samples == 0 || n_features == 0 {
        return Err(MvaError::Shape(format!(
            "cannot decompose an empty {n_samples}x{n_features} matrix"
        )));
    }
    if let Some(k) = rank {
        if k == 0 {
            return Err(MvaError::Configuration(
                "the output_dimension must be at least 1".to_string(),
            ));
        }
        if k > n_samples.min(n_features) {
            return Err(MvaError::Shape(format!(
                "output_dimension {k} exceeds the rank bound of a {n_samples}x{n_features} matrix"
            )));
        }
    }
    if algorithm == Algorithm::Custom && options.estimator.is_none() {
        return Err(MvaError::Configuration(
            "the `custom` algorithm requires an estimator".to_string(),
        ));
    }
    Ok(rank)
}

/// Runs the configured algorithm on an unfolded matrix.
///
/// `variance` is the per-element noise variance used by `mlpca` and
/// `fast_mlpca`. When `options.print_info` is set the progress report is
/// written to `report` before any computation.
pub fn run<T: Field>(
    data: ArrayView2<'_, T>,
    variance: Option<&Matrix>,
    options: &mut DecompositionOptions,
    report: &mut dyn Write,
) -> Result<DecompositionOutput<T>> {
    let algorithm = options.algorithm;
    let rank = validate::<T>(options, data.dim())?;
    let (n_samples, n_features) = data.dim();

    let estimator = if algorithm.is_delegate() {
        Some(build_estimator(options, rank, data.dim())?)
    } else {
        None
    };
    if options.print_info {
        write_report(report, options, estimator.as_deref())?;
    }

    let settings = RandomizedSettings {
        seed: options.seed,
        ..RandomizedSettings::default()
    };
    if algorithm.supports_complex() {
        let fast = (algorithm == Algorithm::FastSvd).then_some(settings);
        return svd_pca(data, rank, fast);
    }

    let x = T::to_real_matrix(data).ok_or_else(|| MvaError::real_only(algorithm.name()))?;
    let return_info = options.return_info;
    match algorithm {
        Algorithm::Mlpca | Algorithm::FastMlpca => {
            let k = rank.ok_or_else(|| MvaError::missing_output_dimension(algorithm.name()))?;
            let variance = match variance {
                Some(variance) => variance.clone(),
                None => x.clone(),
            };
            let fast = (algorithm == Algorithm::FastMlpca).then_some(settings);
            let result = mlpca(
                &x,
                &variance,
                k,
                options.tol.unwrap_or(1e-10),
                options.max_iter.unwrap_or(50_000),
                fast,
            )?;
            let svd = Svd {
                u: T::from_real_matrix(result.u),
                singular_values: result.singular_values,
                v: T::from_real_matrix(result.v),
            };
            Ok(DecompositionOutput::from_svd(svd, n_samples))
        }
        Algorithm::RpcaGoDec | Algorithm::Orpca => {
            let k = rank.ok_or_else(|| MvaError::missing_output_dimension(algorithm.name()))?;
            let info = if algorithm == Algorithm::RpcaGoDec {
                let lambda = options.lambda1.unwrap_or(1.0 / (n_features as f64).sqrt());
                rpca_godec(
                    &x,
                    k,
                    lambda,
                    options.tol.unwrap_or(1e-6),
                    options.max_iter.unwrap_or(1000),
                    settings,
                )?
            } else {
                orpca(
                    &x,
                    k,
                    options.lambda1.unwrap_or(0.1),
                    options.lambda2.unwrap_or(1.0),
                    options.seed,
                )?
            };
            let svd = Svd::compute(info.low_rank.view())?.truncate(k);
            let mut output = DecompositionOutput::from_svd(
                Svd {
                    u: T::from_real_matrix(svd.u),
                    singular_values: svd.singular_values,
                    v: T::from_real_matrix(svd.v),
                },
                n_samples,
            );
            output.info = return_info.then_some(DecompositionInfo::Robust(info));
            Ok(output)
        }
        Algorithm::Ornmf => {
            let k = rank.ok_or_else(|| MvaError::missing_output_dimension(algorithm.name()))?;
            let (w, h, info) = ornmf(&x, k, options.lambda1.unwrap_or(1.0), options.seed)?;
            let info = return_info.then_some(DecompositionInfo::Robust(info));
            Ok(DecompositionOutput::from_real(w, h, None, info))
        }
        _ => {
            let mut estimator = estimator.ok_or_else(|| {
                MvaError::Configuration(format!("`{algorithm}` has no estimator"))
            })?;
            let loadings = estimator.fit_transform(&x)?;
            let components = estimator
                .components()
                .ok_or(MvaError::NotComputed("components"))?;
            if components.dim() != (loadings.ncols(), n_features) {
                return Err(MvaError::Shape(format!(
                    "estimator `{}` returned {:?} components for {} features",
                    estimator.name(),
                    components.dim(),
                    n_features
                )));
            }
            let factors = components.t().to_owned();
            let explained_variance = estimator.explained_variance().cloned();
            let explained_variance_ratio = estimator.explained_variance_ratio().cloned();
            let mean = estimator.mean().map(|m| m.mapv(T::from_real));
            let mut output = DecompositionOutput::from_real(factors, loadings, explained_variance, None);
            output.explained_variance_ratio = explained_variance_ratio;
            output.mean = mean;
            output.info = return_info.then_some(DecompositionInfo::Estimator(estimator));
            Ok(output)
        }
    }
}

fn build_estimator(
    options: &mut DecompositionOptions,
    rank: Option<usize>,
    dim: (usize, usize),
) -> Result<Box<dyn Estimator>> {
    let seed = options.seed;
    let mut estimator: Box<dyn Estimator> = match options.algorithm {
        Algorithm::Pca => Box::new(PCA::new().random_state(seed)),
        Algorithm::TruncatedSvd => {
            Box::new(TruncatedSVD::new(rank.unwrap_or(dim.0.min(dim.1))).random_state(seed))
        }
        Algorithm::Nmf => {
            let mut nmf = NMF::new().random_state(seed);
            if let Some(max_iter) = options.max_iter {
                nmf = nmf.max_iter(max_iter);
            }
            if let Some(tol) = options.tol {
                nmf = nmf.tol(tol);
            }
            Box::new(nmf)
        }
        Algorithm::SparsePca => {
            let mut spca = SparsePCA::new().alpha(options.lambda1.unwrap_or(1.0));
            if let Some(max_iter) = options.max_iter {
                spca = spca.max_iter(max_iter);
            }
            if let Some(tol) = options.tol {
                spca = spca.tol(tol);
            }
            Box::new(spca)
        }
        Algorithm::MiniBatchSparsePca => Box::new(
            MiniBatchSparsePCA::new()
                .alpha(options.lambda1.unwrap_or(1.0))
                .random_state(seed),
        ),
        Algorithm::Custom => options.estimator.take().ok_or_else(|| {
            MvaError::Configuration("the `custom` algorithm requires an estimator".to_string())
        })?,
        other => {
            return Err(MvaError::Configuration(format!(
                "`{other}` is not a delegated estimator"
            )));
        }
    };
    if let Some(k) = rank {
        estimator.set_n_components(k);
    }
    Ok(estimator)
}

fn write_report(
    out: &mut dyn Write,
    options: &DecompositionOptions,
    estimator: Option<&dyn Estimator>,
) -> Result<()> {
    let dimension = options
        .output_dimension
        .map_or_else(|| "None".to_string(), |k| k.to_string());
    writeln!(out, "Decomposition info:")?;
    writeln!(out, "  normalize_poissonian_noise={}", options.normalize_poissonian_noise)?;
    writeln!(out, "  algorithm={}", options.algorithm)?;
    writeln!(out, "  output_dimension={dimension}")?;
    if let Some(estimator) = estimator {
        writeln!(out, "Delegate estimator:")?;
        writeln!(out, "  {}", estimator.describe())?;
    }
    out.flush()?;
    Ok(())
}
