use std::any::Any;

use ndarray::{Axis, s};
use serde::{Deserialize, Serialize};

use super::Estimator;
use crate::error::{MvaError, Result};
use crate::linalg::{RandomizedSettings, Svd, randomized_svd};
use crate::{Matrix, Vector};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvdSolver {
    /// Randomized for large matrices when few components are kept, full otherwise.
    Auto,
    Full,
    Randomized,
}

/// Principal component analysis of mean-centred data.
#[derive(Clone, Debug)]
pub struct PCA {
    pub components: Option<Matrix>,
    pub explained_variance: Option<Vector>,
    pub explained_variance_ratio: Option<Vector>,
    pub singular_values: Option<Vector>,
    pub mean: Option<Vector>,
    n_components: Option<usize>,
    svd_solver: SvdSolver,
    random_state: u64,
}

impl PCA {
    pub fn new() -> Self {
        Self {
            components: None,
            explained_variance: None,
            explained_variance_ratio: None,
            singular_values: None,
            mean: None,
            n_components: None,
            svd_solver: SvdSolver::Auto,
            random_state: 0,
        }
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    pub fn svd_solver(mut self, solver: SvdSolver) -> Self {
        self.svd_solver = solver;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(MvaError::Shape(
                "input matrix must have at least one sample and one feature".to_string(),
            ));
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();
        let max_components = n_features.min(n_samples);
        let n_components = self.n_components.unwrap_or(max_components);

        if n_components == 0 || n_components > max_components {
            return Err(MvaError::Shape(format!(
                "n_components={} must be between 1 and min(n_samples, n_features)={}",
                n_components, max_components
            )));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| MvaError::Shape("cannot average an empty matrix".to_string()))?;
        let x_centered = x - &mean.view().insert_axis(Axis(0));
        let dof = (n_samples.max(2) - 1) as f64;

        let randomized = match self.svd_solver {
            SvdSolver::Full => false,
            SvdSolver::Randomized => true,
            SvdSolver::Auto => {
                max_components >= 500 && (n_components as f64) < 0.8 * max_components as f64
            }
        };

        let (svd, total_variance) = if randomized {
            let settings = RandomizedSettings {
                seed: self.random_state,
                ..RandomizedSettings::default()
            };
            let svd = randomized_svd(x_centered.view(), n_components, settings)?;
            let total = x_centered.iter().map(|v| v * v).sum::<f64>() / dof;
            (svd, total)
        } else {
            let svd = Svd::compute(x_centered.view())?;
            let total = svd.singular_values.iter().map(|s| s * s).sum::<f64>() / dof;
            (svd.truncate(n_components), total)
        };

        let singular_values = svd.singular_values.slice(s![..n_components]).to_owned();
        let explained_variance = singular_values.mapv(|s| s * s / dof);
        let explained_variance_ratio = if total_variance > 0.0 {
            &explained_variance / total_variance
        } else {
            Vector::zeros(explained_variance.len())
        };

        self.components = Some(svd.v.t().to_owned());
        self.singular_values = Some(singular_values);
        self.explained_variance = Some(explained_variance);
        self.explained_variance_ratio = Some(explained_variance_ratio);
        self.mean = Some(mean);

        Ok(())
    }

    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let components = self.components.as_ref().ok_or(MvaError::NotComputed("PCA.components"))?;
        let mean = self.mean.as_ref().ok_or(MvaError::NotComputed("PCA.mean"))?;

        if x.ncols() != mean.len() {
            return Err(MvaError::Shape(format!(
                "number of features in X ({}) doesn't match training data ({})",
                x.ncols(),
                mean.len()
            )));
        }

        let x_centered = x - &mean.view().insert_axis(Axis(0));
        Ok(x_centered.dot(&components.t()))
    }

    pub fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        self.fit(x)?;
        self.transform(x)
    }

    pub fn inverse_transform(&self, x: &Matrix) -> Result<Matrix> {
        let components = self.components.as_ref().ok_or(MvaError::NotComputed("PCA.components"))?;
        let mean = self.mean.as_ref().ok_or(MvaError::NotComputed("PCA.mean"))?;

        if x.ncols() != components.nrows() {
            return Err(MvaError::Shape(format!(
                "number of columns in X ({}) doesn't match number of components ({})",
                x.ncols(),
                components.nrows()
            )));
        }

        Ok(x.dot(components) + &mean.view().insert_axis(Axis(0)))
    }

    /// Negative mean squared reconstruction error (higher is better).
    pub fn score(&self, x: &Matrix) -> Result<f64> {
        let transformed = self.transform(x)?;
        let reconstructed = self.inverse_transform(&transformed)?;
        let diff = x - &reconstructed;
        Ok(-diff.mapv(|v| v * v).mean().unwrap_or(0.0))
    }
}

impl Default for PCA {
    fn default() -> Self {
        Self::new()
    }
}

impl Estimator for PCA {
    fn name(&self) -> &'static str {
        "PCA"
    }

    fn describe(&self) -> String {
        format!(
            "PCA(n_components={:?}, svd_solver={:?}, random_state={})",
            self.n_components, self.svd_solver, self.random_state
        )
    }

    fn set_n_components(&mut self, n_components: usize) {
        self.n_components = Some(n_components);
    }

    fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        PCA::fit_transform(self, x)
    }

    fn components(&self) -> Option<&Matrix> {
        self.components.as_ref()
    }

    fn explained_variance(&self) -> Option<&Vector> {
        self.explained_variance.as_ref()
    }

    fn explained_variance_ratio(&self) -> Option<&Vector> {
        self.explained_variance_ratio.as_ref()
    }

    fn mean(&self) -> Option<&Vector> {
        self.mean.as_ref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pca_basic() {
        let x = array![
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0],
            [10.0, 11.0, 12.0]
        ];

        let mut pca = PCA::new().n_components(2);
        let transformed = pca.fit_transform(&x).unwrap();

        assert_eq!(transformed.shape(), &[4, 2]);
        assert!(pca.components.is_some());
        assert!(pca.explained_variance.is_some());
        assert!(pca.explained_variance_ratio.is_some());
        assert_eq!(pca.mean.as_ref().unwrap(), &array![5.5, 6.5, 7.5]);
    }

    #[test]
    fn test_pca_reconstruction() {
        let x = array![
            [1.0, 0.0],
            [0.0, 1.0],
            [-1.0, 0.0],
            [0.0, -1.0]
        ];

        let mut pca = PCA::new().n_components(2);
        let transformed = pca.fit_transform(&x).unwrap();
        let reconstructed = pca.inverse_transform(&transformed).unwrap();

        let diff = &x - &reconstructed;
        let max_error = diff.mapv(|x| x.abs()).into_iter().fold(0.0, f64::max);
        assert!(max_error < 1e-10);
    }

    #[test]
    fn test_pca_explained_variance() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];

        let mut pca = PCA::new();
        pca.fit(&x).unwrap();

        let ratio = pca.explained_variance_ratio.as_ref().unwrap();
        assert!((ratio.sum() - 1.0).abs() < 1e-10);
        assert!(ratio[0] > 1.0 - 1e-10);
        // variance along the diagonal: 2 * var([1, 2, 3, 4])
        let variance = pca.explained_variance.as_ref().unwrap();
        assert!((variance[0] - 2.0 * 5.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_pca_ratio_uses_total_variance_when_truncated() {
        let x = array![
            [2.0, 0.0, 0.0],
            [-2.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0]
        ];
        let mut pca = PCA::new().n_components(1).svd_solver(SvdSolver::Full);
        pca.fit(&x).unwrap();
        let ratio = pca.explained_variance_ratio.as_ref().unwrap();
        assert!((ratio[0] - 0.8).abs() < 1e-10);
    }

    #[test]
    fn test_pca_randomized_matches_full() {
        let x = array![
            [2.0, 1.0, 0.5, 0.0],
            [1.0, 3.0, 1.0, 1.0],
            [0.0, 1.0, 4.0, 2.0],
            [1.0, 1.0, 1.0, 1.0],
            [0.0, 2.0, 1.0, 5.0],
            [3.0, 0.0, 2.0, 1.0]
        ];
        let mut full = PCA::new().n_components(2).svd_solver(SvdSolver::Full);
        let mut fast = PCA::new().n_components(2).svd_solver(SvdSolver::Randomized);
        full.fit(&x).unwrap();
        fast.fit(&x).unwrap();
        let a = full.explained_variance.unwrap();
        let b = fast.explained_variance.unwrap();
        assert!((&a - &b).mapv(f64::abs).sum() < 1e-8);
    }

    #[test]
    fn test_pca_invalid_components() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let mut pca = PCA::new().n_components(5);

        assert!(matches!(pca.fit(&x), Err(MvaError::Shape(_))));
    }

    #[test]
    fn test_pca_transform_without_fit() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let pca = PCA::new();

        assert!(matches!(pca.transform(&x), Err(MvaError::NotComputed(_))));
    }

    #[test]
    fn test_pca_dimension_mismatch() {
        let x_train = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let x_test = array![[1.0, 2.0], [3.0, 4.0]];

        let mut pca = PCA::new();
        pca.fit(&x_train).unwrap();

        assert!(pca.transform(&x_test).is_err());
    }

    #[test]
    fn test_pca_single_component() {
        let x = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [3.0, 6.0, 9.0]];

        let mut pca = PCA::new().n_components(1);
        let transformed = pca.fit_transform(&x).unwrap();

        assert_eq!(transformed.shape(), &[3, 1]);
        let ratio = pca.explained_variance_ratio.as_ref().unwrap();
        assert!(ratio[0] > 0.9);
    }
}
