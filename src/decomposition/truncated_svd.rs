use std::any::Any;

use ndarray::{Axis, s};
use serde::{Deserialize, Serialize};

use super::Estimator;
use crate::error::{MvaError, Result};
use crate::linalg::{RandomizedSettings, Svd, randomized_svd};
use crate::{Matrix, Vector};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncatedSvdAlgorithm {
    Randomized,
    Exact,
}

/// Rank-`k` SVD of uncentred data.
#[derive(Clone, Debug)]
pub struct TruncatedSVD {
    pub components: Option<Matrix>,
    pub explained_variance: Option<Vector>,
    pub explained_variance_ratio: Option<Vector>,
    pub singular_values: Option<Vector>,
    n_components: usize,
    algorithm: TruncatedSvdAlgorithm,
    n_iter: usize,
    random_state: u64,
}

impl TruncatedSVD {
    pub fn new(n_components: usize) -> Self {
        Self {
            components: None,
            explained_variance: None,
            explained_variance_ratio: None,
            singular_values: None,
            n_components,
            algorithm: TruncatedSvdAlgorithm::Randomized,
            n_iter: 5,
            random_state: 0,
        }
    }

    pub fn algorithm(mut self, algorithm: TruncatedSvdAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        self.fit_transform(x).map(|_| ())
    }

    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let components = self
            .components
            .as_ref()
            .ok_or(MvaError::NotComputed("TruncatedSVD.components"))?;

        if x.ncols() != components.ncols() {
            return Err(MvaError::Shape(format!(
                "number of features in X ({}) doesn't match training data ({})",
                x.ncols(),
                components.ncols()
            )));
        }

        Ok(x.dot(&components.t()))
    }

    pub fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(MvaError::Shape(
                "input matrix must have at least one sample and one feature".to_string(),
            ));
        }

        let (n_samples, n_features) = x.dim();
        let k = self.n_components;
        if k == 0 || k > n_samples.min(n_features) {
            return Err(MvaError::Shape(format!(
                "n_components={} must be between 1 and min(n_samples, n_features)={}",
                k,
                n_samples.min(n_features)
            )));
        }

        let svd = match self.algorithm {
            TruncatedSvdAlgorithm::Exact => Svd::compute(x.view())?.truncate(k),
            TruncatedSvdAlgorithm::Randomized => {
                let settings = RandomizedSettings {
                    n_power_iterations: self.n_iter,
                    seed: self.random_state,
                    ..RandomizedSettings::default()
                };
                randomized_svd(x.view(), k, settings)?
            }
        };

        let singular_values = svd.singular_values.slice(s![..k]).to_owned();
        let mut transformed = svd.u.clone();
        for (mut column, &sigma) in transformed.axis_iter_mut(Axis(1)).zip(singular_values.iter()) {
            column *= sigma;
        }

        // variances of the projected data against the variance of the raw features
        let explained_variance = transformed.var_axis(Axis(0), 0.0);
        let total_variance = x.var_axis(Axis(0), 0.0).sum();
        let explained_variance_ratio = if total_variance > 0.0 {
            &explained_variance / total_variance
        } else {
            Vector::zeros(k)
        };

        self.components = Some(svd.v.t().to_owned());
        self.singular_values = Some(singular_values);
        self.explained_variance = Some(explained_variance);
        self.explained_variance_ratio = Some(explained_variance_ratio);

        Ok(transformed)
    }

    pub fn inverse_transform(&self, x: &Matrix) -> Result<Matrix> {
        let components = self
            .components
            .as_ref()
            .ok_or(MvaError::NotComputed("TruncatedSVD.components"))?;

        if x.ncols() != components.nrows() {
            return Err(MvaError::Shape(format!(
                "number of columns in X ({}) doesn't match number of components ({})",
                x.ncols(),
                components.nrows()
            )));
        }

        Ok(x.dot(components))
    }
}

impl Estimator for TruncatedSVD {
    fn name(&self) -> &'static str {
        "TruncatedSVD"
    }

    fn describe(&self) -> String {
        format!(
            "TruncatedSVD(n_components={}, algorithm={:?}, n_iter={}, random_state={})",
            self.n_components, self.algorithm, self.n_iter, self.random_state
        )
    }

    fn set_n_components(&mut self, n_components: usize) {
        self.n_components = n_components;
    }

    fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        TruncatedSVD::fit_transform(self, x)
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

    fn as_any(&self) -> &dyn Any {
        self
    }
}
