use std::any::Any;
use std::fmt::Debug;

use crate::error::Result;
use crate::{Matrix, Vector};

/// Fit/transform decomposition of a real `(n_samples, n_features)` matrix.
///
/// `fit_transform` returns the loadings `(n_samples, k)` and afterwards
/// `components` holds the `(k, n_features)` basis, so that
/// `loadings . components (+ mean)` approximates the input.
pub trait Estimator: Debug + Send {
    fn name(&self) -> &'static str;

    /// One-line parameter listing used in progress reports.
    fn describe(&self) -> String;

    fn set_n_components(&mut self, n_components: usize);

    fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix>;

    fn components(&self) -> Option<&Matrix>;

    fn explained_variance(&self) -> Option<&Vector> {
        None
    }

    fn explained_variance_ratio(&self) -> Option<&Vector> {
        None
    }

    /// Per-feature mean removed before fitting, for centred estimators.
    fn mean(&self) -> Option<&Vector> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

impl dyn Estimator {
    pub fn downcast_ref<E: Estimator + 'static>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}
