use std::any::Any;

use ndarray::Zip;
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::Estimator;
use crate::Matrix;
use crate::error::{MvaError, Result};

const EPSILON: f64 = 1e-12;

/// Non-negative matrix factorisation `X ~ W H` by multiplicative updates
/// (Lee & Seung) on the Frobenius loss.
#[derive(Clone, Debug)]
pub struct NMF {
    pub components: Option<Matrix>,
    pub reconstruction_err: Option<f64>,
    pub n_iter: Option<usize>,
    n_components: Option<usize>,
    max_iter: usize,
    tol: f64,
    random_state: u64,
}

impl NMF {
    pub fn new() -> Self {
        Self {
            components: None,
            reconstruction_err: None,
            n_iter: None,
            n_components: None,
            max_iter: 200,
            tol: 1e-4,
            random_state: 0,
        }
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(MvaError::Shape(
                "input matrix must have at least one sample and one feature".to_string(),
            ));
        }
        if x.iter().any(|&v| v < 0.0 || !v.is_finite()) {
            return Err(MvaError::Configuration(
                "NMF requires finite non-negative data".to_string(),
            ));
        }
        let k = self.n_components.unwrap_or(n_samples.min(n_features));
        if k == 0 {
            return Err(MvaError::Configuration(
                "NMF needs at least one component".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let scale = (x.mean().unwrap_or(0.0) / k as f64).sqrt();
        let mut w = Matrix::random_using((n_samples, k), StandardNormal, &mut rng).mapv(|v: f64| v.abs() * scale);
        let mut h = Matrix::random_using((k, n_features), StandardNormal, &mut rng).mapv(|v: f64| v.abs() * scale);

        let initial_error = frobenius_error(x, &w, &h);
        let mut previous_error = initial_error;
        let mut iterations = self.max_iter;
        for iteration in 1..=self.max_iter {
            let numerator = w.t().dot(x);
            let denominator = w.t().dot(&w).dot(&h);
            Zip::from(&mut h)
                .and(&numerator)
                .and(&denominator)
                .for_each(|h, &n, &d| *h *= n / (d + EPSILON));

            let numerator = x.dot(&h.t());
            let denominator = w.dot(&h.dot(&h.t()));
            Zip::from(&mut w)
                .and(&numerator)
                .and(&denominator)
                .for_each(|w, &n, &d| *w *= n / (d + EPSILON));

            if iteration % 10 == 0 {
                let error = frobenius_error(x, &w, &h);
                if initial_error == 0.0 || (previous_error - error) / initial_error < self.tol {
                    iterations = iteration;
                    break;
                }
                previous_error = error;
            }
        }
        if iterations == self.max_iter {
            tracing::warn!(max_iter = self.max_iter, "NMF reached the iteration limit");
        }

        self.reconstruction_err = Some(frobenius_error(x, &w, &h));
        self.n_iter = Some(iterations);
        self.components = Some(h);
        Ok(w)
    }

    /// Projects new data onto the fitted components with `H` held fixed.
    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let h = self.components.as_ref().ok_or(MvaError::NotComputed("NMF.components"))?;
        if x.ncols() != h.ncols() {
            return Err(MvaError::Shape(format!(
                "number of features in X ({}) doesn't match training data ({})",
                x.ncols(),
                h.ncols()
            )));
        }
        let mut w = Matrix::from_elem((x.nrows(), h.nrows()), 1.0);
        let hht = h.dot(&h.t());
        let numerator = x.dot(&h.t());
        for _ in 0..self.max_iter {
            let denominator = w.dot(&hht);
            Zip::from(&mut w)
                .and(&numerator)
                .and(&denominator)
                .for_each(|w, &n, &d| *w *= n / (d + EPSILON));
        }
        Ok(w)
    }
}

impl Default for NMF {
    fn default() -> Self {
        Self::new()
    }
}

fn frobenius_error(x: &Matrix, w: &Matrix, h: &Matrix) -> f64 {
    (x - &w.dot(h)).mapv(|v| v * v).sum().sqrt()
}

impl Estimator for NMF {
    fn name(&self) -> &'static str {
        "NMF"
    }

    fn describe(&self) -> String {
        format!(
            "NMF(n_components={:?}, max_iter={}, tol={}, random_state={})",
            self.n_components, self.max_iter, self.tol, self.random_state
        )
    }

    fn set_n_components(&mut self, n_components: usize) {
        self.n_components = Some(n_components);
    }

    fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        NMF::fit_transform(self, x)
    }

    fn components(&self) -> Option<&Matrix> {
        self.components.as_ref()
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
    fn test_nmf_factors_are_non_negative() {
        let x = array![
            [1.0, 0.5, 0.0, 2.0],
            [0.0, 1.0, 3.0, 1.0],
            [2.0, 1.5, 3.0, 3.0],
            [1.0, 0.0, 0.5, 0.5]
        ];
        let mut nmf = NMF::new().n_components(2).max_iter(500);
        let w = nmf.fit_transform(&x).unwrap();
        assert_eq!(w.dim(), (4, 2));
        assert!(w.iter().all(|&v| v >= 0.0));
        assert!(nmf.components.as_ref().unwrap().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_nmf_recovers_exact_factorisation() {
        let w0 = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 0.5]];
        let h0 = array![[1.0, 2.0, 0.0], [0.0, 1.0, 3.0]];
        let x = w0.dot(&h0);
        let mut nmf = NMF::new().n_components(2).max_iter(5000).tol(0.0);
        nmf.fit_transform(&x).unwrap();
        let relative = nmf.reconstruction_err.unwrap() / x.mapv(|v| v * v).sum().sqrt();
        assert!(relative < 5e-2);
    }

    #[test]
    fn test_nmf_is_deterministic() {
        let x = array![[1.0, 2.0], [3.0, 1.0], [0.5, 0.5]];
        let a = NMF::new().n_components(1).random_state(7).fit_transform(&x).unwrap();
        let b = NMF::new().n_components(1).random_state(7).fit_transform(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_nmf_rejects_negative_data() {
        let x = array![[1.0, -2.0], [3.0, 1.0]];
        let mut nmf = NMF::new().n_components(1);
        assert!(matches!(nmf.fit_transform(&x), Err(MvaError::Configuration(_))));
    }
}
