//! Blind source separation of decomposition components.
//!
//! The first `n_components` factors (or loadings) are treated as mixtures of
//! independent sources and unmixed with `FastICA`. The other side of the pair
//! is transformed with the inverse so the product, and hence the model, is
//! unchanged. The mixtures are whitened without centring: decomposition
//! factors often span a flat background, which centring would null.

mod ica;

pub use ica::FastICA;

use std::io::Write;

use ndarray::s;
use serde::{Deserialize, Serialize};

use crate::Matrix;
use crate::error::{MvaError, Result};
use crate::linalg::inverse;

pub const FAST_ICA: &str = "fast_ica";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BssOptions {
    /// Defaults to the decomposition's `output_dimension`, then to its
    /// number of significant components.
    pub n_components: Option<usize>,
    pub on_loadings: bool,
    pub max_iter: usize,
    pub tol: f64,
    pub seed: u64,
    pub print_info: bool,
}

impl Default for BssOptions {
    fn default() -> Self {
        Self {
            n_components: None,
            on_loadings: false,
            max_iter: 200,
            tol: 1e-4,
            seed: 0,
            print_info: true,
        }
    }
}

impl BssOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    pub fn on_loadings(mut self, on_loadings: bool) -> Self {
        self.on_loadings = on_loadings;
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

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn print_info(mut self, print_info: bool) -> Self {
        self.print_info = print_info;
        self
    }
}

/// Unmixed factor/loading pair.
#[derive(Clone, Debug)]
pub struct BssOutput {
    pub factors: Matrix,
    pub loadings: Matrix,
    /// `(n, n)` matrix applied to the unmixed side.
    pub unmixing_matrix: Matrix,
}

/// Separates the first `n_components` columns of a real factor/loading pair.
pub fn unmix(factors: &Matrix, loadings: &Matrix, n_components: usize, options: &BssOptions) -> Result<BssOutput> {
    let available = factors.ncols();
    if n_components == 0 || n_components > available {
        return Err(MvaError::Shape(format!(
            "cannot separate {n_components} sources from {available} components"
        )));
    }
    let factors = factors.slice(s![.., ..n_components]).to_owned();
    let loadings = loadings.slice(s![.., ..n_components]).to_owned();

    let mut ica = FastICA::new()
        .centre(false)
        .max_iter(options.max_iter)
        .tol(options.tol)
        .random_state(options.seed);
    let mixed = if options.on_loadings { &loadings } else { &factors };
    ica.fit(mixed)?;
    let unmixing = ica.unmixing.ok_or(MvaError::NotComputed("unmixing"))?;
    let compensation = inverse(unmixing.view())?;

    // loadings . factors^T = (loadings . W^-1) . (factors . W^T)^T
    let (factors, loadings) = if options.on_loadings {
        (factors.dot(&compensation), loadings.dot(&unmixing.t()))
    } else {
        (factors.dot(&unmixing.t()), loadings.dot(&compensation))
    };
    Ok(BssOutput {
        factors,
        loadings,
        unmixing_matrix: unmixing,
    })
}

pub(crate) fn write_report(out: &mut dyn Write, n_components: usize, options: &BssOptions) -> Result<()> {
    writeln!(out, "Blind source separation info:")?;
    writeln!(out, "  number_of_components={n_components}")?;
    writeln!(out, "  algorithm={FAST_ICA}")?;
    writeln!(out, "  on_loadings={}", options.on_loadings)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn mixed_pair() -> (Matrix, Matrix) {
        let factors = Array2::from_shape_fn((300, 3), |(i, k)| {
            let t = i as f64 * 0.05;
            match k {
                0 => (1.3 * t).sin() + 0.4 * (0.7 * t).cos(),
                1 => (1.3 * t).sin() - ((2.9 * t).sin()).signum(),
                _ => 0.1 * (5.0 * t).cos(),
            }
        });
        let loadings = Array2::from_shape_fn((12, 3), |(i, k)| {
            3.0 * ((i + 1) as f64 * (k as f64 + 0.5)).sin() + k as f64
        });
        (factors, loadings)
    }

    fn max_abs_diff(a: &Matrix, b: &Matrix) -> f64 {
        (a - b).iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    #[test]
    fn test_unmix_preserves_model() {
        let (factors, loadings) = mixed_pair();
        for on_loadings in [false, true] {
            let options = BssOptions::new().on_loadings(on_loadings);
            let out = unmix(&factors, &loadings, 2, &options).unwrap();
            let before = loadings.slice(s![.., ..2]).dot(&factors.slice(s![.., ..2]).t());
            let after = out.loadings.dot(&out.factors.t());
            assert!(max_abs_diff(&before, &after) < 1e-8);
            assert_eq!(out.unmixing_matrix.dim(), (2, 2));
        }
    }

    #[test]
    fn test_flat_factor_is_separated() {
        let (factors, loadings) = mixed_pair();
        let factors = Array2::from_shape_fn(factors.dim(), |(i, k)| {
            if k == 2 { 1.0 } else { factors[[i, k]] }
        });
        for on_loadings in [false, true] {
            let options = BssOptions::new().on_loadings(on_loadings);
            let out = unmix(&factors, &loadings, 3, &options).unwrap();
            assert!(out.factors.iter().chain(out.loadings.iter()).all(|x| x.is_finite()));
            let after = out.loadings.dot(&out.factors.t());
            assert!(max_abs_diff(&loadings.dot(&factors.t()), &after) < 1e-8);
            assert_eq!(out.unmixing_matrix.dim(), (3, 3));
        }
    }

    #[test]
    fn test_too_many_sources() {
        let (factors, loadings) = mixed_pair();
        assert!(matches!(
            unmix(&factors, &loadings, 4, &BssOptions::new()),
            Err(MvaError::Shape(_))
        ));
    }

    #[test]
    fn test_report() {
        let mut out = Vec::new();
        write_report(&mut out, 2, &BssOptions::new()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Blind source separation info:"));
        assert!(text.contains("algorithm=fast_ica"));
    }
}
