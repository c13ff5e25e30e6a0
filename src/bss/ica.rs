use ndarray::Axis;
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{MvaError, Result};
use crate::linalg::{Svd, inverse};
use crate::{Matrix, Vector};

const RANK_TOL: f64 = 1e-10;

/// FastICA with symmetric decorrelation and the `logcosh` contrast.
///
/// Rows of the input are observations and columns are the mixed channels.
/// After fitting, `unmixing` maps channels to sources: `sources = x . unmixing^T`.
#[derive(Clone, Debug)]
pub struct FastICA {
    pub unmixing: Option<Matrix>,
    pub mixing: Option<Matrix>,
    pub mean: Option<Vector>,
    pub n_iter: Option<usize>,
    centre: bool,
    max_iter: usize,
    tol: f64,
    random_state: u64,
}

impl FastICA {
    pub fn new() -> Self {
        Self {
            unmixing: None,
            mixing: None,
            mean: None,
            n_iter: None,
            centre: true,
            max_iter: 200,
            tol: 1e-4,
            random_state: 0,
        }
    }

    /// Whether channel means are removed before whitening. Without centring
    /// a constant channel combination is whitened like any other direction.
    pub fn centre(mut self, centre: bool) -> Self {
        self.centre = centre;
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

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        let (n_obs, n_channels) = x.dim();
        if n_channels == 0 || n_obs < n_channels.max(2) {
            return Err(MvaError::Shape(format!(
                "cannot unmix {n_channels} channels from {n_obs} observations"
            )));
        }

        let mean = if self.centre {
            x.mean_axis(Axis(0))
                .ok_or_else(|| MvaError::Shape("cannot average an empty matrix".to_string()))?
        } else {
            Vector::zeros(n_channels)
        };
        let centred = x - &mean.view().insert_axis(Axis(0));

        // whitening from the SVD of the centred data, unit second moment afterwards
        let svd = Svd::compute(centred.view())?;
        let largest = svd.singular_values[0];
        if svd
            .singular_values
            .iter()
            .any(|&s| s <= RANK_TOL * largest)
        {
            return Err(MvaError::Numerical(
                "the channels are linearly dependent and cannot be whitened".to_string(),
            ));
        }
        let scale = (n_obs as f64).sqrt();
        let whitening = Matrix::from_shape_fn((n_channels, n_channels), |(i, j)| {
            svd.v[[j, i]] * scale / svd.singular_values[i]
        });
        let white = centred.dot(&whitening.t());

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut w = decorrelate(&Matrix::random_using(
            (n_channels, n_channels),
            StandardNormal,
            &mut rng,
        ))?;

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iter {
            let g = white.dot(&w.t()).mapv(f64::tanh);
            let g_prime = g
                .mapv(|t| 1.0 - t * t)
                .mean_axis(Axis(0))
                .ok_or_else(|| MvaError::Shape("cannot average an empty matrix".to_string()))?;
            let mut update = g.t().dot(&white) / n_obs as f64;
            for ((mut row, &d), previous) in update
                .rows_mut()
                .into_iter()
                .zip(g_prime.iter())
                .zip(w.rows())
            {
                row.scaled_add(-d, &previous);
            }
            let update = decorrelate(&update)?;

            let change = update
                .dot(&w.t())
                .diag()
                .iter()
                .map(|d| (d.abs() - 1.0).abs())
                .fold(0.0, f64::max);
            w = update;
            iterations += 1;
            if change < self.tol {
                converged = true;
                break;
            }
        }
        if converged {
            tracing::debug!(iterations, "fast_ica converged");
        } else {
            tracing::warn!(max_iter = self.max_iter, "fast_ica reached the iteration limit");
        }

        let unmixing = w.dot(&whitening);
        self.mixing = Some(inverse(unmixing.view())?);
        self.unmixing = Some(unmixing);
        self.mean = Some(mean);
        self.n_iter = Some(iterations);
        Ok(())
    }

    /// Sources of `x`, centred when the model was fitted with centring.
    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let unmixing = self.unmixing.as_ref().ok_or(MvaError::NotComputed("unmixing"))?;
        let mean = self.mean.as_ref().ok_or(MvaError::NotComputed("unmixing"))?;
        if x.ncols() != unmixing.ncols() {
            return Err(MvaError::Shape(format!(
                "expected {} channels, got {}",
                unmixing.ncols(),
                x.ncols()
            )));
        }
        Ok((x - &mean.view().insert_axis(Axis(0))).dot(&unmixing.t()))
    }

    pub fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        self.fit(x)?;
        self.transform(x)
    }
}

impl Default for FastICA {
    fn default() -> Self {
        Self::new()
    }
}

/// `(w w^T)^{-1/2} w`, the closest matrix with orthonormal rows.
fn decorrelate(w: &Matrix) -> Result<Matrix> {
    let svd = Svd::compute(w.view())?;
    Ok(svd.u.dot(&svd.v.t()))
}
