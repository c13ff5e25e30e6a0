use std::any::Any;

use ndarray::linalg::general_mat_mul;
use ndarray::{Array1, Axis, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::{Estimator, soft_threshold};
use crate::error::{MvaError, Result};
use crate::linalg::{Svd, solve};
use crate::{Matrix, Vector};

/// Sparse principal components: `X - mean ~ U V` with an L1 penalty on the
/// components `V` and unit-bounded columns of `U`, solved by block
/// coordinate descent.
#[derive(Clone, Debug)]
pub struct SparsePCA {
    pub components: Option<Matrix>,
    pub mean: Option<Vector>,
    pub error: Vec<f64>,
    pub n_iter: Option<usize>,
    n_components: Option<usize>,
    alpha: f64,
    ridge_alpha: f64,
    max_iter: usize,
    tol: f64,
}

impl SparsePCA {
    pub fn new() -> Self {
        Self {
            components: None,
            mean: None,
            error: Vec::new(),
            n_iter: None,
            n_components: None,
            alpha: 1.0,
            ridge_alpha: 0.01,
            max_iter: 1000,
            tol: 1e-8,
        }
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    /// Sparsity penalty on the components.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Ridge shrinkage used when projecting data onto the components.
    pub fn ridge_alpha(mut self, ridge_alpha: f64) -> Self {
        self.ridge_alpha = ridge_alpha;
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

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        let (mean, centered) = center(x)?;
        let k = checked_components(self.n_components, x)?;
        let (mut u, mut v) = svd_start(&centered, k)?;

        let mut residual = &centered - &u.dot(&v);
        self.error.clear();
        let mut iterations = self.max_iter;
        for iteration in 0..self.max_iter {
            update_components(&u, &mut v, &mut residual, self.alpha);
            update_codes(&mut u, &v, &mut residual);

            let objective = 0.5 * residual.mapv(|r| r * r).sum() + self.alpha * v.mapv(f64::abs).sum();
            self.error.push(objective);
            if let [.., before, after] = self.error.as_slice() {
                if (before - after).abs() <= self.tol * after.abs() {
                    iterations = iteration + 1;
                    break;
                }
            }
        }
        if iterations == self.max_iter {
            tracing::warn!(max_iter = self.max_iter, "sparse PCA reached the iteration limit");
        }

        normalize_rows(&mut v);
        self.components = Some(v);
        self.mean = Some(mean);
        self.n_iter = Some(iterations);
        Ok(())
    }

    /// Ridge projection of centred data onto the components.
    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let components = self.components.as_ref().ok_or(MvaError::NotComputed("SparsePCA.components"))?;
        let mean = self.mean.as_ref().ok_or(MvaError::NotComputed("SparsePCA.mean"))?;
        ridge_transform(x, components, mean, self.ridge_alpha)
    }

    pub fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        self.fit(x)?;
        self.transform(x)
    }
}

impl Default for SparsePCA {
    fn default() -> Self {
        Self::new()
    }
}

/// Online variant of `SparsePCA` that refines the components from
/// mini-batches of samples.
///
/// Each epoch visits the samples in a seeded random order; the sufficient
/// statistics of the codes are accumulated over the epoch and the components
/// are re-solved after every batch.
#[derive(Clone, Debug)]
pub struct MiniBatchSparsePCA {
    pub components: Option<Matrix>,
    pub mean: Option<Vector>,
    pub n_iter: Option<usize>,
    n_components: Option<usize>,
    alpha: f64,
    ridge_alpha: f64,
    batch_size: usize,
    epochs: usize,
    shuffle: bool,
    random_state: u64,
}

impl MiniBatchSparsePCA {
    pub fn new() -> Self {
        Self {
            components: None,
            mean: None,
            n_iter: None,
            n_components: None,
            alpha: 1.0,
            ridge_alpha: 0.01,
            batch_size: 3,
            epochs: 100,
            shuffle: true,
            random_state: 0,
        }
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn ridge_alpha(mut self, ridge_alpha: f64) -> Self {
        self.ridge_alpha = ridge_alpha;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        let (mean, centered) = center(x)?;
        let k = checked_components(self.n_components, x)?;
        let (_, mut v) = svd_start(&centered, k)?;
        let n_features = centered.ncols();

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut order: Vec<usize> = (0..centered.nrows()).collect();
        let mut batches = 0;
        for _ in 0..self.epochs {
            if self.shuffle {
                order.shuffle(&mut rng);
            }
            let mut a = Matrix::zeros((k, k));
            let mut b = Matrix::zeros((k, n_features));
            for batch in order.chunks(self.batch_size) {
                let xb = centered.select(Axis(0), batch);
                let codes = ridge_codes(&xb, &v, self.ridge_alpha)?;
                general_mat_mul(1.0, &codes.t(), &codes, 1.0, &mut a);
                general_mat_mul(1.0, &codes.t(), &xb, 1.0, &mut b);

                for j in 0..k {
                    let ajj = a[[j, j]];
                    if ajj <= 0.0 {
                        continue;
                    }
                    let target = &b.row(j) - &a.row(j).dot(&v) + &(&v.row(j) * ajj);
                    let updated = target.mapv(|t| soft_threshold(t, self.alpha) / ajj);
                    v.row_mut(j).assign(&updated);
                }
                batches += 1;
            }
        }

        normalize_rows(&mut v);
        self.components = Some(v);
        self.mean = Some(mean);
        self.n_iter = Some(batches);
        Ok(())
    }

    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let components = self
            .components
            .as_ref()
            .ok_or(MvaError::NotComputed("MiniBatchSparsePCA.components"))?;
        let mean = self.mean.as_ref().ok_or(MvaError::NotComputed("MiniBatchSparsePCA.mean"))?;
        ridge_transform(x, components, mean, self.ridge_alpha)
    }

    pub fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        self.fit(x)?;
        self.transform(x)
    }
}

impl Default for MiniBatchSparsePCA {
    fn default() -> Self {
        Self::new()
    }
}

fn center(x: &Matrix) -> Result<(Vector, Matrix)> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(MvaError::Shape(
            "input matrix must have at least one sample and one feature".to_string(),
        ));
    }
    let mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| MvaError::Shape("cannot average an empty matrix".to_string()))?;
    let centered = x - &mean.view().insert_axis(Axis(0));
    Ok((mean, centered))
}

fn checked_components(n_components: Option<usize>, x: &Matrix) -> Result<usize> {
    let max = x.nrows().min(x.ncols());
    let k = n_components.unwrap_or(max);
    if k == 0 || k > max {
        return Err(MvaError::Shape(format!(
            "n_components={k} must be between 1 and min(n_samples, n_features)={max}"
        )));
    }
    Ok(k)
}

/// Codes and components of the rank-`k` SVD, codes with unit columns.
fn svd_start(centered: &Matrix, k: usize) -> Result<(Matrix, Matrix)> {
    let svd = Svd::compute(centered.view())?.truncate(k);
    let mut v = svd.v.t().to_owned();
    for (mut row, &sigma) in v.axis_iter_mut(Axis(0)).zip(svd.singular_values.iter()) {
        row *= sigma;
    }
    Ok((svd.u, v))
}

fn update_components(u: &Matrix, v: &mut Matrix, residual: &mut Matrix, alpha: f64) {
    for j in 0..v.nrows() {
        let uj = u.column(j);
        let norm = uj.dot(&uj);
        let old = v.row(j).to_owned();
        let new: Array1<f64> = if norm > 0.0 {
            (uj.dot(&*residual) + &(&old * norm)).mapv(|t| soft_threshold(t, alpha) / norm)
        } else {
            Array1::zeros(old.len())
        };
        let delta = &new - &old;
        general_mat_mul(
            -1.0,
            &uj.insert_axis(Axis(1)),
            &delta.view().insert_axis(Axis(0)),
            1.0,
            residual,
        );
        v.row_mut(j).assign(&new);
    }
}

fn update_codes(u: &mut Matrix, v: &Matrix, residual: &mut Matrix) {
    for j in 0..u.ncols() {
        let vj = v.row(j);
        let norm = vj.dot(&vj);
        if norm == 0.0 {
            continue;
        }
        let old = u.column(j).to_owned();
        let mut new = residual.dot(&vj) / norm + &old;
        let length = new.dot(&new).sqrt();
        if length > 1.0 {
            new /= length;
        }
        let delta = &new - &old;
        general_mat_mul(
            -1.0,
            &delta.view().insert_axis(Axis(1)),
            &vj.insert_axis(Axis(0)),
            1.0,
            residual,
        );
        u.column_mut(j).assign(&new);
    }
}

fn normalize_rows(v: &mut Matrix) {
    for mut row in v.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }
}

/// Least-squares codes of `x` against `components` with ridge shrinkage.
fn ridge_codes(x: &Matrix, components: &Matrix, ridge_alpha: f64) -> Result<Matrix> {
    let k = components.nrows();
    let gram = components.dot(&components.t()) + &(Matrix::eye(k) * ridge_alpha);
    let rhs = components.dot(&x.t());
    Ok(solve(gram.view(), rhs.view())?.t().to_owned())
}

fn ridge_transform(x: &Matrix, components: &Matrix, mean: &Vector, ridge_alpha: f64) -> Result<Matrix> {
    if x.ncols() != mean.len() {
        return Err(MvaError::Shape(format!(
            "number of features in X ({}) doesn't match training data ({})",
            x.ncols(),
            mean.len()
        )));
    }
    let centered = x - &mean.view().insert_axis(Axis(0));
    ridge_codes(&centered, components, ridge_alpha)
}

macro_rules! centred_estimator {
    ($ty:ident, $describe:expr) => {
        impl Estimator for $ty {
            fn name(&self) -> &'static str {
                stringify!($ty)
            }

            fn describe(&self) -> String {
                $describe(self)
            }

            fn set_n_components(&mut self, n_components: usize) {
                self.n_components = Some(n_components);
            }

            fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
                $ty::fit_transform(self, x)
            }

            fn components(&self) -> Option<&Matrix> {
                self.components.as_ref()
            }

            fn mean(&self) -> Option<&Vector> {
                self.mean.as_ref()
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

centred_estimator!(SparsePCA, |e: &SparsePCA| format!(
    "SparsePCA(n_components={:?}, alpha={}, ridge_alpha={}, max_iter={}, tol={})",
    e.n_components, e.alpha, e.ridge_alpha, e.max_iter, e.tol
));

centred_estimator!(MiniBatchSparsePCA, |e: &MiniBatchSparsePCA| format!(
    "MiniBatchSparsePCA(n_components={:?}, alpha={}, batch_size={}, epochs={}, random_state={})",
    e.n_components, e.alpha, e.batch_size, e.epochs, e.random_state
));
