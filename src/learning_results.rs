//! Persistent state of a decomposition and of the blind source separation
//! run on top of it, plus the in-place operations defined over that state.

use std::fmt::Write as _;
use std::ops::{Range, RangeInclusive};

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{MvaError, Result};
use crate::linalg::Field;
use crate::signal::Unfolding;
use crate::{Matrix, Vector};

/// Number of leading explained-variance-ratio values the elbow is searched in.
pub const DEFAULT_ELBOW_POINTS: usize = 20;

/// Which side of a factor/loading pair an operation is aimed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentTarget {
    Factors,
    Loadings,
}

/// Zero-based component selection: a single index, a list or a range.
pub trait ComponentIndices {
    fn component_indices(&self) -> Vec<usize>;
}

impl ComponentIndices for usize {
    fn component_indices(&self) -> Vec<usize> {
        vec![*self]
    }
}

impl ComponentIndices for Vec<usize> {
    fn component_indices(&self) -> Vec<usize> {
        self.clone()
    }
}

impl ComponentIndices for &[usize] {
    fn component_indices(&self) -> Vec<usize> {
        self.to_vec()
    }
}

impl<const N: usize> ComponentIndices for [usize; N] {
    fn component_indices(&self) -> Vec<usize> {
        self.to_vec()
    }
}

impl ComponentIndices for Range<usize> {
    fn component_indices(&self) -> Vec<usize> {
        self.clone().collect()
    }
}

impl ComponentIndices for RangeInclusive<usize> {
    fn component_indices(&self) -> Vec<usize> {
        self.clone().collect()
    }
}

/// Everything a decomposition and a subsequent BSS leave behind.
///
/// Factors are `(n_features, k)` and loadings `(n_samples, k)` in the
/// unfolded layout described by `unfolding`. A new decomposition overwrites
/// the decomposition fields; a new BSS overwrites the `bss_*` fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct LearningResults<T: Field> {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub factors: Option<Array2<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub loadings: Option<Array2<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub explained_variance: Option<Vector>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub explained_variance_ratio: Option<Vector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decomposition_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dimension: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_significant_components: Option<usize>,
    #[serde(default)]
    pub poissonian_noise_normalized: bool,
    /// `sqrt` of the per-sample totals used by Poissonian normalisation.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub poissonian_navigation_weights: Option<Vector>,
    /// `sqrt` of the per-feature totals used by Poissonian normalisation.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub poissonian_signal_weights: Option<Vector>,
    /// Per-feature mean removed by centred estimators.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub mean: Option<Array1<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unfolding: Option<Unfolding>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub bss_factors: Option<Array2<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub bss_loadings: Option<Array2<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::persistence::optional_array")]
    pub unmixing_matrix: Option<Matrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bss_algorithm: Option<String>,
    #[serde(default)]
    pub on_loadings: bool,
}

impl<T: Field> Default for LearningResults<T> {
    fn default() -> Self {
        Self {
            factors: None,
            loadings: None,
            explained_variance: None,
            explained_variance_ratio: None,
            decomposition_algorithm: None,
            output_dimension: None,
            number_significant_components: None,
            poissonian_noise_normalized: false,
            poissonian_navigation_weights: None,
            poissonian_signal_weights: None,
            mean: None,
            unfolding: None,
            bss_factors: None,
            bss_loadings: None,
            unmixing_matrix: None,
            bss_algorithm: None,
            on_loadings: false,
        }
    }
}

impl<T: Field> LearningResults<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every decomposition field, leaving the BSS fields alone.
    pub fn clear_decomposition(&mut self) {
        *self = Self {
            bss_factors: self.bss_factors.take(),
            bss_loadings: self.bss_loadings.take(),
            unmixing_matrix: self.unmixing_matrix.take(),
            bss_algorithm: self.bss_algorithm.take(),
            on_loadings: self.on_loadings,
            ..Self::default()
        };
    }

    pub fn clear_bss(&mut self) {
        self.bss_factors = None;
        self.bss_loadings = None;
        self.unmixing_matrix = None;
        self.bss_algorithm = None;
        self.on_loadings = false;
    }

    /// Number of stored decomposition components.
    pub fn n_components(&self) -> Option<usize> {
        self.factors.as_ref().map(|f| f.ncols())
    }

    pub fn n_bss_components(&self) -> Option<usize> {
        self.bss_factors.as_ref().map(|f| f.ncols())
    }

    /// Negates the selected columns of `factors` and `loadings`.
    pub fn reverse_component(&mut self, indices: impl ComponentIndices) -> Result<()> {
        let (factors, loadings) = pair_mut(&mut self.factors, &mut self.loadings, "factors")?;
        reverse_columns(factors, loadings, &indices.component_indices())
    }

    /// Negates the selected columns of `bss_factors` and `bss_loadings`.
    pub fn reverse_bss_component(&mut self, indices: impl ComponentIndices) -> Result<()> {
        let (factors, loadings) =
            pair_mut(&mut self.bss_factors, &mut self.bss_loadings, "bss_factors")?;
        reverse_columns(factors, loadings, &indices.component_indices())
    }

    /// Rescales every decomposition component so that `aggregate` of the
    /// `target` column is one, moving the scale onto the other side.
    pub fn normalize_decomposition_components<F>(
        &mut self,
        target: ComponentTarget,
        aggregate: F,
    ) -> Result<()>
    where
        F: Fn(ArrayView1<'_, T>) -> T,
    {
        let (factors, loadings) = pair_mut(&mut self.factors, &mut self.loadings, "factors")?;
        normalize_pair(factors, loadings, target, aggregate)
    }

    pub fn normalize_bss_components<F>(&mut self, target: ComponentTarget, aggregate: F) -> Result<()>
    where
        F: Fn(ArrayView1<'_, T>) -> T,
    {
        let (factors, loadings) =
            pair_mut(&mut self.bss_factors, &mut self.bss_loadings, "bss_factors")?;
        normalize_pair(factors, loadings, target, aggregate)
    }

    /// Elbow of the stored explained variance ratio.
    pub fn estimate_elbow_position(&self) -> Result<usize> {
        let ratio = self
            .explained_variance_ratio
            .as_ref()
            .ok_or(MvaError::NotComputed("explained_variance_ratio"))?;
        estimate_elbow_position(&ratio.to_vec(), DEFAULT_ELBOW_POINTS)
            .ok_or(MvaError::NotComputed("explained_variance_ratio"))
    }

    /// Keeps only the first `n` decomposition components.
    pub fn crop_decomposition_dimension(&mut self, n: usize) -> Result<()> {
        let available = self.n_components().ok_or(MvaError::NotComputed("factors"))?;
        if n == 0 || n > available {
            return Err(MvaError::Shape(format!(
                "cannot crop {available} components to {n}"
            )));
        }
        tracing::debug!(from = available, to = n, "cropping decomposition");
        for matrix in [&mut self.factors, &mut self.loadings].into_iter().flatten() {
            *matrix = matrix.slice(ndarray::s![.., ..n]).to_owned();
        }
        for values in [&mut self.explained_variance, &mut self.explained_variance_ratio]
            .into_iter()
            .flatten()
        {
            if values.len() > n {
                *values = values.slice(ndarray::s![..n]).to_owned();
            }
        }
        self.output_dimension = Some(n);
        Ok(())
    }

    /// Human readable description of the stored results.
    pub fn summary(&self) -> String {
        let mut text = String::from("Decomposition parameters\n-------------------------\n");
        let algorithm = self.decomposition_algorithm.as_deref().unwrap_or("None");
        let _ = writeln!(text, "Decomposition algorithm : {algorithm}");
        let _ = writeln!(
            text,
            "Poissonian noise normalization : {}",
            self.poissonian_noise_normalized
        );
        let dimension = self
            .output_dimension
            .map_or_else(|| "None".to_string(), |k| k.to_string());
        let _ = writeln!(text, "Output dimension : {dimension}");
        if let Some(n) = self.number_significant_components {
            let _ = writeln!(text, "Significant components (elbow) : {n}");
        }
        if let Some(algorithm) = &self.bss_algorithm {
            let _ = writeln!(text, "\nDemixing parameters\n-------------------------");
            let _ = writeln!(text, "BSS algorithm : {algorithm}");
            let _ = writeln!(text, "Number of components : {:?}", self.n_bss_components());
            let _ = writeln!(text, "Applied on loadings : {}", self.on_loadings);
        }
        text
    }
}

fn pair_mut<'a, T>(
    factors: &'a mut Option<Array2<T>>,
    loadings: &'a mut Option<Array2<T>>,
    name: &'static str,
) -> Result<(&'a mut Array2<T>, &'a mut Array2<T>)> {
    match (factors.as_mut(), loadings.as_mut()) {
        (Some(f), Some(l)) => Ok((f, l)),
        _ => Err(MvaError::NotComputed(name)),
    }
}

pub(crate) fn checked_indices(indices: &[usize], k: usize) -> Result<Vec<usize>> {
    if let Some(&bad) = indices.iter().find(|&&i| i >= k) {
        return Err(MvaError::Shape(format!(
            "component {bad} out of range for {k} components"
        )));
    }
    let mut unique = indices.to_vec();
    unique.sort_unstable();
    unique.dedup();
    Ok(unique)
}

fn reverse_columns<T: Field>(
    factors: &mut Array2<T>,
    loadings: &mut Array2<T>,
    indices: &[usize],
) -> Result<()> {
    for i in checked_indices(indices, factors.ncols())? {
        factors.column_mut(i).mapv_inplace(|x| -x);
        loadings.column_mut(i).mapv_inplace(|x| -x);
    }
    Ok(())
}

fn normalize_pair<T, F>(
    factors: &mut Array2<T>,
    loadings: &mut Array2<T>,
    target: ComponentTarget,
    aggregate: F,
) -> Result<()>
where
    T: Field,
    F: Fn(ArrayView1<'_, T>) -> T,
{
    let (scaled, compensated) = match target {
        ComponentTarget::Factors => (factors, loadings),
        ComponentTarget::Loadings => (loadings, factors),
    };
    let coefficients: Vec<T> = scaled.axis_iter(Axis(1)).map(&aggregate).collect();
    if let Some(k) = coefficients.iter().position(|c| c.modulus() == 0.0 || !c.finite()) {
        return Err(MvaError::Numerical(format!(
            "component {k} has a zero or non-finite normalisation coefficient"
        )));
    }
    for (k, &c) in coefficients.iter().enumerate() {
        scaled.column_mut(k).mapv_inplace(|x| x / c);
        compensated.column_mut(k).mapv_inplace(|x| x * c);
    }
    Ok(())
}

/// Column sum.
pub fn sum<T: Field>(column: ArrayView1<'_, T>) -> T {
    column.sum()
}

/// Largest modulus in the column.
pub fn max_abs<T: Field>(column: ArrayView1<'_, T>) -> T {
    T::from_real(column.iter().map(|x| x.modulus()).fold(0.0, f64::max))
}

/// Euclidean norm of the column.
pub fn l2_norm<T: Field>(column: ArrayView1<'_, T>) -> T {
    T::from_real(column.iter().map(|x| x.abs_sqr()).sum::<f64>().sqrt())
}

/// Index of the elbow of a non-increasing explained-variance-ratio curve.
///
/// The curve is taken in log space over its first `max_points + 1` values
/// (clipped below at `1e-12`); the elbow is the point furthest from the
/// straight line joining the first and last of those. Ties resolve to the
/// lowest index. Returns `None` for an empty sequence.
pub fn estimate_elbow_position(ratio: &[f64], max_points: usize) -> Option<usize> {
    if ratio.is_empty() {
        return None;
    }
    let last = max_points.min(ratio.len() - 1);
    if last == 0 {
        return Some(0);
    }
    let y: Vec<f64> = ratio[..=last].iter().map(|&r| r.max(1e-12).ln()).collect();
    let (x1, y1) = (0.0, y[0]);
    let (x2, y2) = (last as f64, y[last]);

    let mut best = 0;
    let mut best_distance = f64::NEG_INFINITY;
    for (i, &yi) in y.iter().enumerate() {
        let distance = ((y2 - y1) * i as f64 - (x2 - x1) * yi + x2 * y1 - y2 * x1).abs();
        if distance > best_distance {
            best = i;
            best_distance = distance;
        }
    }
    Some(best)
}
