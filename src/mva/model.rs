use ndarray::{Array2, ArrayView1, Axis as ArrayAxis, IxDyn};

use crate::error::{MvaError, Result};
use crate::learning_results::{ComponentIndices, ComponentTarget, LearningResults, checked_indices};
use crate::linalg::Field;
use crate::signal::{Axis, Element, Signal, Unfolding};
use crate::tensor::{TuckerDecomposition, hosvd};

impl<A: Element> Signal<A> {
    /// Model of the data built from the first `n_components` decomposition
    /// components, or from all of them.
    pub fn get_decomposition_model(&self, n_components: Option<usize>) -> Result<Signal<A::Field>> {
        let k = self
            .learning_results()
            .n_components()
            .ok_or(MvaError::NotComputed("factors"))?;
        self.get_decomposition_model_components(0..n_components.unwrap_or(k))
    }

    /// Model built from an explicit set of decomposition components.
    pub fn get_decomposition_model_components(
        &self,
        components: impl ComponentIndices,
    ) -> Result<Signal<A::Field>> {
        let results = self.learning_results();
        let (factors, loadings) = stored_pair(&results.factors, &results.loadings, "factors")?;
        let model = self.model(factors, loadings, &components.component_indices())?;
        Ok(model.title(&format!("{} decomposition model", self.title)))
    }

    pub fn get_bss_model(&self, n_components: Option<usize>) -> Result<Signal<A::Field>> {
        let k = self
            .learning_results()
            .n_bss_components()
            .ok_or(MvaError::NotComputed("bss_factors"))?;
        self.get_bss_model_components(0..n_components.unwrap_or(k))
    }

    pub fn get_bss_model_components(&self, components: impl ComponentIndices) -> Result<Signal<A::Field>> {
        let results = self.learning_results();
        let (factors, loadings) =
            stored_pair(&results.bss_factors, &results.bss_loadings, "bss_factors")?;
        let model = self.model(factors, loadings, &components.component_indices())?;
        Ok(model.title(&format!("{} BSS model", self.title)))
    }

    /// The stored explained variance ratio as a one-dimensional signal.
    pub fn get_explained_variance_ratio(&self) -> Result<Signal<f64>> {
        let ratio = self
            .learning_results()
            .explained_variance_ratio
            .as_ref()
            .ok_or(MvaError::NotComputed("explained_variance_ratio"))?;
        let axes = vec![Axis::new("Principal component index", ratio.len(), false)];
        Ok(Signal::with_axes(ratio.clone().into_dyn(), axes)?
            .title(&format!("Explained variance ratio of {}", self.title)))
    }

    /// Factors folded to `[component, signal axes..]`.
    pub fn get_decomposition_factors(&self) -> Result<Signal<A::Field>> {
        let results = self.learning_results();
        let factors = results.factors.as_ref().ok_or(MvaError::NotComputed("factors"))?;
        self.folded_factors(results, factors, "Decomposition factors")
    }

    /// Loadings folded to `[component, navigation axes..]`.
    pub fn get_decomposition_loadings(&self) -> Result<Signal<A::Field>> {
        let results = self.learning_results();
        let loadings = results.loadings.as_ref().ok_or(MvaError::NotComputed("loadings"))?;
        self.folded_loadings(results, loadings, "Decomposition loadings")
    }

    pub fn get_bss_factors(&self) -> Result<Signal<A::Field>> {
        let results = self.learning_results();
        let factors = results
            .bss_factors
            .as_ref()
            .ok_or(MvaError::NotComputed("bss_factors"))?;
        self.folded_factors(results, factors, "BSS factors")
    }

    pub fn get_bss_loadings(&self) -> Result<Signal<A::Field>> {
        let results = self.learning_results();
        let loadings = results
            .bss_loadings
            .as_ref()
            .ok_or(MvaError::NotComputed("bss_loadings"))?;
        self.folded_loadings(results, loadings, "BSS loadings")
    }

    pub fn reverse_decomposition_component(&mut self, components: impl ComponentIndices) -> Result<()> {
        self.learning_results_mut().reverse_component(components)
    }

    pub fn reverse_bss_component(&mut self, components: impl ComponentIndices) -> Result<()> {
        self.learning_results_mut().reverse_bss_component(components)
    }

    pub fn normalize_decomposition_components<F>(&mut self, target: ComponentTarget, aggregate: F) -> Result<()>
    where
        F: Fn(ArrayView1<'_, A::Field>) -> A::Field,
    {
        self.learning_results_mut()
            .normalize_decomposition_components(target, aggregate)
    }

    pub fn normalize_bss_components<F>(&mut self, target: ComponentTarget, aggregate: F) -> Result<()>
    where
        F: Fn(ArrayView1<'_, A::Field>) -> A::Field,
    {
        self.learning_results_mut().normalize_bss_components(target, aggregate)
    }

    /// Truncated higher-order SVD over the navigation axes and the flattened
    /// signal dimension.
    ///
    /// `ranks` holds one rank per navigation axis followed by the rank of the
    /// signal mode, so the decomposed tensor has shape
    /// `[navigation shape.., n_features]`.
    pub fn tensor_decomposition(&self, ranks: &[usize]) -> Result<TuckerDecomposition<A::Field>> {
        if !A::DTYPE.is_inexact() {
            return Err(MvaError::Type { dtype: A::DTYPE });
        }
        let unfolding = self.unfolding()?;
        let mut dims = unfolding.navigation_shape();
        if ranks.len() != dims.len() + 1 {
            return Err(MvaError::Shape(format!(
                "{} ranks given for {} navigation axes and one signal mode",
                ranks.len(),
                dims.len()
            )));
        }
        dims.push(unfolding.n_features());
        let tensor = unfolding
            .unfold(self.data().view())?
            .mapv(A::to_field)
            .into_shape_with_order(IxDyn(&dims))?;
        hosvd(tensor.view(), ranks)
    }

    fn model(
        &self,
        factors: &Array2<A::Field>,
        loadings: &Array2<A::Field>,
        components: &[usize],
    ) -> Result<Signal<A::Field>> {
        let results = self.learning_results();
        let unfolding = stored_unfolding(results)?;
        let components = checked_indices(components, factors.ncols())?;
        if components.is_empty() {
            return Err(MvaError::Shape("no components selected for the model".to_string()));
        }

        let factors = factors.select(ArrayAxis(1), &components);
        let loadings = loadings.select(ArrayAxis(1), &components);
        let mut model = loadings.dot(&factors.t());

        if let Some(mean) = &results.mean {
            let weights = results
                .poissonian_navigation_weights
                .as_ref()
                .zip(results.poissonian_signal_weights.as_ref());
            for ((i, j), value) in model.indexed_iter_mut() {
                let scale = weights.map_or(1.0, |(a, b)| a[i] * b[j]);
                *value += mean[j].scale(scale);
            }
        }
        Ok(self.derived(unfolding.fold(model.view())?))
    }

    fn folded_factors(
        &self,
        results: &LearningResults<A::Field>,
        factors: &Array2<A::Field>,
        title: &str,
    ) -> Result<Signal<A::Field>> {
        let unfolding = stored_unfolding(results)?;
        let data = unfolding.fold_signal_components(factors.view())?;
        let axes = self.component_axes(factors.ncols(), unfolding.signal_axes());
        Ok(Signal::with_axes(data, axes)?.title(&format!("{title} of {}", self.title)))
    }

    fn folded_loadings(
        &self,
        results: &LearningResults<A::Field>,
        loadings: &Array2<A::Field>,
        title: &str,
    ) -> Result<Signal<A::Field>> {
        let unfolding = stored_unfolding(results)?;
        let data = unfolding.fold_navigation_components(loadings.view())?;
        let axes = self.component_axes(loadings.ncols(), unfolding.navigation_axes());
        Ok(Signal::with_axes(data, axes)?.title(&format!("{title} of {}", self.title)))
    }

    /// A navigating component axis followed by the given data axes as
    /// signal axes.
    fn component_axes(&self, k: usize, data_axes: &[usize]) -> Vec<Axis> {
        let mut axes = vec![Axis::new("Decomposition component index", k, true)];
        axes.extend(data_axes.iter().map(|&i| Axis {
            navigate: false,
            ..self.axes()[i].clone()
        }));
        axes
    }
}

fn stored_pair<'a, T>(
    factors: &'a Option<Array2<T>>,
    loadings: &'a Option<Array2<T>>,
    name: &'static str,
) -> Result<(&'a Array2<T>, &'a Array2<T>)> {
    match (factors, loadings) {
        (Some(f), Some(l)) => Ok((f, l)),
        _ => Err(MvaError::NotComputed(name)),
    }
}

fn stored_unfolding<T: Field>(results: &LearningResults<T>) -> Result<&Unfolding> {
    results.unfolding.as_ref().ok_or(MvaError::NotComputed("unfolding"))
}
