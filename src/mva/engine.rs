use std::io::{self, Write};

use ndarray::s;

use crate::bss::{self, BssOptions};
use crate::decomposition::{
    self, DecompositionInfo, DecompositionOptions, NoiseModel, PoissonianWeights,
};
use crate::error::{MvaError, Result};
use crate::learning_results::{DEFAULT_ELBOW_POINTS, estimate_elbow_position};
use crate::linalg::Field;
use crate::signal::{Element, Signal};

impl<A: Element> Signal<A> {
    /// Decomposes the signal and stores the result in its learning results,
    /// printing the progress report to stdout.
    ///
    /// Returns the algorithm diagnostics when `options.return_info` is set.
    ///
    /// ```rust
    /// use ndarray::{Array, IxDyn};
    /// use signal_mva::Signal;
    /// use signal_mva::decomposition::DecompositionOptions;
    ///
    /// let data = Array::from_shape_fn(IxDyn(&[4, 6]), |ix| (ix[0] * ix[1]) as f64 + 1.0);
    /// let mut s = Signal::new(data);
    /// s.decomposition(DecompositionOptions::new().print_info(false)).unwrap();
    /// assert_eq!(s.learning_results().decomposition_algorithm.as_deref(), Some("svd"));
    /// ```
    pub fn decomposition(&mut self, options: DecompositionOptions) -> Result<Option<DecompositionInfo>> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        self.decomposition_to(options, &mut handle)
    }

    /// Same as `decomposition` with the report written to `report`.
    pub fn decomposition_to<W: Write>(
        &mut self,
        mut options: DecompositionOptions,
        report: &mut W,
    ) -> Result<Option<DecompositionInfo>> {
        if !A::DTYPE.is_inexact() {
            return Err(MvaError::Type { dtype: A::DTYPE });
        }
        let algorithm = options.algorithm;
        let unfolding = self.unfolding()?;
        decomposition::validate::<A::Field>(&options, (unfolding.n_samples(), unfolding.n_features()))?;

        let data = unfolding.unfold(self.data().view())?.mapv(A::to_field);
        let weights = if options.normalize_poissonian_noise {
            Some(PoissonianWeights::estimate(data.view())?)
        } else {
            None
        };
        let variance = if algorithm.uses_noise_model() {
            let real = <A::Field as Field>::to_real_matrix(data.view())
                .ok_or_else(|| MvaError::real_only(algorithm.name()))?;
            let model = options.noise_model.clone().unwrap_or(NoiseModel::Poissonian);
            let variance = model.variance(&real, &unfolding)?;
            Some(match &weights {
                Some(w) => w.normalize_variance(&variance),
                None => variance,
            })
        } else {
            None
        };
        let input = match &weights {
            Some(w) => w.normalize(data.view()),
            None => data,
        };

        let mut output = decomposition::run(input.view(), variance.as_ref(), &mut options, report)?;
        if output.factors.iter().chain(output.loadings.iter()).any(|x| !x.finite()) {
            return Err(MvaError::Numerical(format!(
                "{algorithm} produced non-finite factors or loadings"
            )));
        }
        if let Some(w) = &weights {
            w.restore(&mut output.factors, &mut output.loadings);
        }

        let k = output.factors.ncols();
        let ratio = output.explained_variance_ratio.take().or_else(|| {
            output.explained_variance.as_ref().and_then(|ev| {
                let total = ev.sum();
                (total > 0.0).then(|| ev / total)
            })
        });
        let significant = if algorithm.estimates_rank() {
            ratio
                .as_ref()
                .and_then(|r| estimate_elbow_position(&r.to_vec(), DEFAULT_ELBOW_POINTS))
                .map(|elbow| elbow + 1)
        } else {
            None
        };
        let truncate = |values: ndarray::Array1<f64>| {
            let n = k.min(values.len());
            values.slice(s![..n]).to_owned()
        };

        tracing::info!(
            %algorithm,
            n_samples = unfolding.n_samples(),
            n_features = unfolding.n_features(),
            components = k,
            poissonian = weights.is_some(),
            "decomposition finished"
        );

        let results = self.learning_results_mut();
        results.clear_decomposition();
        results.factors = Some(output.factors);
        results.loadings = Some(output.loadings);
        results.explained_variance = output.explained_variance.map(truncate);
        results.explained_variance_ratio = ratio.map(truncate);
        results.decomposition_algorithm = Some(algorithm.name().to_string());
        results.output_dimension = options.output_dimension;
        results.number_significant_components = significant;
        results.poissonian_noise_normalized = weights.is_some();
        if let Some(w) = weights {
            results.poissonian_navigation_weights = Some(w.navigation);
            results.poissonian_signal_weights = Some(w.signal);
        }
        results.mean = output.mean;
        results.unfolding = Some(unfolding);
        Ok(output.info)
    }

    /// Unmixes the stored decomposition components with FastICA, printing
    /// the report to stdout.
    pub fn blind_source_separation(&mut self, options: BssOptions) -> Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        self.blind_source_separation_to(options, &mut handle)
    }

    pub fn blind_source_separation_to<W: Write>(&mut self, options: BssOptions, report: &mut W) -> Result<()> {
        let results = self.learning_results();
        let (factors, loadings) = match (&results.factors, &results.loadings) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(MvaError::NotComputed("factors")),
        };
        let n_components = options
            .n_components
            .or(results.output_dimension)
            .or(results.number_significant_components)
            .ok_or_else(|| {
                MvaError::Configuration(
                    "the number of components to separate must be specified".to_string(),
                )
            })?;
        let factors = <A::Field as Field>::to_real_matrix(factors.view())
            .ok_or_else(|| MvaError::real_only(bss::FAST_ICA))?;
        let loadings = <A::Field as Field>::to_real_matrix(loadings.view())
            .ok_or_else(|| MvaError::real_only(bss::FAST_ICA))?;

        if options.print_info {
            bss::write_report(report, n_components, &options)?;
        }
        let output = bss::unmix(&factors, &loadings, n_components, &options)?;
        tracing::info!(
            n_components,
            on_loadings = options.on_loadings,
            "blind source separation finished"
        );

        let results = self.learning_results_mut();
        results.clear_bss();
        results.bss_factors = Some(<A::Field as Field>::from_real_matrix(output.factors));
        results.bss_loadings = Some(<A::Field as Field>::from_real_matrix(output.loadings));
        results.unmixing_matrix = Some(output.unmixing_matrix);
        results.bss_algorithm = Some(bss::FAST_ICA.to_string());
        results.on_loadings = options.on_loadings;
        Ok(())
    }
}
