//! Multivariate analysis of N-dimensional signals.
//!
//! A [`Signal`] tags every array axis as navigation (samples) or signal
//! (features). [`Signal::decomposition`] unfolds the data into a
//! `(n_samples, n_features)` matrix, runs one of the algorithms in
//! [`decomposition`] and stores factors, loadings and explained variance in
//! the signal's [`LearningResults`]. Blind source separation, model
//! reconstruction and persistence work from those stored results.

pub use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2};

pub mod bss;
pub mod decomposition;
pub mod error;
pub mod learning_results;
pub mod linalg;
pub mod metrics;
mod mva;
pub mod persistence;
pub mod signal;
pub mod tensor;

pub use decomposition::{Algorithm, DecompositionInfo, DecompositionOptions};
pub use error::{MvaError, Result};
pub use learning_results::{ComponentTarget, LearningResults};
pub use signal::{Axis, DType, Element, Signal};

pub type Vector = Array1<f64>;
pub type Matrix = Array2<f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_signal_has_empty_results() {
        let s = Signal::new(ArrayD::<f64>::zeros(ndarray::IxDyn(&[2, 3])));
        assert_eq!(s.learning_results(), &LearningResults::new());
        assert_eq!(Matrix::zeros((3, 4)).shape(), &[3, 4]);
    }
}
