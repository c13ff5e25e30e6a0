//! Reconstruction error measures between a signal and its model.

use ndarray::{ArrayBase, Data, Dimension, Zip};

use crate::error::{MvaError, Result};
use crate::linalg::Field;

fn check_shapes<T, S1, S2, D>(truth: &ArrayBase<S1, D>, model: &ArrayBase<S2, D>) -> Result<()>
where
    S1: Data<Elem = T>,
    S2: Data<Elem = T>,
    D: Dimension,
{
    if truth.shape() != model.shape() {
        return Err(MvaError::Shape(format!(
            "cannot compare arrays of shapes {:?} and {:?}",
            truth.shape(),
            model.shape()
        )));
    }
    if truth.is_empty() {
        return Err(MvaError::Shape("cannot compare empty arrays".to_string()));
    }
    Ok(())
}

fn squared_error_sum<T, S1, S2, D>(truth: &ArrayBase<S1, D>, model: &ArrayBase<S2, D>) -> f64
where
    T: Field,
    S1: Data<Elem = T>,
    S2: Data<Elem = T>,
    D: Dimension,
{
    Zip::from(truth)
        .and(model)
        .fold(0.0, |acc, &a, &b| acc + (a - b).abs_sqr())
}

/// `sqrt(sum |truth - model|^2)`
pub fn root_sum_squared_error<T, S1, S2, D>(truth: &ArrayBase<S1, D>, model: &ArrayBase<S2, D>) -> Result<f64>
where
    T: Field,
    S1: Data<Elem = T>,
    S2: Data<Elem = T>,
    D: Dimension,
{
    check_shapes(truth, model)?;
    Ok(squared_error_sum(truth, model).sqrt())
}

pub fn mean_squared_error<T, S1, S2, D>(truth: &ArrayBase<S1, D>, model: &ArrayBase<S2, D>) -> Result<f64>
where
    T: Field,
    S1: Data<Elem = T>,
    S2: Data<Elem = T>,
    D: Dimension,
{
    check_shapes(truth, model)?;
    Ok(squared_error_sum(truth, model) / truth.len() as f64)
}

pub fn max_abs_error<T, S1, S2, D>(truth: &ArrayBase<S1, D>, model: &ArrayBase<S2, D>) -> Result<f64>
where
    T: Field,
    S1: Data<Elem = T>,
    S2: Data<Elem = T>,
    D: Dimension,
{
    check_shapes(truth, model)?;
    Ok(Zip::from(truth)
        .and(model)
        .fold(0.0, |acc: f64, &a, &b| acc.max((a - b).modulus())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use num_complex::Complex64;

    #[test]
    fn test_mean_squared_error() {
        let truth = array![[1.0, 2.0], [3.0, 4.0]];
        let model = array![[1.0, 2.0], [3.0, 6.0]];
        let mse = mean_squared_error(&truth, &model).unwrap();
        assert!((mse - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_root_sum_squared_error() {
        let truth = array![3.0, 0.0];
        let model = array![0.0, 4.0];
        assert!((root_sum_squared_error(&truth, &model).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_abs_error_complex() {
        let truth = array![Complex64::new(1.0, 1.0), Complex64::new(0.0, 0.0)];
        let model = array![Complex64::new(1.0, -1.0), Complex64::new(0.5, 0.0)];
        assert!((max_abs_error(&truth, &model).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let truth = array![1.0, 2.0];
        let model = array![1.0, 2.0, 3.0];
        assert!(matches!(
            mean_squared_error(&truth, &model),
            Err(MvaError::Shape(_))
        ));
    }
}
