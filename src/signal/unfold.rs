use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};

use super::Axis;
use crate::error::{MvaError, Result};

/// Maps an N-dimensional array onto the `(n_samples, n_features)` matrix
/// used by the decomposition algorithms, and back.
///
/// Rows enumerate the navigation axes and columns the signal axes, each in
/// row-major order over the axes as they appear in the array. Swapping the
/// roles of every axis therefore transposes the unfolded matrix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unfolding {
    shape: Vec<usize>,
    navigation_axes: Vec<usize>,
    signal_axes: Vec<usize>,
}

impl Unfolding {
    /// Partitions the axes of an array of `shape` using one flag per axis.
    pub fn new(shape: &[usize], navigate: &[bool]) -> Result<Self> {
        if shape.len() != navigate.len() {
            return Err(MvaError::Shape(format!(
                "{} axes are tagged but the data has {} dimensions",
                navigate.len(),
                shape.len()
            )));
        }
        let navigation_axes = (0..shape.len()).filter(|&i| navigate[i]).collect();
        let signal_axes = (0..shape.len()).filter(|&i| !navigate[i]).collect();
        Ok(Self {
            shape: shape.to_vec(),
            navigation_axes,
            signal_axes,
        })
    }

    pub fn from_axes(axes: &[Axis], shape: &[usize]) -> Result<Self> {
        if axes.len() != shape.len() {
            return Err(MvaError::Shape(format!(
                "{} axes are described but the data has {} dimensions",
                axes.len(),
                shape.len()
            )));
        }
        if let Some((index, axis)) = axes
            .iter()
            .enumerate()
            .find(|(i, axis)| axis.size != shape[*i])
        {
            return Err(MvaError::Shape(format!(
                "axis {} (`{}`) has size {} but the data has {} elements along it",
                index, axis.name, axis.size, shape[index]
            )));
        }
        let flags: Vec<bool> = axes.iter().map(|axis| axis.navigate).collect();
        Self::new(shape, &flags)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn navigation_axes(&self) -> &[usize] {
        &self.navigation_axes
    }

    pub fn signal_axes(&self) -> &[usize] {
        &self.signal_axes
    }

    pub fn navigation_shape(&self) -> Vec<usize> {
        self.navigation_axes.iter().map(|&i| self.shape[i]).collect()
    }

    pub fn signal_shape(&self) -> Vec<usize> {
        self.signal_axes.iter().map(|&i| self.shape[i]).collect()
    }

    pub fn n_samples(&self) -> usize {
        self.navigation_shape().iter().product()
    }

    pub fn n_features(&self) -> usize {
        self.signal_shape().iter().product()
    }

    /// Same array with every axis role swapped.
    pub fn transposed(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            navigation_axes: self.signal_axes.clone(),
            signal_axes: self.navigation_axes.clone(),
        }
    }

    fn permutation(&self) -> Vec<usize> {
        self.navigation_axes
            .iter()
            .chain(self.signal_axes.iter())
            .copied()
            .collect()
    }

    /// Copies `data` into a fresh `(n_samples, n_features)` matrix.
    pub fn unfold<A: Clone>(&self, data: ArrayViewD<'_, A>) -> Result<Array2<A>> {
        if data.shape() != self.shape.as_slice() {
            return Err(MvaError::Shape(format!(
                "data of shape {:?} does not match the unfolding shape {:?}",
                data.shape(),
                self.shape
            )));
        }
        let permutation = self.permutation();
        let permuted = data.permuted_axes(permutation.as_slice());
        let owned = permuted.as_standard_layout().into_owned();
        Ok(owned.into_shape_with_order((self.n_samples(), self.n_features()))?)
    }

    /// Inverse of `unfold`.
    pub fn fold<A: Clone>(&self, matrix: ArrayView2<'_, A>) -> Result<ArrayD<A>> {
        let expected = (self.n_samples(), self.n_features());
        if matrix.dim() != expected {
            return Err(MvaError::Shape(format!(
                "cannot fold a {:?} matrix, expected {:?}",
                matrix.dim(),
                expected
            )));
        }
        let mut dims = self.navigation_shape();
        dims.extend(self.signal_shape());
        let stacked = matrix
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&dims))?;

        let permutation = self.permutation();
        let mut inverse = vec![0; permutation.len()];
        for (position, &axis) in permutation.iter().enumerate() {
            inverse[axis] = position;
        }
        Ok(stacked
            .permuted_axes(inverse.as_slice())
            .as_standard_layout()
            .into_owned())
    }

    /// `(n_features, k)` component matrix to shape `[k, signal shape..]`.
    pub fn fold_signal_components<A: Clone>(&self, components: ArrayView2<'_, A>) -> Result<ArrayD<A>> {
        fold_components(components, self.n_features(), self.signal_shape())
    }

    /// `(n_samples, k)` component matrix to shape `[k, navigation shape..]`.
    pub fn fold_navigation_components<A: Clone>(
        &self,
        components: ArrayView2<'_, A>,
    ) -> Result<ArrayD<A>> {
        fold_components(components, self.n_samples(), self.navigation_shape())
    }
}

fn fold_components<A: Clone>(
    components: ArrayView2<'_, A>,
    length: usize,
    shape: Vec<usize>,
) -> Result<ArrayD<A>> {
    if components.nrows() != length {
        return Err(MvaError::Shape(format!(
            "components have {} rows, expected {}",
            components.nrows(),
            length
        )));
    }
    let mut dims = vec![components.ncols()];
    dims.extend(shape);
    Ok(components
        .t()
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(&dims))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, array};

    #[test]
    fn test_unfold_navigation_rows_signal_columns() {
        let data = Array::from_shape_vec(IxDyn(&[2, 3]), (0..6).collect::<Vec<i32>>()).unwrap();
        let unfolding = Unfolding::new(&[2, 3], &[true, false]).unwrap();
        let matrix = unfolding.unfold(data.view()).unwrap();
        assert_eq!(matrix, array![[0, 1, 2], [3, 4, 5]]);
    }

    #[test]
    fn test_swapped_roles_give_transpose() {
        let data = Array::from_shape_fn(IxDyn(&[2, 3, 4]), |ix| ix[0] * 100 + ix[1] * 10 + ix[2]);
        let unfolding = Unfolding::new(&[2, 3, 4], &[true, false, true]).unwrap();
        let matrix = unfolding.unfold(data.view()).unwrap();
        let swapped = unfolding.transposed().unfold(data.view()).unwrap();
        assert_eq!(matrix.dim(), (8, 3));
        assert_eq!(swapped, matrix.t());
    }

    #[test]
    fn test_fold_inverts_unfold() {
        let data = Array::from_shape_fn(IxDyn(&[3, 2, 4, 2]), |ix| {
            (ix[0] * 1000 + ix[1] * 100 + ix[2] * 10 + ix[3]) as f64
        });
        let unfolding = Unfolding::new(&[3, 2, 4, 2], &[false, true, false, true]).unwrap();
        let matrix = unfolding.unfold(data.view()).unwrap();
        assert_eq!(matrix.dim(), (4, 12));
        assert_eq!(matrix[[1, 0]], 1.0);
        assert_eq!(unfolding.fold(matrix.view()).unwrap(), data);
    }

    #[test]
    fn test_unfold_without_navigation_axes() {
        let data = Array::from_shape_fn(IxDyn(&[5]), |ix| ix[0] as f64);
        let unfolding = Unfolding::new(&[5], &[false]).unwrap();
        assert_eq!(unfolding.unfold(data.view()).unwrap().dim(), (1, 5));
    }

    #[test]
    fn test_fold_signal_components() {
        let unfolding = Unfolding::new(&[4, 2, 3], &[true, false, false]).unwrap();
        let factors = Array2::from_shape_fn((6, 2), |(i, k)| (k * 10 + i) as f64);
        let folded = unfolding.fold_signal_components(factors.view()).unwrap();
        assert_eq!(folded.shape(), &[2, 2, 3]);
        assert_eq!(folded[[1, 1, 2]], 15.0);
    }

    #[test]
    fn test_mismatched_tagging_is_rejected() {
        assert!(matches!(
            Unfolding::new(&[2, 3], &[true]),
            Err(MvaError::Shape(_))
        ));
        let unfolding = Unfolding::new(&[2, 3], &[true, false]).unwrap();
        let wrong = Array2::<f64>::zeros((3, 2));
        assert!(matches!(unfolding.fold(wrong.view()), Err(MvaError::Shape(_))));
    }
}
