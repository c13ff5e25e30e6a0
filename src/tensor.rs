//! Truncated higher-order SVD (Tucker decomposition) of N-dimensional data.

use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, IxDyn, s};

use crate::error::{MvaError, Result};
use crate::linalg::{Field, Svd, adjoint};

/// `data ~= core x_1 factors[0] x_2 factors[1] ...`
///
/// `factors[n]` has orthonormal columns and shape `(shape[n], ranks[n])`;
/// `core` has shape `ranks`.
#[derive(Clone, Debug, PartialEq)]
pub struct TuckerDecomposition<T> {
    pub core: ArrayD<T>,
    pub factors: Vec<Array2<T>>,
}

impl<T: Field> TuckerDecomposition<T> {
    pub fn ranks(&self) -> Vec<usize> {
        self.factors.iter().map(|f| f.ncols()).collect()
    }

    /// Expands the core back to the full data shape.
    pub fn reconstruct(&self) -> Result<ArrayD<T>> {
        let mut tensor = self.core.clone();
        for (mode, factor) in self.factors.iter().enumerate() {
            tensor = mode_product(&tensor, factor.view(), mode)?;
        }
        Ok(tensor)
    }
}

/// Truncated HOSVD with one rank per array axis.
pub fn hosvd<T: Field>(data: ArrayViewD<'_, T>, ranks: &[usize]) -> Result<TuckerDecomposition<T>> {
    let shape = data.shape().to_vec();
    if ranks.len() != shape.len() {
        return Err(MvaError::Shape(format!(
            "{} ranks given for data with {} dimensions",
            ranks.len(),
            shape.len()
        )));
    }

    let tensor = data.to_owned();
    let mut factors = Vec::with_capacity(ranks.len());
    for (mode, &rank) in ranks.iter().enumerate() {
        let svd = Svd::compute(unfold_mode(&tensor, mode)?.view())?;
        if rank == 0 || rank > svd.rank() {
            return Err(MvaError::Shape(format!(
                "rank {rank} along axis {mode} exceeds the available {}",
                svd.rank()
            )));
        }
        factors.push(svd.u.slice(s![.., ..rank]).to_owned());
    }

    let mut core = tensor;
    for (mode, factor) in factors.iter().enumerate() {
        core = mode_product(&core, adjoint(factor.view()).view(), mode)?;
    }
    tracing::debug!(?shape, ?ranks, "tucker decomposition finished");
    Ok(TuckerDecomposition { core, factors })
}

/// Matrix whose rows follow axis `mode` and whose columns run over the
/// remaining axes in order.
fn unfold_mode<T: Field>(tensor: &ArrayD<T>, mode: usize) -> Result<Array2<T>> {
    let ndim = tensor.ndim();
    let mut permutation = vec![mode];
    permutation.extend((0..ndim).filter(|&i| i != mode));
    let rows = tensor.shape()[mode];
    let cols = if rows == 0 { 0 } else { tensor.len() / rows };
    Ok(tensor
        .view()
        .permuted_axes(permutation.as_slice())
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((rows, cols))?)
}

/// `tensor x_mode matrix`: contracts axis `mode` with the columns of `matrix`.
fn mode_product<T: Field>(tensor: &ArrayD<T>, matrix: ArrayView2<'_, T>, mode: usize) -> Result<ArrayD<T>> {
    let ndim = tensor.ndim();
    if matrix.ncols() != tensor.shape()[mode] {
        return Err(MvaError::Shape(format!(
            "cannot multiply axis {mode} of length {} by a {:?} matrix",
            tensor.shape()[mode],
            matrix.dim()
        )));
    }
    let product = matrix.dot(&unfold_mode(tensor, mode)?);

    let mut dims = vec![matrix.nrows()];
    dims.extend(
        tensor
            .shape()
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != mode)
            .map(|(_, &n)| n),
    );
    let stacked = product.into_shape_with_order(IxDyn(&dims))?;

    let mut permutation: Vec<usize> = (1..ndim).collect();
    permutation.insert(mode, 0);
    Ok(stacked
        .permuted_axes(permutation.as_slice())
        .as_standard_layout()
        .into_owned())
}
