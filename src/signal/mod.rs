//! N-dimensional signal container consumed by the learning-results engine.
//!
//! A `Signal` pairs an `ndarray::ArrayD` with one `Axis` descriptor per
//! dimension. Each axis is either a navigation axis (it indexes samples) or
//! a signal axis (it indexes features within a sample).

mod element;
mod unfold;

pub use element::{DType, Element};
pub use unfold::Unfolding;

use ndarray::{ArrayD, Axis as ArrayAxis};
use serde::{Deserialize, Serialize};

use crate::error::{MvaError, Result};
use crate::learning_results::LearningResults;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub size: usize,
    pub scale: f64,
    pub offset: f64,
    #[serde(default)]
    pub units: String,
    pub navigate: bool,
}

impl Axis {
    pub fn new(name: &str, size: usize, navigate: bool) -> Self {
        Self {
            name: name.to_string(),
            size,
            scale: 1.0,
            offset: 0.0,
            units: String::new(),
            navigate,
        }
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    /// Calibrated coordinate of every index along the axis.
    pub fn coordinates(&self) -> Vec<f64> {
        (0..self.size)
            .map(|i| self.offset + self.scale * i as f64)
            .collect()
    }
}

/// Array data, axis metadata and the learning results derived from them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct Signal<A: Element> {
    #[serde(with = "crate::persistence::array")]
    data: ArrayD<A>,
    axes: Vec<Axis>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    learning_results: LearningResults<A::Field>,
}

impl<A: Element> Signal<A> {
    /// The last axis is the signal axis, every other axis navigates.
    pub fn new(data: ArrayD<A>) -> Self {
        Self::signal1d(data)
    }

    pub fn signal1d(data: ArrayD<A>) -> Self {
        Self::with_signal_dimension(data, 1)
    }

    /// The last two axes are signal axes.
    pub fn signal2d(data: ArrayD<A>) -> Self {
        Self::with_signal_dimension(data, 2)
    }

    /// Every axis is a signal axis.
    pub fn base(data: ArrayD<A>) -> Self {
        let ndim = data.ndim();
        Self::with_signal_dimension(data, ndim)
    }

    /// One navigate flag per axis of `data`.
    pub fn from_roles(data: ArrayD<A>, navigate: &[bool]) -> Result<Self> {
        if navigate.len() != data.ndim() {
            return Err(MvaError::Shape(format!(
                "{} axis roles given for data with {} dimensions",
                navigate.len(),
                data.ndim()
            )));
        }
        let axes = data
            .shape()
            .iter()
            .zip(navigate)
            .enumerate()
            .map(|(i, (&size, &nav))| Axis::new(&format!("axis{i}"), size, nav))
            .collect();
        Ok(Self::from_parts(data, axes))
    }

    /// Builds a signal with explicit axis descriptors.
    pub fn with_axes(data: ArrayD<A>, axes: Vec<Axis>) -> Result<Self> {
        Unfolding::from_axes(&axes, data.shape())?;
        Ok(Self::from_parts(data, axes))
    }

    fn with_signal_dimension(data: ArrayD<A>, signal_dimension: usize) -> Self {
        let ndim = data.ndim();
        let first_signal = ndim.saturating_sub(signal_dimension);
        let axes = data
            .shape()
            .iter()
            .enumerate()
            .map(|(i, &size)| Axis::new(&format!("axis{i}"), size, i < first_signal))
            .collect();
        Self::from_parts(data, axes)
    }

    fn from_parts(data: ArrayD<A>, axes: Vec<Axis>) -> Self {
        Self {
            data,
            axes,
            title: String::new(),
            learning_results: LearningResults::default(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn data(&self) -> &ArrayD<A> {
        &self.data
    }

    pub fn into_data(self) -> ArrayD<A> {
        self.data
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn dtype(&self) -> DType {
        A::DTYPE
    }

    pub fn navigation_shape(&self) -> Vec<usize> {
        self.axes.iter().filter(|a| a.navigate).map(|a| a.size).collect()
    }

    pub fn signal_shape(&self) -> Vec<usize> {
        self.axes.iter().filter(|a| !a.navigate).map(|a| a.size).collect()
    }

    pub fn navigation_dimension(&self) -> usize {
        self.axes.iter().filter(|a| a.navigate).count()
    }

    pub fn signal_dimension(&self) -> usize {
        self.axes.len() - self.navigation_dimension()
    }

    pub fn set_navigate(&mut self, axis: usize, navigate: bool) -> Result<()> {
        let ndim = self.axes.len();
        let descriptor = self.axes.get_mut(axis).ok_or_else(|| {
            MvaError::Shape(format!("axis {axis} out of range for {ndim} dimensions"))
        })?;
        descriptor.navigate = navigate;
        Ok(())
    }

    /// Same data with every navigation axis turned into a signal axis and
    /// vice versa. The copy starts with empty learning results.
    pub fn transpose_roles(&self) -> Self {
        let axes = self
            .axes
            .iter()
            .map(|axis| Axis {
                navigate: !axis.navigate,
                ..axis.clone()
            })
            .collect();
        Self {
            data: self.data.clone(),
            axes,
            title: self.title.clone(),
            learning_results: LearningResults::default(),
        }
    }

    /// Owned sub-signal at one navigation position.
    ///
    /// `index` holds one entry per navigation axis, in axis order.
    pub fn inav(&self, index: &[usize]) -> Result<Self> {
        let navigation: Vec<usize> = (0..self.axes.len())
            .filter(|&i| self.axes[i].navigate)
            .collect();
        if index.len() != navigation.len() {
            return Err(MvaError::Shape(format!(
                "{} indices given for {} navigation axes",
                index.len(),
                navigation.len()
            )));
        }

        let mut view = self.data.view();
        for (&axis, &position) in navigation.iter().zip(index).rev() {
            if position >= self.axes[axis].size {
                return Err(MvaError::Shape(format!(
                    "index {} out of range for axis `{}` of size {}",
                    position, self.axes[axis].name, self.axes[axis].size
                )));
            }
            view = view.index_axis_move(ArrayAxis(axis), position);
        }

        let axes = self.axes.iter().filter(|a| !a.navigate).cloned().collect();
        Ok(Self {
            data: view.to_owned(),
            axes,
            title: self.title.clone(),
            learning_results: LearningResults::default(),
        })
    }

    pub fn unfolding(&self) -> Result<Unfolding> {
        Unfolding::from_axes(&self.axes, self.data.shape())
    }

    pub fn learning_results(&self) -> &LearningResults<A::Field> {
        &self.learning_results
    }

    pub fn learning_results_mut(&mut self) -> &mut LearningResults<A::Field> {
        &mut self.learning_results
    }

    /// Signal sharing this one's axes and title over new data.
    pub(crate) fn derived<B: Element>(&self, data: ArrayD<B>) -> Signal<B> {
        Signal {
            data,
            axes: self.axes.clone(),
            title: self.title.clone(),
            learning_results: LearningResults::default(),
        }
    }
}
