//! Batched 3-vector field.
//!
//! A [`VectorField`] stores an arbitrary-shaped collection of 3-vectors as one
//! `ndarray` array whose last axis has length 3. All derived quantities are
//! returned with the shape of the field minus that last axis.
//!
//! # Angle conventions
//!
//! - `theta`: polar angle from +Z, in `[0, π]`; NaN for the zero vector.
//! - `phi`: azimuth from +X towards +Y, in `(-π, π]`.

use nalgebra::Vector3;
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, SliceInfoElem, Zip};

use crate::error::{GeometryError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    data: ArrayD<f64>,
}

impl VectorField {
    /// Wrap an array whose last axis holds `[x, y, z]`.
    pub fn new(data: ArrayD<f64>) -> Result<Self> {
        match data.shape().last() {
            Some(&3) => Ok(Self { data }),
            _ => {
                let mut expected = data.shape().to_vec();
                match expected.last_mut() {
                    Some(last) => *last = 3,
                    None => expected.push(3),
                }
                Err(GeometryError::ShapeMismatch {
                    what: "vector field",
                    expected,
                    found: data.shape().to_vec(),
                })
            }
        }
    }

    /// A flat `(n, 3)` field from individual vectors.
    pub fn from_vectors(vectors: &[Vector3<f64>]) -> Self {
        let mut data = ArrayD::zeros(IxDyn(&[vectors.len(), 3]));
        for (mut row, v) in data.outer_iter_mut().zip(vectors) {
            row[[0]] = v.x;
            row[[1]] = v.y;
            row[[2]] = v.z;
        }
        Self { data }
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Full shape, including the trailing component axis.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Shape of the field without the trailing component axis.
    pub fn vector_shape(&self) -> &[usize] {
        &self.data.shape()[..self.data.ndim() - 1]
    }

    fn component(&self, index: usize) -> ArrayViewD<'_, f64> {
        self.data.index_axis(Axis(self.data.ndim() - 1), index)
    }

    pub fn x(&self) -> ArrayD<f64> {
        self.component(0).to_owned()
    }

    pub fn y(&self) -> ArrayD<f64> {
        self.component(1).to_owned()
    }

    pub fn z(&self) -> ArrayD<f64> {
        self.component(2).to_owned()
    }

    pub fn norm(&self) -> ArrayD<f64> {
        Zip::from(self.component(0))
            .and(self.component(1))
            .and(self.component(2))
            .map_collect(|&x, &y, &z| (x * x + y * y + z * z).sqrt())
    }

    /// Length of the projection onto the xy-plane.
    pub fn radial_xy(&self) -> ArrayD<f64> {
        Zip::from(self.component(0))
            .and(self.component(1))
            .map_collect(|&x, &y| x.hypot(y))
    }

    pub fn theta(&self) -> ArrayD<f64> {
        Zip::from(self.component(0))
            .and(self.component(1))
            .and(self.component(2))
            .map_collect(|&x, &y, &z| {
                let norm = (x * x + y * y + z * z).sqrt();
                (z / norm).clamp(-1.0, 1.0).acos()
            })
    }

    pub fn phi(&self) -> ArrayD<f64> {
        Zip::from(self.component(0))
            .and(self.component(1))
            .map_collect(|&x, &y| y.atan2(x))
    }

    /// Prepend a length-1 axis.
    pub(crate) fn with_leading_axis(self) -> Self {
        Self {
            data: self.data.insert_axis(Axis(0)),
        }
    }

    /// Slice with one element per axis, the component axis included.
    pub(crate) fn slice(&self, info: &[SliceInfoElem]) -> Self {
        Self {
            data: self.data.slice(info).to_owned(),
        }
    }
}
