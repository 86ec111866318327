//! Zone axis positions on the detector.
//!
//! A zone axis is a direction shared by several diffracting planes; on the
//! detector it shows up as the point where their traces intersect.
//! [`ZoneAxis`] stores the detector-frame direction of every axis for a batch
//! of patterns and derives gnomonic positions and a radius mask from it.
//!
//! # Shape conventions
//!
//! Coordinates always carry at least one navigation axis: a bare `(m, 3)`
//! input is promoted to `(1, m, 3)`. Mask-like properties have shape
//! `navigation_shape + (m,)`.
//!
//! [`ZoneAxis::x_gnomonic`] and [`ZoneAxis::y_gnomonic`] are **filtered**:
//! they return a flat, row-major array holding only the axes within the
//! gnomonic radius. This differs from [`KikuchiBand::x_gnomonic`], which is
//! navigation-shaped and unfiltered.
//!
//! [`KikuchiBand::x_gnomonic`]: crate::band::KikuchiBand::x_gnomonic

use std::sync::Arc;

use nalgebra::Vector3;
use ndarray::{Array1, ArrayD, Axis, IxDyn, SliceInfoElem, Zip};
use tracing::debug;

use crate::crystal::{Phase, ReciprocalLatticePoints};
use crate::error::{GeometryError, Result};
use crate::navigation::{
    check_navigation_dimension, expand_key, radius_broadcastable, GnomonicRadius,
};
use crate::vector::VectorField;

/// Positions of zone axes on the detector for a batch of patterns.
#[derive(Debug, Clone)]
pub struct ZoneAxis {
    points: ReciprocalLatticePoints,
    coordinates: VectorField,
    in_pattern: ArrayD<bool>,
    gnomonic_radius: ArrayD<f64>,
}

impl ZoneAxis {
    /// Create zone-axis geometry for `m = points.size()` axes.
    ///
    /// # Arguments
    /// * `points` - Miller indices of the zone axes.
    /// * `coordinates` - Detector coordinates, shape `(m, 3)` or
    ///   `navigation_shape + (m, 3)`.
    /// * `in_pattern` - Visibility per pattern, shape `(m,)` or
    ///   `navigation_shape + (m,)`.
    /// * `gnomonic_radius` - A scalar, one radius per navigation row (1D), or
    ///   any array broadcasting against `navigation_shape + (m,)`.
    pub fn new(
        points: ReciprocalLatticePoints,
        coordinates: VectorField,
        in_pattern: ArrayD<bool>,
        gnomonic_radius: impl Into<GnomonicRadius>,
    ) -> Result<Self> {
        let (coordinates, in_pattern) = Self::promote(&points, coordinates, in_pattern)?;
        let gnomonic_radius =
            radius_broadcastable(gnomonic_radius.into(), coordinates.vector_shape())?;
        Ok(Self::assemble(points, coordinates, in_pattern, gnomonic_radius))
    }

    /// Validate shapes, promoting 2D coordinates and 1D masks by a leading axis.
    fn promote(
        points: &ReciprocalLatticePoints,
        coordinates: VectorField,
        in_pattern: ArrayD<bool>,
    ) -> Result<(VectorField, ArrayD<bool>)> {
        let coordinates = match coordinates.ndim() {
            2 => coordinates.with_leading_axis(),
            3..=4 => coordinates,
            ndim if ndim > 4 => {
                return Err(GeometryError::NavigationDimension(ndim - 2));
            }
            _ => {
                return Err(GeometryError::ShapeMismatch {
                    what: "zone axis coordinates",
                    expected: vec![points.size(), 3],
                    found: coordinates.shape().to_vec(),
                })
            }
        };
        let in_pattern = if in_pattern.ndim() < 2 {
            in_pattern.insert_axis(Axis(0))
        } else {
            in_pattern
        };

        let axis_shape = coordinates.vector_shape();
        check_navigation_dimension(&axis_shape[..axis_shape.len() - 1])?;
        let m = axis_shape[axis_shape.len() - 1];
        if m != points.size() {
            return Err(GeometryError::SizeMismatch {
                what: "zone axis coordinates",
                expected: points.size(),
                found: m,
            });
        }
        if in_pattern.shape() != axis_shape {
            return Err(GeometryError::ShapeMismatch {
                what: "in_pattern",
                expected: axis_shape.to_vec(),
                found: in_pattern.shape().to_vec(),
            });
        }
        Ok((coordinates, in_pattern))
    }

    fn assemble(
        points: ReciprocalLatticePoints,
        coordinates: VectorField,
        in_pattern: ArrayD<bool>,
        gnomonic_radius: ArrayD<f64>,
    ) -> Self {
        debug!(
            shape = ?coordinates.vector_shape(),
            radius_shape = ?gnomonic_radius.shape(),
            "created zone axis geometry"
        );
        Self {
            points,
            coordinates,
            in_pattern,
            gnomonic_radius,
        }
    }

    pub fn points(&self) -> &ReciprocalLatticePoints {
        &self.points
    }

    pub fn phase(&self) -> &Arc<Phase> {
        self.points.phase()
    }

    pub fn hkl(&self) -> &Arc<[Vector3<f64>]> {
        self.points.hkl()
    }

    /// Number of zone axes.
    pub fn size(&self) -> usize {
        self.points.size()
    }

    pub fn coordinates(&self) -> &VectorField {
        &self.coordinates
    }

    pub fn in_pattern(&self) -> &ArrayD<bool> {
        &self.in_pattern
    }

    /// Stored radius; broadcasts against `navigation_shape + (m,)`.
    pub fn gnomonic_radius(&self) -> &ArrayD<f64> {
        &self.gnomonic_radius
    }

    /// Replace the visibility cutoff.
    ///
    /// A one-dimensional value is read as one radius per navigation row and
    /// stored as a column; other shapes are stored as given. Values that do
    /// not broadcast against `navigation_shape + (m,)` are rejected.
    pub fn set_gnomonic_radius(&mut self, radius: impl Into<GnomonicRadius>) -> Result<()> {
        let radius = radius_broadcastable(radius.into(), self.coordinates.vector_shape())?;
        debug!(shape = ?radius.shape(), "updated gnomonic radius of zone axes");
        self.gnomonic_radius = radius;
        Ok(())
    }

    pub fn navigation_shape(&self) -> &[usize] {
        &self.coordinates.shape()[..self.coordinates.ndim() - 2]
    }

    pub fn navigation_dimension(&self) -> usize {
        self.navigation_shape().len()
    }

    pub fn x_detector(&self) -> ArrayD<f64> {
        self.coordinates.x()
    }

    pub fn y_detector(&self) -> ArrayD<f64> {
        self.coordinates.y()
    }

    pub fn z_detector(&self) -> ArrayD<f64> {
        self.coordinates.z()
    }

    /// Radial gnomonic distance `sqrt(x² + y²) / z`.
    pub fn r_gnomonic(&self) -> ArrayD<f64> {
        let radial = self.coordinates.radial_xy();
        let z = self.z_detector();
        Zip::from(&radial).and(&z).map_collect(|&r, &z| r / z)
    }

    /// Polar angle of each axis from the detector normal.
    pub fn theta_polar(&self) -> ArrayD<f64> {
        self.coordinates.theta()
    }

    /// Whether each axis lies strictly inside the gnomonic radius.
    pub fn within_gnomonic_radius(&self) -> ArrayD<bool> {
        let r = self.r_gnomonic();
        Zip::from(&r)
            .and_broadcast(&self.gnomonic_radius)
            .map_collect(|&r, &radius| r < radius)
    }

    /// Gnomonic x of the axes within the radius, flattened in row-major order.
    pub fn x_gnomonic(&self) -> Array1<f64> {
        self.filtered_gnomonic(&self.x_detector())
    }

    /// Gnomonic y of the axes within the radius, flattened in row-major order.
    pub fn y_gnomonic(&self) -> Array1<f64> {
        self.filtered_gnomonic(&self.y_detector())
    }

    fn filtered_gnomonic(&self, component: &ArrayD<f64>) -> Array1<f64> {
        let within = self.within_gnomonic_radius();
        let z = self.z_detector();
        within
            .iter()
            .zip(component.iter().zip(z.iter()))
            .filter(|(within, _)| **within)
            .map(|(_, (c, z))| c / z)
            .collect()
    }

    /// `[x, y]` gnomonic positions of the axes within the radius.
    pub fn gnomonic_points(&self) -> Vec<[f64; 2]> {
        self.x_gnomonic()
            .iter()
            .zip(self.y_gnomonic().iter())
            .map(|(&x, &y)| [x, y])
            .collect()
    }

    /// Select patterns by navigation key; all axes are kept.
    ///
    /// The radius is expanded to `navigation_shape + (m,)` before slicing, so
    /// per-pattern radii follow their patterns.
    pub fn slice(&self, key: &[SliceInfoElem]) -> Result<Self> {
        let navigation_shape = self.navigation_shape();
        let axis_shape = self.coordinates.vector_shape();
        let axis_key = expand_key(key, navigation_shape, axis_shape.len())?;
        let vector_key = expand_key(key, navigation_shape, self.coordinates.ndim())?;

        let radius = self
            .gnomonic_radius
            .broadcast(IxDyn(axis_shape))
            .ok_or_else(|| GeometryError::ShapeMismatch {
                what: "gnomonic radius",
                expected: axis_shape.to_vec(),
                found: self.gnomonic_radius.shape().to_vec(),
            })?;
        let mut radius = radius.slice(axis_key.as_slice()).to_owned();

        let coordinates = self.coordinates.slice(&vector_key);
        let in_pattern = self.in_pattern.slice(axis_key.as_slice()).to_owned();
        // Indexing away the only navigation axis drops to (m,), which is
        // promoted again below; keep the radius aligned with it.
        if coordinates.ndim() == 2 {
            radius = radius.insert_axis(Axis(0));
        }
        let (coordinates, in_pattern) = Self::promote(&self.points, coordinates, in_pattern)?;
        Ok(Self::assemble(
            self.points.clone(),
            coordinates,
            in_pattern,
            radius,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crystal::Lattice;

    fn points(m: usize) -> ReciprocalLatticePoints {
        let phase = Phase::new("al", Some(225), Lattice::cubic(4.05).unwrap());
        let hkl = (0..m).map(|i| Vector3::new(0.0, 1.0, i as f64)).collect();
        ReciprocalLatticePoints::new(phase, hkl)
    }

    fn zone_axis(shape: &[usize], values: Vec<f64>, radius: impl Into<GnomonicRadius>) -> ZoneAxis {
        let coordinates =
            VectorField::new(ArrayD::from_shape_vec(IxDyn(shape), values).unwrap()).unwrap();
        let mask_shape = coordinates.vector_shape().to_vec();
        let m = mask_shape[mask_shape.len() - 1];
        ZoneAxis::new(
            points(m),
            coordinates,
            ArrayD::from_elem(IxDyn(&mask_shape), true),
            radius,
        )
        .unwrap()
    }

    #[test]
    fn test_promotes_single_pattern() {
        let za = zone_axis(&[2, 3], vec![0.0, 0.0, 1.0, 1.0, 1.0, 1.0], 10.0);
        assert_eq!(za.coordinates().shape(), &[1, 2, 3]);
        assert_eq!(za.in_pattern().shape(), &[1, 2]);
        assert_eq!(za.navigation_shape(), &[1]);
        assert_eq!(za.within_gnomonic_radius().shape(), &[1, 2]);
    }

    #[test]
    fn test_r_gnomonic_and_theta() {
        let za = zone_axis(&[2, 3], vec![3.0, 4.0, 1.0, 0.0, 0.0, 2.0], 10.0);
        let r = za.r_gnomonic();
        assert!((r[[0, 0]] - 5.0).abs() < 1e-12);
        assert!(r[[0, 1]].abs() < 1e-12);
        let theta = za.theta_polar();
        assert!((theta[[0, 0]] - 5.0_f64.atan()).abs() < 1e-12);
        assert!(theta[[0, 1]].abs() < 1e-12);
    }

    #[test]
    fn test_radius_boundary_is_excluded() {
        // r_gnomonic is exactly 5
        let za = zone_axis(&[1, 3], vec![3.0, 4.0, 1.0], 5.0);
        assert!(!za.within_gnomonic_radius()[[0, 0]]);
        assert_eq!(za.x_gnomonic().len(), 0);
    }

    #[test]
    fn test_filtered_gnomonic_is_flat() {
        // Two patterns, two axes; only three of four within radius 2
        let values = vec![
            0.5, 0.0, 1.0, // r = 0.5
            3.0, 0.0, 1.0, // r = 3
            0.0, 1.0, 1.0, // r = 1
            -1.0, 0.0, 2.0, // r = 0.5
        ];
        let za = zone_axis(&[2, 2, 3], values, 2.0);
        let x = za.x_gnomonic();
        let y = za.y_gnomonic();
        assert_eq!(x.len(), 3);
        assert_eq!(x.to_vec(), vec![0.5, 0.0, -0.5]);
        assert_eq!(y.to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(za.gnomonic_points(), vec![[0.5, 0.0], [0.0, 1.0], [-0.5, 0.0]]);
    }

    #[test]
    fn test_radius_per_row_becomes_column() {
        let values = vec![1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let za = zone_axis(&[2, 1, 3], values, vec![0.5, 2.0]);
        assert_eq!(za.gnomonic_radius().shape(), &[2, 1]);
        let within = za.within_gnomonic_radius();
        assert!(!within[[0, 0]]);
        assert!(within[[1, 0]]);
    }

    #[test]
    fn test_set_gnomonic_radius_rejects_non_broadcasting() {
        let mut za = zone_axis(&[2, 1, 3], vec![1.0, 0.0, 1.0, 1.0, 0.0, 1.0], 10.0);
        assert!(za.set_gnomonic_radius(vec![1.0, 2.0, 3.0]).is_err());
        za.set_gnomonic_radius(0.5).unwrap();
        assert!(za.within_gnomonic_radius().iter().all(|&w| !w));
    }

    #[test]
    fn test_slice_keeps_radius_with_pattern() {
        let values = vec![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let za = zone_axis(&[3, 1, 3], values, vec![0.5, 2.0, 0.5]);

        let single = za.slice(&[SliceInfoElem::Index(1)]).unwrap();
        assert!(single.points().same_identity(za.points()));
        assert_eq!(single.coordinates().shape(), &[1, 1, 3]);
        assert_eq!(single.in_pattern().shape(), &[1, 1]);
        assert!(single.within_gnomonic_radius()[[0, 0]]);

        let tail = za.slice(&[SliceInfoElem::from(1isize..)]).unwrap();
        assert_eq!(tail.navigation_shape(), &[2]);
        let within = tail.within_gnomonic_radius();
        assert!(within[[0, 0]]);
        assert!(!within[[1, 0]]);
    }

    #[test]
    fn test_slicing_map_matches_raw_slicing() {
        // 2 x 3 map of patterns, two axes each
        let data = ArrayD::from_shape_fn(IxDyn(&[2, 3, 2, 3]), |ix| match ix[3] {
            2 => 1.0,
            c => (ix[0] * 6 + ix[1] * 2 + ix[2]) as f64 * 0.2 - c as f64,
        });
        let coordinates = VectorField::new(data.clone()).unwrap();
        let in_pattern =
            ArrayD::from_shape_fn(IxDyn(&[2, 3, 2]), |ix| (ix[0] + ix[1] + ix[2]) % 2 == 0);
        let radius =
            ArrayD::from_shape_fn(IxDyn(&[2, 3, 1]), |ix| 0.5 + ix[0] as f64 + 0.5 * ix[1] as f64);
        let za = ZoneAxis::new(points(2), coordinates, in_pattern.clone(), radius.clone()).unwrap();
        assert_eq!(za.navigation_shape(), &[2, 3]);
        let full_radius = radius.broadcast(IxDyn(&[2, 3, 2])).unwrap().to_owned();
        let within = za.within_gnomonic_radius();

        let all = SliceInfoElem::from(..);
        let key = [SliceInfoElem::Index(1), SliceInfoElem::from(0isize..2)];
        let row = za.slice(&key).unwrap();
        assert!(row.points().same_identity(za.points()));
        assert_eq!(row.navigation_shape(), &[2]);
        assert_eq!(
            row.coordinates().data(),
            &data.slice(&[key[0], key[1], all, all][..]).to_owned()
        );
        assert_eq!(row.in_pattern(), &in_pattern.slice(&[key[0], key[1], all][..]).to_owned());
        let expected_radius = full_radius.slice(&[key[0], key[1], all][..]).to_owned();
        assert_eq!(row.gnomonic_radius(), &expected_radius);
        assert_eq!(
            row.within_gnomonic_radius(),
            within.slice(&[key[0], key[1], all][..]).to_owned()
        );

        // Indexing both navigation axes leaves (m, 3), promoted to (1, m, 3)
        let key = [SliceInfoElem::Index(0), SliceInfoElem::Index(2)];
        let single = za.slice(&key).unwrap();
        assert_eq!(single.navigation_shape(), &[1]);
        assert_eq!(
            single.coordinates().data(),
            &data.slice(&[key[0], key[1], all, all][..]).to_owned().insert_axis(Axis(0))
        );
        assert_eq!(
            single.in_pattern(),
            &in_pattern.slice(&[key[0], key[1], all][..]).to_owned().insert_axis(Axis(0))
        );
        assert_eq!(
            single.gnomonic_radius(),
            &full_radius.slice(&[key[0], key[1], all][..]).to_owned().insert_axis(Axis(0))
        );
        assert_eq!(
            single.within_gnomonic_radius(),
            within.slice(&[key[0], key[1], all][..]).to_owned().insert_axis(Axis(0))
        );
    }

    #[test]
    fn test_constructor_rejects_mismatched_mask() {
        let coordinates =
            VectorField::new(ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0.0; 6]).unwrap()).unwrap();
        let mask = ArrayD::from_elem(IxDyn(&[2, 2]), true);
        assert!(matches!(
            ZoneAxis::new(points(2), coordinates, mask, 10.0),
            Err(GeometryError::ShapeMismatch { .. })
        ));
    }
}
