//! Kikuchi band positions on the detector.
//!
//! A [`KikuchiBand`] holds, for every pattern in a batch, the detector-frame
//! pole of every diffracting plane. From these poles it derives where each
//! band's center line (the plane trace) crosses the detector, in gnomonic
//! coordinates: the detector plane at `z = 1` with the projection center at the
//! origin.
//!
//! # Geometry
//!
//! For a plane with pole polar angle θ and azimuth φ:
//!
//! ```text
//! d  = tan(π/2 − θ)                         Hesse normal form distance
//! α  = arccos(d / r)                        half-angle of the trace within radius r
//! P1 = r · (cos(φ − π + α), sin(φ − π + α))
//! P2 = r · (cos(φ − π − α), sin(φ − π − α))
//! ```
//!
//! The trace is the chord of the circle of radius `r` whose foot point lies at
//! `−d · (cos φ, sin φ)`.
//!
//! All array-valued properties are recomputed from the stored poles on every
//! call and have the navigation shape first.

use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

use nalgebra::Vector3;
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, SliceInfoElem, Zip};
use tracing::debug;

use crate::crystal::{Phase, ReciprocalLatticePoints};
use crate::error::{GeometryError, Result};
use crate::navigation::{
    check_navigation_dimension, expand_key, radius_per_pattern, GnomonicRadius,
};
use crate::vector::VectorField;

/// Poles with `z` at or below `-UPPER_HEMISPHERE_TOLERANCE` lie on the far
/// hemisphere and never produce a visible trace.
pub const UPPER_HEMISPHERE_TOLERANCE: f64 = 1e-5;

/// Center positions of Kikuchi bands on the detector for a batch of patterns.
#[derive(Debug, Clone)]
pub struct KikuchiBand {
    points: ReciprocalLatticePoints,
    hkl_detector: VectorField,
    in_pattern: ArrayD<bool>,
    gnomonic_radius: ArrayD<f64>,
}

impl KikuchiBand {
    /// Create band geometry for `n = points.size()` planes.
    ///
    /// # Arguments
    /// * `points` - Miller indices of every plane present in any pattern.
    /// * `hkl_detector` - Detector coordinates of each plane pole, shape
    ///   `navigation_shape + (n, 3)` with at most two navigation axes.
    /// * `in_pattern` - Whether a plane is visible in a pattern, shape
    ///   `navigation_shape + (n,)`.
    /// * `gnomonic_radius` - One radius for all patterns or one per pattern.
    pub fn new(
        points: ReciprocalLatticePoints,
        hkl_detector: VectorField,
        in_pattern: ArrayD<bool>,
        gnomonic_radius: impl Into<GnomonicRadius>,
    ) -> Result<Self> {
        if hkl_detector.ndim() < 2 {
            return Err(GeometryError::ShapeMismatch {
                what: "hkl_detector",
                expected: vec![points.size(), 3],
                found: hkl_detector.shape().to_vec(),
            });
        }
        let band_shape = hkl_detector.vector_shape();
        let navigation_shape = &band_shape[..band_shape.len() - 1];
        check_navigation_dimension(navigation_shape)?;

        let n = band_shape[band_shape.len() - 1];
        if n != points.size() {
            return Err(GeometryError::SizeMismatch {
                what: "hkl_detector",
                expected: points.size(),
                found: n,
            });
        }
        if in_pattern.shape() != band_shape {
            return Err(GeometryError::ShapeMismatch {
                what: "in_pattern",
                expected: band_shape.to_vec(),
                found: in_pattern.shape().to_vec(),
            });
        }

        let gnomonic_radius = radius_per_pattern(gnomonic_radius.into(), navigation_shape)?;
        debug!(
            navigation_shape = ?navigation_shape,
            bands = n,
            visible = in_pattern.iter().filter(|&&v| v).count(),
            "created Kikuchi band geometry"
        );

        Ok(Self {
            points,
            hkl_detector,
            in_pattern,
            gnomonic_radius,
        })
    }

    // ── Identity and stored state ───────────────────────────────────────────

    pub fn points(&self) -> &ReciprocalLatticePoints {
        &self.points
    }

    pub fn phase(&self) -> &Arc<Phase> {
        self.points.phase()
    }

    pub fn hkl(&self) -> &Arc<[Vector3<f64>]> {
        self.points.hkl()
    }

    /// Number of planes.
    pub fn size(&self) -> usize {
        self.points.size()
    }

    /// Detector coordinates of all plane poles per pattern.
    pub fn hkl_detector(&self) -> &VectorField {
        &self.hkl_detector
    }

    /// Which bands are visible in which patterns.
    pub fn in_pattern(&self) -> &ArrayD<bool> {
        &self.in_pattern
    }

    /// Per-pattern gnomonic radius, shape `navigation_shape`.
    pub fn gnomonic_radius(&self) -> &ArrayD<f64> {
        &self.gnomonic_radius
    }

    /// Replace the visibility cutoff without touching the geometry.
    ///
    /// Accepts one value for all patterns or exactly one value per pattern;
    /// any other element count is rejected and the old radius is kept.
    pub fn set_gnomonic_radius(&mut self, radius: impl Into<GnomonicRadius>) -> Result<()> {
        let radius = radius_per_pattern(radius.into(), self.navigation_shape())?;
        debug!(shape = ?radius.shape(), "updated gnomonic radius of Kikuchi bands");
        self.gnomonic_radius = radius;
        Ok(())
    }

    pub fn navigation_shape(&self) -> &[usize] {
        &self.hkl_detector.shape()[..self.hkl_detector.ndim() - 2]
    }

    /// Number of navigation axes (at most 2).
    pub fn navigation_dimension(&self) -> usize {
        self.navigation_shape().len()
    }

    /// Shape of every per-band array: `navigation_shape + (n,)`.
    fn band_shape(&self) -> &[usize] {
        self.hkl_detector.vector_shape()
    }

    /// Gnomonic radius with a trailing length-1 axis, ready to broadcast
    /// across the band axis.
    fn radius_column(&self) -> ArrayViewD<'_, f64> {
        self.gnomonic_radius
            .view()
            .insert_axis(Axis(self.navigation_dimension()))
    }

    // ── Detector and gnomonic coordinates ───────────────────────────────────

    pub fn x_detector(&self) -> ArrayD<f64> {
        self.hkl_detector.x()
    }

    pub fn y_detector(&self) -> ArrayD<f64> {
        self.hkl_detector.y()
    }

    pub fn z_detector(&self) -> ArrayD<f64> {
        self.hkl_detector.z()
    }

    /// `x / z` for every pole, unfiltered and navigation-shaped.
    ///
    /// Non-finite where the pole lies in the detector plane (`z = 0`).
    pub fn x_gnomonic(&self) -> ArrayD<f64> {
        let x = self.x_detector();
        let z = self.z_detector();
        Zip::from(&x).and(&z).map_collect(|&x, &z| x / z)
    }

    /// `y / z` for every pole, unfiltered and navigation-shaped.
    ///
    /// Non-finite where the pole lies in the detector plane (`z = 0`).
    pub fn y_gnomonic(&self) -> ArrayD<f64> {
        let y = self.y_detector();
        let z = self.z_detector();
        Zip::from(&y).and(&z).map_collect(|&y, &z| y / z)
    }

    // ── Hesse normal form ───────────────────────────────────────────────────

    /// Signed distance from the projection center to each plane trace.
    pub fn hesse_distance(&self) -> ArrayD<f64> {
        self.hkl_detector.theta().mapv(|theta| (FRAC_PI_2 - theta).tan())
    }

    /// Whether a plane trace crosses the circle of the gnomonic radius.
    ///
    /// True where `|hesse_distance| < gnomonic_radius` and the pole is not on
    /// the far hemisphere.
    pub fn within_gnomonic_radius(&self) -> ArrayD<bool> {
        let distance = self.hesse_distance();
        let z = self.z_detector();
        Zip::from(&distance)
            .and(&z)
            .and_broadcast(self.radius_column())
            .map_collect(|&d, &z, &r| d.abs() < r && z > -UPPER_HEMISPHERE_TOLERANCE)
    }

    /// Half-angle subtended by each plane trace, in `[0, π]`.
    ///
    /// NaN for traces outside the gnomonic radius.
    pub fn hesse_alpha(&self) -> ArrayD<f64> {
        let within = self.within_gnomonic_radius();
        let distance = self.hesse_distance();
        Zip::from(&distance)
            .and(&within)
            .and_broadcast(self.radius_column())
            .map_collect(|&d, &within, &r| {
                let d = if within { d } else { f64::NAN };
                (d / r).acos()
            })
    }

    /// Plane trace end points P1, P2 in gnomonic coordinates, shape
    /// `navigation_shape + (n, 4)`.
    ///
    /// The last axis holds `r · (cos α1, cos α2, sin α1, sin α2)`, that is
    /// `[x1, x2, y1, y2]`. Both points lie on the circle of the gnomonic
    /// radius. Rows for traces outside the radius are NaN. Use
    /// [`plane_trace_segments`](Self::plane_trace_segments) for point-ordered
    /// `[x1, y1, x2, y2]` rows.
    pub fn plane_trace_coordinates(&self) -> ArrayD<f64> {
        let phi = self.hkl_detector.phi();
        let alpha = self.hesse_alpha();

        let mut shape = self.band_shape().to_vec();
        shape.push(4);
        let mut traces = ArrayD::<f64>::zeros(IxDyn(&shape));
        let last = Axis(shape.len() - 1);

        let alpha1 = Zip::from(&phi).and(&alpha).map_collect(|&p, &a| p - PI + a);
        let alpha2 = Zip::from(&phi).and(&alpha).map_collect(|&p, &a| p - PI - a);
        let columns: [(&ArrayD<f64>, fn(f64) -> f64); 4] = [
            (&alpha1, f64::cos),
            (&alpha2, f64::cos),
            (&alpha1, f64::sin),
            (&alpha2, f64::sin),
        ];
        for (k, (angle, f)) in columns.into_iter().enumerate() {
            Zip::from(traces.index_axis_mut(last, k))
                .and(angle)
                .and_broadcast(self.radius_column())
                .for_each(|t, &a, &r| *t = r * f(a));
        }
        traces
    }

    /// x coordinate of the foot of the perpendicular from the projection
    /// center to each trace line; independent of the gnomonic radius.
    pub fn hesse_line_x(&self) -> ArrayD<f64> {
        let distance = self.hesse_distance();
        let phi = self.hkl_detector.phi();
        Zip::from(&distance)
            .and(&phi)
            .map_collect(|&d, &p| -d * p.cos())
    }

    /// y coordinate of the foot of the perpendicular from the projection
    /// center to each trace line; independent of the gnomonic radius.
    pub fn hesse_line_y(&self) -> ArrayD<f64> {
        let distance = self.hesse_distance();
        let phi = self.hkl_detector.phi();
        Zip::from(&distance)
            .and(&phi)
            .map_collect(|&d, &p| -d * p.sin())
    }

    // ── Slicing and export ──────────────────────────────────────────────────

    /// Select patterns by navigation key.
    ///
    /// The key addresses navigation axes only; all planes are kept. The
    /// result shares its phase and Miller indices with `self`.
    pub fn slice(&self, key: &[SliceInfoElem]) -> Result<Self> {
        let navigation_shape = self.navigation_shape();
        let vector_key = expand_key(key, navigation_shape, self.hkl_detector.ndim())?;
        let band_key = expand_key(key, navigation_shape, self.in_pattern.ndim())?;
        let radius_key = expand_key(key, navigation_shape, self.gnomonic_radius.ndim())?;

        let sliced = Self {
            points: self.points.clone(),
            hkl_detector: self.hkl_detector.slice(&vector_key),
            in_pattern: self.in_pattern.slice(band_key.as_slice()).to_owned(),
            gnomonic_radius: self.gnomonic_radius.slice(radius_key.as_slice()).to_owned(),
        };
        debug!(
            from = ?navigation_shape,
            to = ?sliced.navigation_shape(),
            "sliced Kikuchi band geometry"
        );
        Ok(sliced)
    }

    /// Plane trace segments `[x1, y1, x2, y2]` of one pattern, for planes that
    /// are both visible in the pattern and within the gnomonic radius.
    ///
    /// Unlike [`plane_trace_coordinates`](Self::plane_trace_coordinates), each
    /// row lists the first point before the second.
    ///
    /// `index` holds one position per navigation axis.
    pub fn plane_trace_segments(&self, index: &[usize]) -> Result<Vec<[f64; 4]>> {
        let navigation_shape = self.navigation_shape();
        if index.len() != navigation_shape.len()
            || index.iter().zip(navigation_shape).any(|(&i, &len)| i >= len)
        {
            return Err(GeometryError::InvalidKey(format!(
                "pattern index {index:?} does not address navigation shape {navigation_shape:?}"
            )));
        }
        let key: Vec<SliceInfoElem> = index
            .iter()
            .map(|&i| SliceInfoElem::Index(i as isize))
            .collect();

        let traces = self.plane_trace_coordinates();
        let traces = traces.slice(expand_key(&key, navigation_shape, traces.ndim())?.as_slice());
        let visible = self
            .in_pattern
            .slice(expand_key(&key, navigation_shape, self.in_pattern.ndim())?.as_slice());

        Ok(traces
            .outer_iter()
            .zip(visible.iter())
            .filter(|(row, visible)| **visible && row.iter().all(|v| v.is_finite()))
            .map(|(row, _)| [row[[0]], row[[2]], row[[1]], row[[3]]])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crystal::Lattice;

    fn points(n: usize) -> ReciprocalLatticePoints {
        let phase = Phase::new("ni", Some(225), Lattice::cubic(3.52).unwrap());
        let hkl = (0..n).map(|i| Vector3::new(1.0, 1.0, i as f64)).collect();
        ReciprocalLatticePoints::new(phase, hkl)
    }

    fn band(shape: &[usize], vectors: Vec<f64>, radius: impl Into<GnomonicRadius>) -> KikuchiBand {
        let hkl_detector =
            VectorField::new(ArrayD::from_shape_vec(IxDyn(shape), vectors).unwrap()).unwrap();
        let band_shape = hkl_detector.vector_shape().to_vec();
        let n = band_shape[band_shape.len() - 1];
        KikuchiBand::new(
            points(n),
            hkl_detector,
            ArrayD::from_elem(IxDyn(&band_shape), true),
            radius,
        )
        .unwrap()
    }

    #[test]
    fn test_pole_in_detector_plane_traces_diameter() {
        // θ = π/2, so the plane contains the projection centre
        let b = band(&[1, 3], vec![1.0, 0.0, 0.0], 10.0);
        assert_eq!(b.navigation_dimension(), 0);
        assert!(b.hesse_distance()[[0]].abs() < 1e-12);
        assert!(b.within_gnomonic_radius()[[0]]);
        assert!((b.hesse_alpha()[[0]] - FRAC_PI_2).abs() < 1e-12);

        let t = b.plane_trace_coordinates();
        assert_eq!(t.shape(), &[1, 4]);
        let (x1, x2, y1, y2) = (t[[0, 0]], t[[0, 1]], t[[0, 2]], t[[0, 3]]);
        // Diametrically opposite points on the radius-10 circle, along y
        assert!(x1.abs() < 1e-9 && x2.abs() < 1e-9, "x1 = {x1}, x2 = {x2}");
        assert!((y1 + 10.0).abs() < 1e-9 && (y2 - 10.0).abs() < 1e-9);
        let length = (x1 - x2).hypot(y1 - y2);
        assert!((length - 20.0).abs() < 1e-9, "trace length {length}");
    }

    #[test]
    fn test_pole_along_detector_normal_is_never_within() {
        // θ = 0 puts the trace at infinity
        let b = band(&[1, 3], vec![0.0, 0.0, 1.0], 10.0);
        let d = b.hesse_distance()[[0]];
        assert!(d > 1e15, "d = {d}");
        for radius in [10.0, 1e6, 1e12, 1e15] {
            let mut b = b.clone();
            b.set_gnomonic_radius(radius).unwrap();
            assert!(!b.within_gnomonic_radius()[[0]], "within radius {radius}");
            assert!(b.hesse_alpha()[[0]].is_nan());
        }
    }

    #[test]
    fn test_far_hemisphere_never_within() {
        let b = band(&[2, 3], vec![0.0, 0.0, -1.0, 0.3, 0.0, -1e-5], 10.0);
        let within = b.within_gnomonic_radius();
        assert!(!within[[0]]);
        assert!(!within[[1]], "z = -1e-5 is outside the tolerance band");
        assert!(b.hesse_alpha().iter().all(|a| a.is_nan()));
        assert!(b.plane_trace_coordinates().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_horizon_tolerance() {
        // Just below the equator, but within tolerance
        let b = band(&[1, 3], vec![1.0, 0.0, -1e-6], 10.0);
        let d = b.hesse_distance()[[0]];
        assert!(d.abs() < 1e-5, "d = {d}");
        assert!(b.within_gnomonic_radius()[[0]]);
    }

    #[test]
    fn test_gnomonic_is_detector_over_z() {
        let b = band(&[2, 3], vec![0.2, -0.4, 0.8, 1.0, 2.0, 0.0], 10.0);
        let xg = b.x_gnomonic();
        let yg = b.y_gnomonic();
        assert!((xg[[0]] - 0.25).abs() < 1e-12);
        assert!((yg[[0]] + 0.5).abs() < 1e-12);
        // No guarding against z = 0
        assert!(!xg[[1]].is_finite());
        assert!(!yg[[1]].is_finite());
    }

    #[test]
    fn test_hesse_line_foot_point() {
        // Pole tilted 45° from the detector normal towards +x
        let b = band(&[1, 3], vec![1.0, 0.0, 1.0], 10.0);
        let d = b.hesse_distance()[[0]];
        assert!((d - 1.0).abs() < 1e-12, "d = {d}");
        assert!((b.hesse_line_x()[[0]] + 1.0).abs() < 1e-12);
        assert!(b.hesse_line_y()[[0]].abs() < 1e-12);

        // Both trace end points have x = -d, so the trace is the line x = -1
        let t = b.plane_trace_coordinates();
        assert!((t[[0, 0]] + 1.0).abs() < 1e-9);
        assert!((t[[0, 1]] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_hesse_distance_beyond_radius() {
        // d = tan(π/2 − θ) = z / |xy| = 1.5
        let b = band(&[1, 3], vec![1.0, 0.0, 1.5], 1.2);
        assert!(!b.within_gnomonic_radius()[[0]]);
        assert!(b.hesse_alpha()[[0]].is_nan());
        assert!(b.hesse_line_x()[[0]].is_finite());
    }

    #[test]
    fn test_radius_per_pattern() {
        // Two patterns with the same plane, different radii
        let b = band(&[2, 1, 3], vec![1.0, 0.0, 2.0, 1.0, 0.0, 2.0], vec![1.0, 3.0]);
        let within = b.within_gnomonic_radius();
        assert_eq!(within.shape(), &[2, 1]);
        assert!(!within[[0, 0]]);
        assert!(within[[1, 0]]);
        assert_eq!(b.plane_trace_coordinates().shape(), &[2, 1, 4]);
    }

    #[test]
    fn test_set_gnomonic_radius_validates_shape() {
        let mut b = band(&[2, 3, 1, 3], vec![0.0, 0.0, 1.0].repeat(6), 10.0);
        assert_eq!(b.gnomonic_radius().shape(), &[2, 3]);

        b.set_gnomonic_radius(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(b.gnomonic_radius()[[1, 2]], 6.0);

        let err = b.set_gnomonic_radius(vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, GeometryError::ShapeMismatch { .. }));
        // Rejected update leaves the radius untouched
        assert_eq!(b.gnomonic_radius()[[1, 2]], 6.0);

        b.set_gnomonic_radius(2.5).unwrap();
        assert!(b.gnomonic_radius().iter().all(|&r| r == 2.5));
    }

    #[test]
    fn test_constructor_rejects_mismatches() {
        let hkl_detector =
            VectorField::new(ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0.0; 6]).unwrap()).unwrap();
        let wrong_mask = ArrayD::from_elem(IxDyn(&[3]), true);
        assert!(matches!(
            KikuchiBand::new(points(2), hkl_detector.clone(), wrong_mask, 10.0),
            Err(GeometryError::ShapeMismatch { .. })
        ));
        let mask = ArrayD::from_elem(IxDyn(&[2]), true);
        assert!(matches!(
            KikuchiBand::new(points(3), hkl_detector, mask, 10.0),
            Err(GeometryError::SizeMismatch { .. })
        ));

        let too_deep = VectorField::new(ArrayD::zeros(IxDyn(&[1, 1, 1, 2, 3]))).unwrap();
        let mask = ArrayD::from_elem(IxDyn(&[1, 1, 1, 2]), true);
        assert!(matches!(
            KikuchiBand::new(points(2), too_deep, mask, 10.0),
            Err(GeometryError::NavigationDimension(3))
        ));
    }

    #[test]
    fn test_slice_preserves_identity() {
        let vectors: Vec<f64> = (0..12).map(|i| i as f64 + 1.0).collect();
        let b = band(&[2, 2, 3], vectors, vec![4.0, 5.0]);
        let s = b.slice(&[SliceInfoElem::Index(1)]).unwrap();
        assert!(s.points().same_identity(b.points()));
        assert_eq!(s.navigation_dimension(), 0);
        assert_eq!(s.hkl_detector().shape(), &[2, 3]);
        assert_eq!(s.hkl_detector().data()[[0, 0]], 7.0);
        assert_eq!(s.gnomonic_radius().ndim(), 0);
        assert_eq!(s.gnomonic_radius().iter().next(), Some(&5.0));

        assert!(b.slice(&[SliceInfoElem::Index(2)]).is_err());
    }

    #[test]
    fn test_plane_trace_segments_skip_hidden_bands() {
        let hkl_detector = VectorField::new(
            ArrayD::from_shape_vec(
                IxDyn(&[3, 3]),
                vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, -1.0],
            )
            .unwrap(),
        )
        .unwrap();
        let in_pattern = ArrayD::from_shape_vec(IxDyn(&[3]), vec![true, false, true]).unwrap();
        let b = KikuchiBand::new(points(3), hkl_detector, in_pattern, 10.0).unwrap();

        let segments = b.plane_trace_segments(&[]).unwrap();
        assert_eq!(segments.len(), 1, "only the first band is visible and in range");
        let expected = [0.0, -10.0, 0.0, 10.0];
        for (got, want) in segments[0].iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "segment {:?}", segments[0]);
        }
        assert!(b.plane_trace_segments(&[0]).is_err());
    }
}
