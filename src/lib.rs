//! # kikuchi-features
//!
//! Detector-plane geometry of **Kikuchi bands** and **zone axes** for batches of
//! electron backscatter diffraction (EBSD) patterns.
//!
//! Given the detector-frame directions of a set of diffracting-plane poles (or
//! zone axes) for one pattern, a line scan, or a 2D map of patterns, this crate
//! computes where each band's center line and each zone axis land on the
//! detector in gnomonic coordinates, and which of them fall inside a
//! per-pattern visibility radius.
//!
//! ## Features
//!
//! - **Batched**: every property is a whole-array operation over up to two
//!   navigation axes; no per-pattern loops in caller code
//! - **Band geometry**: Hesse normal form distance and angle, plane trace end
//!   points on the gnomonic radius circle, perpendicular foot points
//! - **Zone axes**: radial gnomonic distance, polar angle, strict radius mask,
//!   filtered gnomonic positions
//! - **Explicit contracts**: shape mismatches are reported as
//!   [`GeometryError`] instead of surfacing as broadcasting failures
//! - **Projections**: detector ↔ direct/reciprocal lattice rotations to build
//!   detector coordinates from Miller indices and crystal orientations
//!
//! ## Example
//!
//! ```
//! use kikuchi_features::{
//!     project_to_detector, detector_to_reciprocal_lattice, DetectorTilt, KikuchiBand, Lattice,
//!     Phase, ReciprocalLatticePoints,
//! };
//! use nalgebra::{Rotation3, Vector3};
//! use ndarray::{ArrayD, IxDyn};
//!
//! let lattice = Lattice::cubic(3.52).unwrap();
//! let phase = Phase::new("ni", Some(225), lattice.clone());
//! let points = ReciprocalLatticePoints::from_indices(phase, &[[1, 1, 1], [2, 0, 0], [2, 2, 0]]);
//!
//! // Three patterns in a line scan, each with its own orientation
//! let tilt = DetectorTilt::default();
//! let matrices: Vec<_> = [0.0_f64, 0.1, 0.2]
//!     .iter()
//!     .map(|&angle| {
//!         let orientation = Rotation3::from_axis_angle(&Vector3::z_axis(), angle);
//!         detector_to_reciprocal_lattice(&tilt, &lattice, &orientation).unwrap()
//!     })
//!     .collect();
//! let hkl_detector = project_to_detector(points.hkl(), &matrices, &[3]).unwrap();
//!
//! let in_pattern = ArrayD::from_elem(IxDyn(&[3, 3]), true);
//! let bands = KikuchiBand::new(points, hkl_detector, in_pattern, 2.0).unwrap();
//!
//! assert_eq!(bands.navigation_shape(), &[3]);
//! assert_eq!(bands.plane_trace_coordinates().shape(), &[3, 3, 4]);
//! let segments = bands.plane_trace_segments(&[0]).unwrap();
//! assert!(segments.len() <= 3);
//! ```
//!
//! ## Conventions
//!
//! - Gnomonic coordinates live on the plane `z = 1`, with the projection
//!   center at the origin.
//! - Every per-pattern array has the navigation shape first: `()`, `(n,)` or
//!   `(rows, columns)`.
//! - Traces and positions outside the visibility radius are encoded as NaN,
//!   never as errors.
//! - [`ZoneAxis::x_gnomonic`] / [`ZoneAxis::y_gnomonic`] are filtered and
//!   flattened, while [`KikuchiBand::x_gnomonic`] / [`KikuchiBand::y_gnomonic`]
//!   keep the full navigation shape.

pub mod band;
pub mod crystal;
mod error;
pub mod navigation;
pub mod projections;
pub mod vector;
pub mod zone_axis;

pub use band::{KikuchiBand, UPPER_HEMISPHERE_TOLERANCE};
pub use crystal::{Lattice, Phase, ReciprocalLatticePoints};
pub use error::{GeometryError, Result};
pub use navigation::{GnomonicRadius, DEFAULT_GNOMONIC_RADIUS, MAX_NAVIGATION_DIMENSION};
pub use projections::{
    detector_to_direct_lattice, detector_to_reciprocal_lattice, project_to_detector,
    DetectorTilt,
};
pub use vector::VectorField;
pub use zone_axis::ZoneAxis;
