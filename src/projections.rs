//! Rotations between the detector frame and the crystal lattice frames.
//!
//! The detector frame D has +Z along the detector normal pointing towards the
//! sample; the sample frame S is tilted about the shared x-axis. Chaining
//! the detector→sample rotation, the crystal orientation and the lattice
//! structure matrix gives the matrix that maps detector directions into the
//! direct (K) or reciprocal (K*) lattice frame:
//!
//! ```text
//! U_K  = Aᵀ      · O · U_S
//! U_K* = (A⁻¹)ᵀ  · O · U_S
//! ```
//!
//! [`project_to_detector`] applies one such matrix per pattern to a list of
//! Miller indices, producing the batched detector coordinates consumed by
//! [`KikuchiBand`](crate::band::KikuchiBand) and
//! [`ZoneAxis`](crate::zone_axis::ZoneAxis).

use nalgebra::{Matrix3, Rotation3, Vector3};
use ndarray::{Array3, IxDyn};
use tracing::debug;

use crate::crystal::Lattice;
use crate::error::{GeometryError, Result};
use crate::navigation::{check_navigation_dimension, navigation_size};
use crate::vector::VectorField;

/// Sample and detector tilt of an EBSD setup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorTilt {
    /// Sample tilt from the horizontal, in degrees. Default 70.
    pub sample_tilt_deg: f64,
    /// Detector tilt from the vertical, in degrees. Default 0.
    pub detector_tilt_deg: f64,
}

impl Default for DetectorTilt {
    fn default() -> Self {
        Self {
            sample_tilt_deg: 70.0,
            detector_tilt_deg: 0.0,
        }
    }
}

impl DetectorTilt {
    /// Rotation angle about the detector x-axis, in radians.
    pub fn tilt_rad(&self) -> f64 {
        -((self.sample_tilt_deg - 90.0) - self.detector_tilt_deg).to_radians()
    }

    /// Rotation `U_S` aligning the detector frame with the sample frame.
    pub fn detector_to_sample(&self) -> Matrix3<f64> {
        *Rotation3::from_axis_angle(&Vector3::x_axis(), self.tilt_rad()).matrix()
    }
}

/// Rotation `U_K` from the detector frame to the direct lattice frame.
pub fn detector_to_direct_lattice(
    tilt: &DetectorTilt,
    lattice: &Lattice,
    orientation: &Rotation3<f64>,
) -> Matrix3<f64> {
    lattice.direct_structure_matrix().transpose() * orientation.matrix() * tilt.detector_to_sample()
}

/// Rotation `U_K*` from the detector frame to the reciprocal lattice frame.
pub fn detector_to_reciprocal_lattice(
    tilt: &DetectorTilt,
    lattice: &Lattice,
    orientation: &Rotation3<f64>,
) -> Result<Matrix3<f64>> {
    Ok(lattice.reciprocal_structure_matrix()? * orientation.matrix() * tilt.detector_to_sample())
}

/// Detector coordinates of `vectors` for every pattern.
///
/// `matrices` holds one detector→lattice matrix `U` per pattern in row-major
/// navigation order. Each vector is taken as a row and multiplied from the
/// left, `v · U`, so the result has shape `navigation_shape + (n, 3)`.
pub fn project_to_detector(
    vectors: &[Vector3<f64>],
    matrices: &[Matrix3<f64>],
    navigation_shape: &[usize],
) -> Result<VectorField> {
    check_navigation_dimension(navigation_shape)?;
    let patterns = navigation_size(navigation_shape);
    if matrices.len() != patterns {
        return Err(GeometryError::ShapeMismatch {
            what: "detector matrices",
            expected: navigation_shape.to_vec(),
            found: vec![matrices.len()],
        });
    }

    let mut data = Array3::<f64>::zeros((patterns, vectors.len(), 3));
    for (mut pattern, u) in data.outer_iter_mut().zip(matrices) {
        let ut = u.transpose();
        for (mut row, v) in pattern.outer_iter_mut().zip(vectors) {
            let projected = ut * v;
            row[0] = projected.x;
            row[1] = projected.y;
            row[2] = projected.z;
        }
    }

    let mut shape = navigation_shape.to_vec();
    shape.extend([vectors.len(), 3]);
    let data = data
        .into_dyn()
        .into_shape_with_order(IxDyn(&shape))
        .map_err(|_| GeometryError::ShapeMismatch {
            what: "projected vectors",
            expected: shape.clone(),
            found: vec![patterns, vectors.len(), 3],
        })?;
    debug!(
        navigation_shape = ?navigation_shape,
        vectors = vectors.len(),
        "projected vectors onto detector"
    );
    VectorField::new(data)
}
