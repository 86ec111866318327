//! Crystallographic identity of the planes and directions being projected.
//!
//! Band and zone-axis geometry do not interpret Miller indices themselves; they
//! carry a [`ReciprocalLatticePoints`] value alongside their detector
//! coordinates and hand it on unchanged whenever they are sliced. Both the
//! phase and the index list live behind an [`Arc`], so a sliced geometry
//! shares its identity with the one it came from.

use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};

use crate::error::{GeometryError, Result};

// ── Lattice ─────────────────────────────────────────────────────────────────

/// Unit cell parameters: edge lengths in Ångström, angles in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Lattice {
    /// Create a lattice, rejecting non-positive edges, angles outside
    /// `(0, 180)` degrees and angle combinations with no real cell volume.
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Result<Self> {
        for (name, length) in [("a", a), ("b", b), ("c", c)] {
            if !(length.is_finite() && length > 0.0) {
                return Err(GeometryError::InvalidLattice(format!(
                    "edge {name} must be positive and finite, got {length}"
                )));
            }
        }
        for (name, angle) in [("alpha", alpha), ("beta", beta), ("gamma", gamma)] {
            if !(angle > 0.0 && angle < 180.0) {
                return Err(GeometryError::InvalidLattice(format!(
                    "angle {name} must lie in (0, 180) degrees, got {angle}"
                )));
            }
        }
        let lattice = Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        };
        if lattice.volume_factor() <= 0.0 {
            return Err(GeometryError::InvalidLattice(format!(
                "angles ({alpha}, {beta}, {gamma}) do not span a cell"
            )));
        }
        Ok(lattice)
    }

    /// Cubic lattice with edge length `a`.
    pub fn cubic(a: f64) -> Result<Self> {
        Self::new(a, a, a, 90.0, 90.0, 90.0)
    }

    /// Hexagonal lattice with basal edge `a` and height `c`.
    pub fn hexagonal(a: f64, c: f64) -> Result<Self> {
        Self::new(a, a, c, 90.0, 90.0, 120.0)
    }

    /// `1 - cos²α - cos²β - cos²γ + 2 cosα cosβ cosγ`
    fn volume_factor(&self) -> f64 {
        let (ca, cb, cg) = self.angle_cosines();
        1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg
    }

    fn angle_cosines(&self) -> (f64, f64, f64) {
        (
            self.alpha.to_radians().cos(),
            self.beta.to_radians().cos(),
            self.gamma.to_radians().cos(),
        )
    }

    /// Unit cell volume in Å³.
    pub fn volume(&self) -> f64 {
        self.a * self.b * self.c * self.volume_factor().max(0.0).sqrt()
    }

    /// Direct structure matrix `A`.
    ///
    /// Its columns are the lattice vectors expressed in the Cartesian crystal
    /// frame, with `a` along x and `b` in the xy-plane.
    pub fn direct_structure_matrix(&self) -> Matrix3<f64> {
        let (ca, cb, cg) = self.angle_cosines();
        let sg = self.gamma.to_radians().sin();
        Matrix3::new(
            self.a,
            self.b * cg,
            self.c * cb,
            0.0,
            self.b * sg,
            -self.c * (cb * cg - ca) / sg,
            0.0,
            0.0,
            self.volume() / (self.a * self.b * sg),
        )
    }

    /// Reciprocal structure matrix `(A⁻¹)ᵀ`.
    pub fn reciprocal_structure_matrix(&self) -> Result<Matrix3<f64>> {
        self.direct_structure_matrix()
            .try_inverse()
            .map(|inverse| inverse.transpose())
            .ok_or(GeometryError::SingularStructureMatrix)
    }
}

// ── Phase ───────────────────────────────────────────────────────────────────

/// A crystal phase: a name, an optional space group number and its lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub name: String,
    pub space_group: Option<u16>,
    pub lattice: Lattice,
}

impl Phase {
    pub fn new(name: impl Into<String>, space_group: Option<u16>, lattice: Lattice) -> Self {
        Self {
            name: name.into(),
            space_group,
            lattice,
        }
    }
}

// ── Reciprocal lattice points ───────────────────────────────────────────────

/// Miller indices of a set of planes (or zone axes) belonging to one phase.
#[derive(Debug, Clone)]
pub struct ReciprocalLatticePoints {
    phase: Arc<Phase>,
    hkl: Arc<[Vector3<f64>]>,
}

impl ReciprocalLatticePoints {
    pub fn new(phase: Phase, hkl: Vec<Vector3<f64>>) -> Self {
        Self {
            phase: Arc::new(phase),
            hkl: hkl.into(),
        }
    }

    /// Build from integer Miller indices.
    pub fn from_indices(phase: Phase, hkl: &[[i32; 3]]) -> Self {
        let hkl = hkl
            .iter()
            .map(|&[h, k, l]| Vector3::new(h as f64, k as f64, l as f64))
            .collect();
        Self::new(phase, hkl)
    }

    pub fn phase(&self) -> &Arc<Phase> {
        &self.phase
    }

    pub fn hkl(&self) -> &Arc<[Vector3<f64>]> {
        &self.hkl
    }

    /// Number of planes or directions.
    pub fn size(&self) -> usize {
        self.hkl.len()
    }

    /// Whether both values share the very same phase and index list.
    pub fn same_identity(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.phase, &other.phase) && Arc::ptr_eq(&self.hkl, &other.hkl)
    }
}
