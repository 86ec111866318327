//! Error type shared by all geometry containers.

use thiserror::Error;

/// Result type alias using [`GeometryError`].
pub type Result<T> = std::result::Result<T, GeometryError>;

/// Contract violations detected when building, slicing or re-configuring
/// band and zone-axis geometry.
///
/// Numerical degeneracies (division by a zero `z`, traces outside the
/// gnomonic radius) are never reported here; they show up as non-finite
/// values in the derived arrays.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("{what} describes {found} entries, but {expected} Miller indices were given")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("at most 2 navigation dimensions are supported, got {0}")]
    NavigationDimension(usize),

    #[error("invalid navigation key: {0}")]
    InvalidKey(String),

    #[error("invalid lattice parameters: {0}")]
    InvalidLattice(String),

    #[error("structure matrix of lattice is singular")]
    SingularStructureMatrix,
}
