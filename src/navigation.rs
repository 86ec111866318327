//! Navigation-shape bookkeeping shared by band and zone-axis geometry.
//!
//! Each geometry container stores its per-pattern arrays with the
//! navigation shape first: `()` for a single pattern, `(n,)` for a line scan
//! and `(rows, columns)` for a map. This module validates that shape, turns a
//! navigation key into a full slice over such an array, and normalizes
//! gnomonic radii so they broadcast against it.

use ndarray::{ArrayD, Axis, IxDyn, SliceInfoElem};
use tracing::warn;

use crate::error::{GeometryError, Result};

/// Largest supported number of navigation dimensions.
pub const MAX_NAVIGATION_DIMENSION: usize = 2;

/// Default gnomonic radius, in units of detector distance.
pub const DEFAULT_GNOMONIC_RADIUS: f64 = 10.0;

// ── Gnomonic radius input ───────────────────────────────────────────────────

/// A gnomonic radius as passed by the caller: one value for every pattern,
/// or an array of per-pattern values.
#[derive(Debug, Clone, PartialEq)]
pub enum GnomonicRadius {
    Scalar(f64),
    Array(ArrayD<f64>),
}

impl Default for GnomonicRadius {
    fn default() -> Self {
        GnomonicRadius::Scalar(DEFAULT_GNOMONIC_RADIUS)
    }
}

impl From<f64> for GnomonicRadius {
    fn from(value: f64) -> Self {
        GnomonicRadius::Scalar(value)
    }
}

impl<D: ndarray::Dimension> From<ndarray::Array<f64, D>> for GnomonicRadius {
    fn from(value: ndarray::Array<f64, D>) -> Self {
        GnomonicRadius::Array(value.into_dyn())
    }
}

impl From<Vec<f64>> for GnomonicRadius {
    fn from(value: Vec<f64>) -> Self {
        GnomonicRadius::Array(ndarray::Array1::from(value).into_dyn())
    }
}

impl GnomonicRadius {
    pub(crate) fn into_array(self) -> ArrayD<f64> {
        match self {
            GnomonicRadius::Scalar(r) => ArrayD::from_elem(IxDyn(&[]), r),
            GnomonicRadius::Array(a) => a,
        }
    }
}

// ── Navigation shape ────────────────────────────────────────────────────────

/// Reject navigation shapes with more than two axes.
pub fn check_navigation_dimension(navigation_shape: &[usize]) -> Result<()> {
    if navigation_shape.len() > MAX_NAVIGATION_DIMENSION {
        return Err(GeometryError::NavigationDimension(navigation_shape.len()));
    }
    Ok(())
}

/// Number of patterns described by a navigation shape (1 for no navigation axes).
pub fn navigation_size(navigation_shape: &[usize]) -> usize {
    navigation_shape.iter().product()
}

// ── Navigation keys ─────────────────────────────────────────────────────────

/// Resolve a possibly negative index or bound against an axis length.
fn absolute(index: isize, len: usize) -> Option<usize> {
    if index < 0 {
        len.checked_sub(index.unsigned_abs())
    } else {
        Some(index as usize)
    }
}

/// Expand a navigation key into a slice over an array of `ndim` axes whose
/// first axes follow `navigation_shape`.
///
/// The key may address fewer navigation axes than there are; missing and
/// trailing axes are taken in full. New axes are not allowed, and
/// out-of-bounds indices are reported instead of panicking inside `ndarray`.
pub(crate) fn expand_key(
    key: &[SliceInfoElem],
    navigation_shape: &[usize],
    ndim: usize,
) -> Result<Vec<SliceInfoElem>> {
    if key.len() > navigation_shape.len() {
        return Err(GeometryError::InvalidKey(format!(
            "{} elements given for {} navigation axes",
            key.len(),
            navigation_shape.len()
        )));
    }
    for (axis, (elem, &len)) in key.iter().zip(navigation_shape).enumerate() {
        match *elem {
            SliceInfoElem::Index(i) => match absolute(i, len) {
                Some(i) if i < len => {}
                _ => {
                    return Err(GeometryError::InvalidKey(format!(
                        "index {i} out of bounds for navigation axis {axis} of length {len}"
                    )))
                }
            },
            SliceInfoElem::Slice { start, end, step } => {
                let start_ok = absolute(start, len).is_some_and(|s| s <= len);
                let end_ok = end.map_or(true, |e| absolute(e, len).is_some_and(|e| e <= len));
                if step == 0 || !start_ok || !end_ok {
                    return Err(GeometryError::InvalidKey(format!(
                        "slice {start}..{end:?};{step} invalid for navigation axis {axis} of length {len}"
                    )));
                }
            }
            SliceInfoElem::NewAxis => {
                return Err(GeometryError::InvalidKey(
                    "new axes cannot be inserted into the navigation shape".to_string(),
                ))
            }
        }
    }
    let mut info = key.to_vec();
    info.resize(ndim, SliceInfoElem::from(..));
    Ok(info)
}

// ── Gnomonic radius normalization ───────────────────────────────────────────

fn warn_on_suspicious_radius(radius: &ArrayD<f64>) {
    let suspicious = radius.iter().filter(|r| !(r.is_finite() && **r > 0.0)).count();
    if suspicious > 0 {
        warn!(
            suspicious,
            total = radius.len(),
            "gnomonic radius contains non-positive or non-finite values; affected planes are never visible"
        );
    }
}

/// Radius with exactly the navigation shape.
///
/// A single value is repeated for every pattern; an array with one value per
/// pattern is reshaped (row-major) to the navigation shape. Any other element
/// count is a shape mismatch.
pub(crate) fn radius_per_pattern(
    radius: GnomonicRadius,
    navigation_shape: &[usize],
) -> Result<ArrayD<f64>> {
    let radius = radius.into_array();
    let shape = IxDyn(navigation_shape);
    let mismatch = || GeometryError::ShapeMismatch {
        what: "gnomonic radius",
        expected: navigation_shape.to_vec(),
        found: radius.shape().to_vec(),
    };
    let normalized = match radius.first() {
        Some(&value) if radius.len() == 1 => ArrayD::from_elem(shape, value),
        _ if radius.len() == navigation_size(navigation_shape) => {
            let values: Vec<f64> = radius.iter().copied().collect();
            ArrayD::from_shape_vec(shape, values).map_err(|_| mismatch())?
        }
        _ => return Err(mismatch()),
    };
    warn_on_suspicious_radius(&normalized);
    Ok(normalized)
}

/// Radius that broadcasts against `target_shape`.
///
/// A one-dimensional array holds one radius per navigation row and becomes a
/// column; any other array is kept as given. The result must broadcast
/// against `target_shape`.
pub(crate) fn radius_broadcastable(
    radius: GnomonicRadius,
    target_shape: &[usize],
) -> Result<ArrayD<f64>> {
    let radius = radius.into_array();
    let radius = if radius.ndim() == 1 {
        radius.insert_axis(Axis(1))
    } else {
        radius
    };
    if radius.broadcast(IxDyn(target_shape)).is_none() {
        return Err(GeometryError::ShapeMismatch {
            what: "gnomonic radius",
            expected: target_shape.to_vec(),
            found: radius.shape().to_vec(),
        });
    }
    warn_on_suspicious_radius(&radius);
    Ok(radius)
}
