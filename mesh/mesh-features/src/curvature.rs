//! Discrete mean curvature.

use mesh_types::Point3;

use crate::CotangentLaplacian;

/// Per-vertex mean curvature `(D⁻¹ (V − W) P) · n`.
///
/// Convex regions with outward normals are positive; on a sphere of radius
/// `r` the value approaches `2 / r`. Vertices with zero lumped area give a
/// non-finite value; see [`repair_non_finite`].
///
/// # Panics
///
/// Panics if `positions` does not have one entry per vertex of `laplacian`.
#[must_use]
pub fn mean_curvature(laplacian: &CotangentLaplacian, positions: &[Point3<f64>]) -> Vec<f64> {
    laplacian
        .apply_points(positions)
        .iter()
        .zip(laplacian.areas())
        .zip(laplacian.normals())
        .map(|((lp, &area), n)| lp.dot(n) / area)
        .collect()
}

/// Replaces NaN and infinite entries with zero, returning how many changed.
pub fn repair_non_finite(values: &mut [f64]) -> usize {
    let mut repaired = 0;
    for v in values.iter_mut().filter(|v| !v.is_finite()) {
        *v = 0.0;
        repaired += 1;
    }
    repaired
}
