//! Triangle type for geometric calculations.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A triangle with concrete vertex positions.
///
/// Winding is **counter-clockwise (CCW) when viewed from the front**
/// (normal points toward viewer).
///
/// # Example
///
/// ```
/// use mesh_types::{Triangle, Point3};
///
/// let tri = Triangle::new(
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// );
///
/// // Area of a right triangle with legs 1 and 1
/// assert!((tri.area() - 0.5).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Triangle {
    /// First vertex.
    pub v0: Point3<f64>,
    /// Second vertex.
    pub v1: Point3<f64>,
    /// Third vertex.
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    #[must_use]
    pub const fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    ///
    /// The direction follows the right-hand rule with CCW winding.
    /// The magnitude equals twice the triangle's area, which makes it the
    /// area-weighted contribution when accumulating vertex normals.
    #[inline]
    #[must_use]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the unit face normal.
    ///
    /// Returns `None` for degenerate triangles (zero area).
    #[must_use]
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len = n.norm();
        if len > f64::EPSILON {
            Some(n / len)
        } else {
            None
        }
    }

    /// Compute the triangle's area.
    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Cotangents of the interior angles at `v0`, `v1` and `v2`.
    ///
    /// The cotangent at a corner is `dot(a, b) / |a × b|` for the two edges
    /// leaving that corner. A degenerate triangle yields non-finite values;
    /// callers decide how to treat them.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::{Triangle, Point3};
    ///
    /// // Right angle at v0, 45 degrees at v1 and v2
    /// let tri = Triangle::new(
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 0.0, 0.0),
    ///     Point3::new(0.0, 1.0, 0.0),
    /// );
    /// let [c0, c1, c2] = tri.cotangents();
    /// assert!(c0.abs() < 1e-12);
    /// assert!((c1 - 1.0).abs() < 1e-12);
    /// assert!((c2 - 1.0).abs() < 1e-12);
    /// ```
    #[must_use]
    pub fn cotangents(&self) -> [f64; 3] {
        let corner = |p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>| {
            let ea = a - p;
            let eb = b - p;
            ea.dot(&eb) / ea.cross(&eb).norm()
        };
        [
            corner(&self.v0, &self.v1, &self.v2),
            corner(&self.v1, &self.v2, &self.v0),
            corner(&self.v2, &self.v0, &self.v1),
        ]
    }
}
