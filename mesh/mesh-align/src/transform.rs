//! Six-parameter rigid transform acting on feature rows.
//!
//! Rows are treated as row vectors: a point `p` maps to `p · R + t`, which
//! in column form is `Rᵀ p + t`. Only the three spatial channels move;
//! curvature channels pass through untouched.

use nalgebra::{Matrix3, Matrix6, Point3, Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// Rotation from the angles `(φ, θ, ψ)`.
///
/// ```text
/// [[cθcψ, −cφsψ + sφsθcψ,  sφsψ + cφsθcψ],
///  [cθsψ,  cφcψ + sφsθsψ, −sφcψ + cφsθsψ],
///  [−sθ,   sφcθ,           cφcθ        ]]
/// ```
///
/// # Example
///
/// ```
/// use mesh_align::rot3;
/// use nalgebra::Matrix3;
///
/// assert_eq!(rot3(0.0, 0.0, 0.0), Matrix3::identity());
/// ```
#[must_use]
pub fn rot3(phi: f64, theta: f64, psi: f64) -> Matrix3<f64> {
    let (sf, cf) = phi.sin_cos();
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = psi.sin_cos();
    Matrix3::new(
        ct * cp,
        -cf * sp + sf * st * cp,
        sf * sp + cf * st * cp,
        ct * sp,
        cf * cp + sf * st * sp,
        -sf * cp + cf * st * sp,
        -st,
        sf * ct,
        cf * ct,
    )
}

/// Partial derivatives of [`rot3`] with respect to `φ`, `θ` and `ψ`.
#[must_use]
pub fn rot3_derivatives(phi: f64, theta: f64, psi: f64) -> [Matrix3<f64>; 3] {
    let (sf, cf) = phi.sin_cos();
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = psi.sin_cos();
    let d_phi = Matrix3::new(
        0.0,
        sf * sp + cf * st * cp,
        cf * sp - sf * st * cp,
        0.0,
        -sf * cp + cf * st * sp,
        -cf * cp - sf * st * sp,
        0.0,
        cf * ct,
        -sf * ct,
    );
    let d_theta = Matrix3::new(
        -st * cp,
        sf * ct * cp,
        cf * ct * cp,
        -st * sp,
        sf * ct * sp,
        cf * ct * sp,
        -ct,
        -sf * st,
        -cf * st,
    );
    let d_psi = Matrix3::new(
        -ct * sp,
        -cf * cp - sf * st * sp,
        sf * cp - cf * st * sp,
        ct * cp,
        -cf * sp + sf * st * cp,
        sf * sp + cf * st * cp,
        0.0,
        0.0,
        0.0,
    );
    [d_phi, d_theta, d_psi]
}

/// Applies `p · R + t` to a point.
#[must_use]
pub fn rot_trans(p: &Point3<f64>, rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Point3<f64> {
    Point3::from(rotation.tr_mul(&p.coords) + translation)
}

/// Rigid transform parameters `[φ, θ, ψ, tx, ty, tz]`.
///
/// Angles are in radians; the translation is in normalized feature units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RigidParams {
    /// Rotation angles `(φ, θ, ψ)`.
    pub angles: Vector3<f64>,
    /// Translation `(tx, ty, tz)`.
    pub translation: Vector3<f64>,
}

impl RigidParams {
    /// The identity transform.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Creates parameters from angles and translation.
    #[must_use]
    pub fn new(phi: f64, theta: f64, psi: f64, translation: Vector3<f64>) -> Self {
        Self {
            angles: Vector3::new(phi, theta, psi),
            translation,
        }
    }

    /// Packs into `[φ, θ, ψ, tx, ty, tz]`.
    #[must_use]
    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.angles.x,
            self.angles.y,
            self.angles.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        )
    }

    /// Unpacks from `[φ, θ, ψ, tx, ty, tz]`.
    #[must_use]
    pub fn from_vector(v: &Vector6<f64>) -> Self {
        Self::new(v[0], v[1], v[2], Vector3::new(v[3], v[4], v[5]))
    }

    /// Rotation matrix for the angles.
    #[must_use]
    pub fn rotation(&self) -> Matrix3<f64> {
        rot3(self.angles.x, self.angles.y, self.angles.z)
    }

    /// Whether every parameter is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.angles.iter().chain(self.translation.iter()).all(|v| v.is_finite())
    }

    /// Transforms a single point.
    #[must_use]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        rot_trans(p, &self.rotation(), &self.translation)
    }

    /// The block operator over full feature rows.
    #[must_use]
    pub fn block_transform(&self) -> BlockTransform {
        BlockTransform::new(self.rotation(), self.translation)
    }
}

/// Rigid transform lifted to 6-channel feature rows.
///
/// Equivalent to `row · big_R + big_t` with
/// `big_R = [[R, 0], [0, I]]` and `big_t = [t, 0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockTransform {
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

impl BlockTransform {
    /// Creates the operator from a rotation and translation.
    #[must_use]
    pub const fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The 6×6 matrix `big_R`.
    #[must_use]
    pub fn matrix(&self) -> Matrix6<f64> {
        let mut m = Matrix6::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m
    }

    /// The 6-vector `big_t`.
    #[must_use]
    pub fn offset(&self) -> Vector6<f64> {
        let mut v = Vector6::zeros();
        v.fixed_rows_mut::<3>(0).copy_from(&self.translation);
        v
    }

    /// Applies the operator to a row. Channels 3 to 5 are copied verbatim.
    #[must_use]
    pub fn apply(&self, row: &Vector6<f64>) -> Vector6<f64> {
        let spatial = self.rotation.tr_mul(&row.fixed_rows::<3>(0)) + self.translation;
        let mut out = *row;
        out.fixed_rows_mut::<3>(0).copy_from(&spatial);
        out
    }
}
