use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Scalar type used throughout the workspace (currently `f64`).
pub type Real = f64;

/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// Unit quaternion with [`Real`] components.
pub type Quat = UnitQuaternion<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Returns `true` when every component of `v` is NaN.
///
/// This is the literal "translation undefined" test used when deciding whether
/// a failed registration still carries a usable rotation. A vector with only
/// some NaN components does not qualify.
pub fn all_nan(v: &Vec3) -> bool {
    v.iter().all(|x| x.is_nan())
}
