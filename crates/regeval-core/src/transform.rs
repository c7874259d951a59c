use nalgebra::{Quaternion, Translation3};
use serde::{Deserialize, Serialize};

use crate::math::{Iso3, Pt3, Quat, Real, Vec3, all_nan};

/// Rigid 3D transform: a unit quaternion rotation followed by a translation.
///
/// The quaternion is normalized on construction. Values are immutable;
/// [`compose`](Self::compose) and [`inverse`](Self::inverse) return new
/// transforms.
///
/// Components may be NaN when an external algorithm reported an undefined
/// estimate. Such values are kept as-is so the error model can tell a missing
/// translation apart from a missing rotation.
///
/// Serialized as `{"q": [w, x, y, z], "t": [x, y, z]}` with NaN written as
/// `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "TransformRecord", from = "TransformRecord")]
pub struct RigidTransform {
    rotation: Quat,
    translation: Vec3,
}

impl RigidTransform {
    /// Build a transform from a rotation and a translation.
    pub fn new(rotation: Quat, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Identity transform.
    pub fn identity() -> Self {
        Self::new(Quat::identity(), Vec3::zeros())
    }

    /// Build a transform from a quaternion in `(w, x, y, z)` order.
    ///
    /// The quaternion is renormalized. A zero quaternion yields NaN components.
    pub fn from_wxyz(q: [Real; 4], translation: Vec3) -> Self {
        let quat = Quaternion::new(q[0], q[1], q[2], q[3]);
        Self::new(Quat::new_normalize(quat), translation)
    }

    /// Build a transform from a quaternion in `(x, y, z, w)` order.
    pub fn from_xyzw(q: [Real; 4], translation: Vec3) -> Self {
        Self::from_wxyz([q[3], q[0], q[1], q[2]], translation)
    }

    /// Convert into an [`Iso3`].
    pub fn to_isometry(&self) -> Iso3 {
        Iso3::from_parts(Translation3::from(self.translation), self.rotation)
    }

    /// Unit rotation quaternion.
    pub fn rotation(&self) -> &Quat {
        &self.rotation
    }

    /// Translation applied after the rotation.
    pub fn translation(&self) -> &Vec3 {
        &self.translation
    }

    /// Quaternion components in `(w, x, y, z)` order.
    pub fn quaternion_wxyz(&self) -> [Real; 4] {
        let q = self.rotation.quaternion();
        [q.w, q.i, q.j, q.k]
    }

    /// Translation components as an array.
    pub fn translation_array(&self) -> [Real; 3] {
        [self.translation.x, self.translation.y, self.translation.z]
    }

    /// Transform equivalent to applying `other` first and then `self`.
    ///
    /// Rotation `r1·r2`, translation `r1·t2 + t1`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform::new(
            self.rotation * other.rotation,
            self.rotation * other.translation + self.translation,
        )
    }

    /// Inverse transform: conjugate rotation, translation `−r⁻¹·t`.
    pub fn inverse(&self) -> RigidTransform {
        let rotation = self.rotation.inverse();
        let translation = -(rotation * self.translation);
        RigidTransform::new(rotation, translation)
    }

    /// Transform taking frame `a` into frame `b`, i.e. `b ∘ a⁻¹`.
    pub fn relative(a: &RigidTransform, b: &RigidTransform) -> RigidTransform {
        b.compose(&a.inverse())
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, p: &Pt3) -> Pt3 {
        Pt3::from(self.rotation * p.coords + self.translation)
    }

    /// `true` when every translation component is NaN.
    pub fn translation_undefined(&self) -> bool {
        all_nan(&self.translation)
    }

    /// `true` when all seven components are finite.
    pub fn is_finite(&self) -> bool {
        self.quaternion_wxyz().iter().all(|v| v.is_finite())
            && self.translation.iter().all(|v| v.is_finite())
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> RigidTransform {
        self.compose(&rhs)
    }
}

/// Plain-array serialized form of a [`RigidTransform`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    /// Quaternion `(w, x, y, z)`.
    #[serde(with = "crate::serde_nan::array")]
    pub q: [Real; 4],
    /// Translation `(x, y, z)`.
    #[serde(with = "crate::serde_nan::array")]
    pub t: [Real; 3],
}

impl From<RigidTransform> for TransformRecord {
    fn from(value: RigidTransform) -> Self {
        Self {
            q: value.quaternion_wxyz(),
            t: value.translation_array(),
        }
    }
}

impl From<TransformRecord> for RigidTransform {
    fn from(value: TransformRecord) -> Self {
        RigidTransform::from_wxyz(value.q, Vec3::new(value.t[0], value.t[1], value.t[2]))
    }
}
