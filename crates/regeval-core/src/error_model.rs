//! Registration error between an estimated and a ground-truth transform.
//!
//! Errors are plain `f64` values where NaN means "undefined": the algorithm
//! produced no estimate, or the estimate itself was NaN. All comparisons in
//! this module are NaN-safe (a NaN error never exceeds a threshold).

use serde::{Deserialize, Serialize};

use crate::math::{Quat, Real, Vec3};
use crate::transform::RigidTransform;

/// Angular and translational error of one estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseError {
    /// Geodesic rotation error in degrees (`[0, 180]`, NaN if undefined).
    #[serde(with = "crate::serde_nan::scalar")]
    pub angular_deg: Real,
    /// Euclidean translation error (NaN if undefined).
    #[serde(with = "crate::serde_nan::scalar")]
    pub translation: Real,
}

impl PoseError {
    /// Both errors undefined.
    pub const UNDEFINED: Self = Self {
        angular_deg: Real::NAN,
        translation: Real::NAN,
    };

    pub fn new(angular_deg: Real, translation: Real) -> Self {
        Self {
            angular_deg,
            translation,
        }
    }

    /// `true` when both errors are defined.
    pub fn is_defined(&self) -> bool {
        !self.angular_deg.is_nan() && !self.translation.is_nan()
    }

    /// `true` when either error is strictly above its threshold.
    ///
    /// NaN errors compare false, so an undefined error never exceeds.
    pub fn exceeds(&self, angular_threshold_deg: Real, translation_threshold: Real) -> bool {
        self.angular_deg > angular_threshold_deg || self.translation > translation_threshold
    }
}

impl Default for PoseError {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// Geodesic angle between two rotations in degrees.
///
/// Computed as `2·acos(|⟨qa, qb⟩|)`, so `q` and `−q` are the same rotation.
/// Symmetric, within `[0, 180]`, NaN if either quaternion is NaN.
pub fn angular_error_deg(qa: &Quat, qb: &Quat) -> Real {
    let dot = qa.coords.dot(&qb.coords).abs().clamp(0.0, 1.0);
    (2.0 * dot.acos()).to_degrees()
}

/// Euclidean distance between two translations.
pub fn translation_error(ta: &Vec3, tb: &Vec3) -> Real {
    (ta - tb).norm()
}

/// Compare an estimate against ground truth.
///
/// Returns [`PoseError::UNDEFINED`] when `estimate` is `None`; this is an
/// expected outcome, not an error.
pub fn evaluate(ground_truth: &RigidTransform, estimate: Option<&RigidTransform>) -> PoseError {
    match estimate {
        None => PoseError::UNDEFINED,
        Some(est) => PoseError::new(
            angular_error_deg(ground_truth.rotation(), est.rotation()),
            translation_error(ground_truth.translation(), est.translation()),
        ),
    }
}

/// Compare only the rotation of an estimate; the translation error is NaN.
pub fn evaluate_rotation_only(
    ground_truth: &RigidTransform,
    estimate: Option<&RigidTransform>,
) -> PoseError {
    PoseError::new(evaluate(ground_truth, estimate).angular_deg, Real::NAN)
}
