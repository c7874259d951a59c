//! Ground-truth resolution: turning the CLI input into a [`SceneSample`].
//!
//! Two input modes are supported:
//!
//! - a scene config file (`config_<digits>.txt`) naming two pre-rendered
//!   scans plus a packed ground-truth line, see [`config_file`],
//! - any other path is a source cloud handed to the external sampler, see
//!   [`sampler`].

use std::path::{Path, PathBuf};

use regeval_core::{Real, RigidTransform, TransformFileError, angular_error_deg};
use thiserror::Error;

use crate::config::EvaluationConfig;
use crate::external::ExitOutcome;

pub mod config_file;
pub mod sampler;

pub use config_file::{is_scene_config, load_scene_config, parse_scene_config};
pub use sampler::{SamplerPaths, render_scene};

/// No usable scene could be produced.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to launch sampler: {0}")]
    SamplerLaunch(String),
    #[error("sampler did not succeed ({0:?})")]
    SamplerFailed(ExitOutcome),
    #[error("scan {} not found", .0.display())]
    MissingScan(PathBuf),
    #[error("failed to read scene config {}: {source}", .path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed scene config {}: {reason}", .path.display())]
    MalformedConfig { path: PathBuf, reason: String },
    #[error(
        "ground-truth file {} lacks overlap and point counts",
        .0.display()
    )]
    MissingStatistics(PathBuf),
    #[error(transparent)]
    Transform(#[from] TransformFileError),
}

/// Two overlapping scans with their known poses.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSample {
    pub scan_a: PathBuf,
    pub scan_b: PathBuf,
    /// Absolute pose of scan A in the world frame.
    pub pose_a: RigidTransform,
    /// Absolute pose of scan B in the world frame.
    pub pose_b: RigidTransform,
    /// Transform every estimate is compared against.
    pub ground_truth: RigidTransform,
    /// Overlap fraction in `[0, 1]`.
    pub overlap: Real,
    pub size_a: u64,
    pub size_b: u64,
    /// Short scene identifier used in log messages.
    pub label: String,
}

impl SceneSample {
    /// Transform taking A's frame to B's frame: `pose_b ∘ pose_a⁻¹`.
    pub fn relative_pose(&self) -> RigidTransform {
        RigidTransform::relative(&self.pose_a, &self.pose_b)
    }

    pub fn relative_translation_magnitude(&self) -> Real {
        self.relative_pose().translation().norm()
    }

    pub fn relative_angle_deg(&self) -> Real {
        angular_error_deg(self.pose_a.rotation(), self.pose_b.rotation())
    }
}

/// What the CLI asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRequest {
    pub input: PathBuf,
    /// File-name prefix of sampler outputs and stage transform files.
    pub prefix: String,
    /// Maximum rotation between the sampled views, degrees.
    pub angle: Real,
    /// Maximum translation between the sampled views.
    pub translation: Real,
    /// Minimum overlap between the sampled views, percent.
    pub min_overlap: Real,
}

impl SceneRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            prefix: "out".to_string(),
            angle: 30.0,
            translation: 1.0,
            min_overlap: 70.0,
        }
    }

    pub fn is_pre_rendered(&self) -> bool {
        is_scene_config(&self.input)
    }
}

/// Resolve the request into a scene, picking the mode from the input path.
pub fn resolve_scene(
    request: &SceneRequest,
    config: &EvaluationConfig,
) -> Result<SceneSample, SceneError> {
    if request.is_pre_rendered() {
        load_scene_config(&request.input)
    } else {
        render_scene(request, config)
    }
}

pub(crate) fn require_file(path: &Path) -> Result<(), SceneError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SceneError::MissingScan(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use regeval_core::{Quat, Vec3};

    fn scene(pose_a: RigidTransform, pose_b: RigidTransform) -> SceneSample {
        SceneSample {
            scan_a: PathBuf::from("a.ply"),
            scan_b: PathBuf::from("b.ply"),
            pose_a,
            pose_b,
            ground_truth: RigidTransform::identity(),
            overlap: 0.8,
            size_a: 10,
            size_b: 12,
            label: "test".to_string(),
        }
    }

    #[test]
    fn identity_poses_have_no_separation() {
        let s = scene(RigidTransform::identity(), RigidTransform::identity());
        assert_eq!(s.relative_translation_magnitude(), 0.0);
        assert_relative_eq!(s.relative_angle_deg(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn separation_between_viewpoints() {
        let rot = Quat::from_axis_angle(&Vec3::z_axis(), 30f64.to_radians());
        let a = RigidTransform::new(Quat::identity(), Vec3::new(1.0, 0.0, 0.0));
        let b = RigidTransform::new(rot, Vec3::new(1.0, 2.0, 0.0));
        let s = scene(a, b);

        assert_relative_eq!(s.relative_angle_deg(), 30.0, epsilon = 1e-9);
        // t_BA = t_B - R_BA t_A
        let expected = Vec3::new(1.0, 2.0, 0.0) - rot * Vec3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(s.relative_translation_magnitude(), expected.norm(), epsilon = 1e-12);
    }

    #[test]
    fn request_mode_follows_input_name() {
        assert!(SceneRequest::new("data/config_12.txt").is_pre_rendered());
        assert!(!SceneRequest::new("data/bunny.ply").is_pre_rendered());
    }
}
