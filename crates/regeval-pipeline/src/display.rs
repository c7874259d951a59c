//! Visual inspection of aligned scans.
//!
//! [`should_display`] decides whether a stage's alignment is shown;
//! the [`Visualizer`] does the (blocking) rendering.

use std::path::Path;

use anyhow::{Result, bail};
use log::{info, warn};
use regeval_core::{PoseError, Real, RigidTransform};

use crate::config::{CommandTemplate, DisplayPolicy};
use crate::external::{Placeholders, PreparedCommand, format_param};

/// `true` when display was requested or either error exceeds its threshold.
///
/// NaN errors never exceed a threshold.
pub fn should_display(
    requested: bool,
    angular_error_deg: Real,
    translation_error: Real,
    angular_threshold_deg: Real,
    translation_threshold: Real,
) -> bool {
    requested
        || angular_error_deg > angular_threshold_deg
        || translation_error > translation_threshold
}

/// One rendering request: scan B shown against scan A moved by `transform`.
#[derive(Debug, Clone, Copy)]
pub struct DisplayRequest<'a> {
    pub title: &'a str,
    pub scan_a: &'a Path,
    pub scan_b: &'a Path,
    pub transform: &'a RigidTransform,
    pub show_axes: bool,
    pub show_normals: bool,
}

pub trait Visualizer {
    /// Render and block until the viewer is closed.
    fn show(&self, request: &DisplayRequest<'_>) -> Result<()>;
}

/// Visualizer run as an external program.
///
/// Placeholders: `{scan_a}`, `{scan_b}`, `{qw}` `{qx}` `{qy}` `{qz}`,
/// `{tx}` `{ty}` `{tz}`, `{show_axes}`, `{show_normals}`, `{title}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalVisualizer {
    pub command: CommandTemplate,
}

impl ExternalVisualizer {
    pub fn new(command: CommandTemplate) -> Self {
        Self { command }
    }

    fn placeholders(request: &DisplayRequest<'_>) -> Placeholders {
        let mut values = Placeholders::new();
        let q = request.transform.quaternion_wxyz();
        let t = request.transform.translation_array();
        for (key, value) in ["qw", "qx", "qy", "qz"].iter().zip(q) {
            values.insert(key.to_string(), format_param(value));
        }
        for (key, value) in ["tx", "ty", "tz"].iter().zip(t) {
            values.insert(key.to_string(), format_param(value));
        }
        values.insert(
            "scan_a".to_string(),
            request.scan_a.to_string_lossy().into_owned(),
        );
        values.insert(
            "scan_b".to_string(),
            request.scan_b.to_string_lossy().into_owned(),
        );
        values.insert("show_axes".to_string(), request.show_axes.to_string());
        values.insert("show_normals".to_string(), request.show_normals.to_string());
        values.insert("title".to_string(), request.title.to_string());
        values
    }
}

impl Visualizer for ExternalVisualizer {
    fn show(&self, request: &DisplayRequest<'_>) -> Result<()> {
        let command = PreparedCommand::from_template(
            &self.command,
            &Self::placeholders(request),
            false,
            None,
        );
        let invocation = command.run()?;
        if !invocation.outcome.is_success() {
            bail!("visualizer ended with {:?}", invocation.outcome);
        }
        Ok(())
    }
}

/// Applies the display policy and forwards to the visualizer, if any.
pub struct DisplayTrigger<'a> {
    policy: DisplayPolicy,
    requested: bool,
    visualizer: Option<&'a dyn Visualizer>,
}

impl<'a> DisplayTrigger<'a> {
    pub fn new(
        policy: DisplayPolicy,
        requested: bool,
        visualizer: Option<&'a dyn Visualizer>,
    ) -> Self {
        Self {
            policy,
            requested,
            visualizer,
        }
    }

    /// Never displays anything.
    pub fn disabled() -> Self {
        Self {
            policy: DisplayPolicy {
                on_large_deviation: false,
                show_ground_truth: false,
                ..DisplayPolicy::default()
            },
            requested: false,
            visualizer: None,
        }
    }

    pub fn policy(&self) -> &DisplayPolicy {
        &self.policy
    }

    /// Whether a stage with `error` should be shown.
    pub fn wants(&self, error: &PoseError) -> bool {
        if self.policy.on_large_deviation {
            should_display(
                self.requested,
                error.angular_deg,
                error.translation,
                self.policy.angular_threshold_deg,
                self.policy.translation_threshold,
            )
        } else {
            self.requested
        }
    }

    /// Show `transform` for the named stage when the policy asks for it.
    /// Returns whether a display was requested.
    pub fn stage(
        &self,
        name: &str,
        scan_a: &Path,
        scan_b: &Path,
        transform: &RigidTransform,
        error: &PoseError,
    ) -> bool {
        if !self.wants(error) {
            return false;
        }
        self.show(name, scan_a, scan_b, transform);
        true
    }

    /// Show the untransformed pair followed by the ground-truth alignment.
    pub fn ground_truth(&self, scan_a: &Path, scan_b: &Path, ground_truth: &RigidTransform) {
        if !self.policy.show_ground_truth {
            return;
        }
        self.show("untransformed", scan_a, scan_b, &RigidTransform::identity());
        self.show("ground truth", scan_a, scan_b, ground_truth);
    }

    fn show(&self, title: &str, scan_a: &Path, scan_b: &Path, transform: &RigidTransform) {
        let Some(visualizer) = self.visualizer else {
            info!("{title}: display requested but no visualizer configured");
            return;
        };
        let request = DisplayRequest {
            title,
            scan_a,
            scan_b,
            transform,
            show_axes: self.policy.show_axes,
            show_normals: self.policy.show_normals,
        };
        if let Err(err) = visualizer.show(&request) {
            warn!("{title}: visualizer failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn explicit_request_always_displays() {
        assert!(should_display(true, 0.0, 0.0, 2.0, 0.3));
        assert!(should_display(true, Real::NAN, Real::NAN, 2.0, 0.3));
    }

    #[test]
    fn large_errors_display() {
        assert!(should_display(false, 2.5, 0.0, 2.0, 0.3));
        assert!(should_display(false, 0.1, 0.31, 2.0, 0.3));
        assert!(!should_display(false, 2.0, 0.3, 2.0, 0.3));
    }

    #[test]
    fn nan_errors_never_force_display() {
        assert!(!should_display(false, Real::NAN, Real::NAN, 2.0, 0.3));
        assert!(!should_display(false, Real::NAN, 0.1, 2.0, 0.3));
    }

    #[derive(Default)]
    struct Recorder(RefCell<Vec<String>>);

    impl Visualizer for Recorder {
        fn show(&self, request: &DisplayRequest<'_>) -> Result<()> {
            self.0.borrow_mut().push(request.title.to_string());
            Ok(())
        }
    }

    #[test]
    fn trigger_follows_policy() {
        let recorder = Recorder::default();
        let policy = DisplayPolicy {
            show_ground_truth: true,
            ..DisplayPolicy::default()
        };
        let trigger = DisplayTrigger::new(policy, false, Some(&recorder));
        let t = RigidTransform::identity();
        let (a, b) = (Path::new("a.ply"), Path::new("b.ply"));

        trigger.ground_truth(a, b, &t);
        assert!(!trigger.stage("BB", a, b, &t, &PoseError::new(0.5, 0.01)));
        assert!(trigger.stage("ICP", a, b, &t, &PoseError::new(10.0, 0.01)));
        assert!(!trigger.stage("FFT", a, b, &t, &PoseError::UNDEFINED));

        assert_eq!(
            *recorder.0.borrow(),
            vec!["untransformed", "ground truth", "ICP"]
        );
    }

    #[test]
    fn deviation_display_can_be_turned_off() {
        let policy = DisplayPolicy {
            on_large_deviation: false,
            ..DisplayPolicy::default()
        };
        let quiet = DisplayTrigger::new(policy.clone(), false, None);
        assert!(!quiet.wants(&PoseError::new(90.0, 5.0)));
        let forced = DisplayTrigger::new(policy, true, None);
        assert!(forced.wants(&PoseError::new(0.0, 0.0)));
    }

    #[test]
    fn visualizer_placeholders() {
        let t = RigidTransform::from_wxyz(
            [1.0, 0.0, 0.0, 0.0],
            regeval_core::Vec3::new(0.5, 2.0, 0.0),
        );
        let request = DisplayRequest {
            title: "BB",
            scan_a: Path::new("a.ply"),
            scan_b: Path::new("b.ply"),
            transform: &t,
            show_axes: true,
            show_normals: false,
        };
        let values = ExternalVisualizer::placeholders(&request);
        assert_eq!(values["qw"], "1");
        assert_eq!(values["tx"], "0.5");
        assert_eq!(values["ty"], "2");
        assert_eq!(values["qx"], "0");
        assert_eq!(values["show_normals"], "false");
        assert_eq!(values["scan_b"], "b.ply");
    }
}
