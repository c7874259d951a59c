//! Render mode: sample two views of a source cloud with the external sampler.

use std::path::{Path, PathBuf};

use log::{debug, info};
use regeval_core::{Real, read_transform_file};

use super::config_file::count;
use super::{SceneError, SceneRequest, SceneSample, require_file};
use crate::config::EvaluationConfig;
use crate::external::{Placeholders, PreparedCommand, format_param};

/// Files the sampler writes for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerPaths {
    /// Path prefix passed to the sampler as `{output}`.
    pub output: PathBuf,
    /// `angle_<a>_translation_<t>`, with both values truncated.
    pub label: String,
    pub scan_a: PathBuf,
    pub scan_b: PathBuf,
    pub ground_truth: PathBuf,
    pub pose_a: PathBuf,
    pub pose_b: PathBuf,
}

impl SamplerPaths {
    pub fn new(work_dir: &Path, request: &SceneRequest) -> Self {
        let output = work_dir.join(&request.prefix);
        let label = format!(
            "angle_{}_translation_{}",
            request.angle as i64, request.translation as i64
        );
        let with_suffix = |suffix: String| {
            let mut name = output.clone().into_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            scan_a: with_suffix(format!("_A_{label}.ply")),
            scan_b: with_suffix(format!("_B_{label}.ply")),
            ground_truth: with_suffix(format!("_{label}_TrueTransformation.csv")),
            pose_a: with_suffix(format!("_{label}_Transformation_A_W.csv")),
            pose_b: with_suffix(format!("_{label}_Transformation_B_W.csv")),
            output,
            label,
        }
    }
}

fn sampler_placeholders(request: &SceneRequest, paths: &SamplerPaths) -> Placeholders {
    let mut values = Placeholders::new();
    values.insert(
        "input".to_string(),
        request.input.to_string_lossy().into_owned(),
    );
    values.insert(
        "output".to_string(),
        paths.output.to_string_lossy().into_owned(),
    );
    values.insert("angle".to_string(), format_param(request.angle));
    values.insert("translation".to_string(), format_param(request.translation));
    values.insert("min_overlap".to_string(), format_param(request.min_overlap));
    values
}

/// Run the sampler and load the scans, poses and ground truth it wrote.
pub fn render_scene(
    request: &SceneRequest,
    config: &EvaluationConfig,
) -> Result<SceneSample, SceneError> {
    let paths = SamplerPaths::new(&config.work_dir, request);
    let command = PreparedCommand::from_template(
        &config.sampler,
        &sampler_placeholders(request, &paths),
        false,
        config.default_timeout_secs,
    );
    info!("sampling scene: {}", command.command_line());

    let invocation = command
        .run()
        .map_err(|err| SceneError::SamplerLaunch(format!("{err:#}")))?;
    if !invocation.outcome.is_success() {
        return Err(SceneError::SamplerFailed(invocation.outcome));
    }
    require_file(&paths.scan_a)?;
    require_file(&paths.scan_b)?;

    let gt = read_transform_file(&paths.ground_truth)?;
    let pose_a = read_transform_file(&paths.pose_a)?;
    let pose_b = read_transform_file(&paths.pose_b)?;

    let [overlap, size_a, size_b]: [Real; 3] = gt
        .data
        .get(..3)
        .and_then(|stats| stats.try_into().ok())
        .ok_or_else(|| SceneError::MissingStatistics(paths.ground_truth.clone()))?;
    debug!(
        "sampled {} in {:.2}s: overlap {overlap}",
        paths.label,
        invocation.elapsed.as_secs_f64()
    );

    Ok(SceneSample {
        scan_a: paths.scan_a,
        scan_b: paths.scan_b,
        pose_a: pose_a.transform,
        pose_b: pose_b.transform,
        ground_truth: gt.transform,
        overlap,
        size_a: count(size_a),
        size_b: count(size_b),
        label: paths.label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_prefix_and_truncated_parameters() {
        let mut request = SceneRequest::new("bunny.ply");
        request.prefix = "run".to_string();
        request.angle = 45.7;
        request.translation = 1.9;
        let paths = SamplerPaths::new(Path::new("/tmp/w"), &request);

        assert_eq!(paths.label, "angle_45_translation_1");
        assert_eq!(paths.output, Path::new("/tmp/w/run"));
        assert_eq!(paths.scan_a, Path::new("/tmp/w/run_A_angle_45_translation_1.ply"));
        assert_eq!(paths.scan_b, Path::new("/tmp/w/run_B_angle_45_translation_1.ply"));
        assert_eq!(
            paths.ground_truth,
            Path::new("/tmp/w/run_angle_45_translation_1_TrueTransformation.csv")
        );
        assert_eq!(
            paths.pose_b,
            Path::new("/tmp/w/run_angle_45_translation_1_Transformation_B_W.csv")
        );
    }

    #[test]
    fn sampler_arguments_are_substituted() {
        let request = SceneRequest::new("bunny.ply");
        let paths = SamplerPaths::new(Path::new("w"), &request);
        let config = EvaluationConfig::default();
        let command = PreparedCommand::from_template(
            &config.sampler,
            &sampler_placeholders(&request, &paths),
            false,
            None,
        );
        assert_eq!(
            command.args,
            vec!["-i", "bunny.ply", "-o", "w/out", "-a", "30", "-t", "1", "-m", "70"]
        );
    }

    #[test]
    fn missing_sampler_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EvaluationConfig::default();
        config.work_dir = dir.path().to_path_buf();
        config.sampler.program = dir.path().join("no-such-sampler").display().to_string();

        let err = render_scene(&SceneRequest::new("bunny.ply"), &config).unwrap_err();
        assert!(matches!(err, SceneError::SamplerLaunch(_)));
    }
}
