use std::fs;

use approx::assert_relative_eq;
use regeval_pipeline::{CommandTemplate, EvaluationConfig, SceneError, SceneRequest, resolve_scene};

#[test]
fn identity_config_gives_identity_ground_truth() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.ply"), "ply").unwrap();
    fs::write(dir.path().join("b.ply"), "ply").unwrap();
    let input = dir.path().join("config_42.txt");
    fs::write(&input, "a.ply\nb.ply\nunused\n0 0 0 1 0 0 0 0.6 500 450\n").unwrap();

    let scene = resolve_scene(&SceneRequest::new(&input), &EvaluationConfig::default()).unwrap();

    let q = scene.ground_truth.quaternion_wxyz();
    assert_relative_eq!(q[0].abs(), 1.0, epsilon = 1e-12);
    assert_eq!(scene.ground_truth.translation_array(), [0.0, 0.0, 0.0]);
    assert_eq!(scene.scan_a, dir.path().join("a.ply"));
    assert_eq!(scene.overlap, 0.6);
    assert_eq!((scene.size_a, scene.size_b), (500, 450));
    assert_eq!(scene.relative_angle_deg(), 0.0);
    assert_eq!(scene.relative_translation_magnitude(), 0.0);
}

#[cfg(unix)]
mod render {
    use super::*;

    const FAKE_SAMPLER: &str = r#"
p="$1"; l=angle_30_translation_1
echo ply > "${p}_A_${l}.ply"
echo ply > "${p}_B_${l}.ply"
printf 'qw qx qy qz tx ty tz\n1 0 0 0 0.5 0 0 0.8 1000 1100\n' > "${p}_${l}_TrueTransformation.csv"
printf 'qw qx qy qz tx ty tz\n1 0 0 0 0 0 0 0.8 1000 1100\n' > "${p}_${l}_Transformation_A_W.csv"
printf 'qw qx qy qz tx ty tz\n1 0 0 0 0.5 0 0 0.8 1000 1100\n' > "${p}_${l}_Transformation_B_W.csv"
"#;

    fn config(dir: &std::path::Path, script: &str) -> EvaluationConfig {
        EvaluationConfig {
            work_dir: dir.to_path_buf(),
            sampler: CommandTemplate::new("sh", ["-c", script, "sampler", "{output}"]),
            ..EvaluationConfig::default()
        }
    }

    #[test]
    fn sampler_outputs_become_the_scene() {
        let dir = tempfile::tempdir().unwrap();
        let scene = resolve_scene(
            &SceneRequest::new("source.ply"),
            &config(dir.path(), FAKE_SAMPLER),
        )
        .unwrap();

        assert_eq!(scene.label, "angle_30_translation_1");
        assert_eq!(scene.scan_b, dir.path().join("out_B_angle_30_translation_1.ply"));
        assert_eq!(scene.ground_truth.translation_array(), [0.5, 0.0, 0.0]);
        assert_eq!(scene.overlap, 0.8);
        assert_eq!(scene.size_b, 1100);
        assert_relative_eq!(scene.relative_translation_magnitude(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn nonzero_sampler_exit_is_no_scene() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_scene(&SceneRequest::new("source.ply"), &config(dir.path(), "exit 2"))
            .unwrap_err();
        assert!(matches!(err, SceneError::SamplerFailed(_)));
    }

    #[test]
    fn missing_scans_after_sampling_is_no_scene() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_scene(&SceneRequest::new("source.ply"), &config(dir.path(), "exit 0"))
            .unwrap_err();
        assert!(matches!(err, SceneError::MissingScan(_)));
    }
}
