use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use regeval_pipeline::{
    DisplayTrigger, EvaluationConfig, EvaluationPlan, ExternalVisualizer, SceneError,
    SceneRequest, StageFiles, Visualizer, epoch_millis, resolve_scene, results_path,
    run_evaluation, write_record,
};

/// Exit status when no valid scene could be produced.
const EXIT_NO_SCENE: i32 = 1;
/// Exit status for any other fatal error.
const EXIT_FAILURE: i32 = 2;

/// Evaluate registration algorithms on a sampled or pre-rendered scene.
#[derive(Debug, Parser)]
#[command(author, version, about = "Point-cloud registration evaluation")]
struct Args {
    /// Source point cloud, or a `config_<n>.txt` naming a pre-rendered scene.
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for the results document.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// File-name prefix for sampler outputs and stage transform files.
    #[arg(short, long, default_value = "out")]
    prefix: String,

    /// Maximum rotation between the sampled views, degrees.
    #[arg(short, long, default_value_t = 30.0)]
    angle: f64,

    /// Maximum translation between the sampled views.
    #[arg(short, long, default_value_t = 1.0)]
    translation: f64,

    /// Minimum overlap between the sampled views, percent.
    #[arg(short, long = "minOverlap", alias = "min-overlap", default_value_t = 70.0)]
    min_overlap: f64,

    /// Show every stage's alignment, regardless of its error.
    #[arg(short, long)]
    display: bool,

    /// JSON run configuration. Defaults are used if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for intermediate files; overrides the configuration.
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<EvaluationConfig> {
    let mut config = match &args.config {
        Some(path) => EvaluationConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => EvaluationConfig::default(),
    };
    if let Some(dir) = &args.work_dir {
        config.work_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Run one evaluation and return the path of the written results.
fn run_from_args(args: &Args) -> Result<PathBuf> {
    let config = load_config(args)?;
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("failed to create {}", config.work_dir.display()))?;

    let request = SceneRequest {
        input: args.input.clone(),
        prefix: args.prefix.clone(),
        angle: args.angle,
        translation: args.translation,
        min_overlap: args.min_overlap,
    };
    let scene = resolve_scene(&request, &config)?;
    info!(
        "scene {}: overlap {:.2}, {} / {} points",
        scene.label, scene.overlap, scene.size_a, scene.size_b
    );

    let files = StageFiles::new(&config.work_dir, &args.prefix);
    let plan = EvaluationPlan::from_specs(&config.stages, &files, config.default_timeout_secs)?;
    info!("stages: {}", plan.runnable().join(", "));

    let visualizer = config.visualizer.clone().map(ExternalVisualizer::new);
    let display = DisplayTrigger::new(
        config.display.clone(),
        args.display,
        visualizer.as_ref().map(|v| v as &dyn Visualizer),
    );
    let record = run_evaluation(&scene, &plan, &config.format_version, &display);

    let path = results_path(&args.output, &args.input, epoch_millis());
    write_record(&path, &record)?;
    Ok(path)
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<SceneError>().is_some() {
        EXIT_NO_SCENE
    } else {
        EXIT_FAILURE
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        process::exit(exit_code(&err));
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let path = run_from_args(&args)?;
    println!("{}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("regeval").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_and_short_flags() {
        let args = parse(&["-i", "bunny.ply"]);
        assert_eq!(args.output, PathBuf::from("."));
        assert_eq!(args.prefix, "out");
        assert_eq!(args.angle, 30.0);
        assert_eq!(args.translation, 1.0);
        assert_eq!(args.min_overlap, 70.0);
        assert!(!args.display);

        let args = parse(&["-i", "x.ply", "-a", "45", "-t", "2.5", "-m", "50", "-d", "-p", "run"]);
        assert_eq!(args.angle, 45.0);
        assert_eq!(args.translation, 2.5);
        assert_eq!(args.min_overlap, 50.0);
        assert!(args.display);
        assert_eq!(args.prefix, "run");

        let args = parse(&["--input", "x.ply", "--minOverlap", "60"]);
        assert_eq!(args.min_overlap, 60.0);
    }

    #[test]
    fn input_is_required() {
        assert!(Args::try_parse_from(["regeval"]).is_err());
    }

    #[test]
    fn missing_scene_exits_with_no_scene_status() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config_1.txt");
        fs::write(&config_path, "a.ply\nb.ply\n\n0 0 0 1 0 0 0 0.5 10 10\n").unwrap();

        let args = parse(&[
            "-i",
            config_path.to_str().unwrap(),
            "-o",
            dir.path().join("out").to_str().unwrap(),
            "--work-dir",
            dir.path().to_str().unwrap(),
        ]);
        let err = run_from_args(&args).unwrap_err();
        assert_eq!(exit_code(&err), EXIT_NO_SCENE);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn bad_config_is_a_generic_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("run.json");
        fs::write(&cfg, "{ not json").unwrap();
        let args = parse(&["-i", "x.ply", "-c", cfg.to_str().unwrap()]);
        let err = run_from_args(&args).unwrap_err();
        assert_eq!(exit_code(&err), EXIT_FAILURE);
    }

    #[cfg(unix)]
    #[test]
    fn pre_rendered_scene_writes_results() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path();
        fs::write(work.join("a.ply"), "").unwrap();
        fs::write(work.join("b.ply"), "").unwrap();
        let scene = work.join("config_7.txt");
        fs::write(&scene, "a.ply\nb.ply\n\n0 0 0 1 0 0 0 0.8 100 110\n").unwrap();

        let config = format!(
            r#"{{
                "work_dir": "{}",
                "stages": [
                    {{
                        "name": "BB",
                        "tag": "BB",
                        "kind": "global",
                        "command": {{
                            "program": "sh",
                            "args": ["-c", "echo '1 0 0 0 0 0 0' > \"$1\"", "bb", "{{output}}"]
                        }}
                    }}
                ]
            }}"#,
            work.display()
        );
        let cfg = work.join("run.json");
        fs::write(&cfg, config).unwrap();

        let out = work.join("results");
        let args = parse(&[
            "-i",
            scene.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "-c",
            cfg.to_str().unwrap(),
        ]);
        let path = run_from_args(&args).unwrap();
        assert!(path.to_string_lossy().ends_with("_results.json"));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("config_7_"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["GT"]["sizeB"], 110);
        assert_eq!(value["stages"]["BB"]["err_a"], 0.0);
        assert_eq!(value["stages"]["BB"]["verdict"], "success");
    }
}
