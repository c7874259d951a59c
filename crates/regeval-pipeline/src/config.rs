//! Run configuration for an evaluation.
//!
//! All toggles and thresholds of a run live in one immutable
//! [`EvaluationConfig`] value, loaded from JSON or taken from
//! [`EvaluationConfig::default`], which declares the standard algorithm
//! line-up with only the branch-and-bound stage enabled.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regeval_core::Real;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version string written into every result document.
pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Command line of an external tool with `{placeholder}` substitution.
///
/// `args` are expanded on every invocation. `seed_args` are appended only
/// when the invocation carries a seed transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed_args: Vec<String>,
    /// Wall-clock budget in seconds; `None` falls back to the run default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<Real>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            seed_args: Vec::new(),
            timeout_secs: None,
        }
    }

    pub fn with_seed_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, secs: Real) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Effective timeout given the run-wide default.
    pub fn timeout(&self, default_secs: Option<Real>) -> Option<Duration> {
        self.timeout_secs
            .or(default_secs)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Whether a stage searches globally or refines a prior estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Global,
    Refinement,
}

/// One swept parameter: each value yields a separate stage instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepAxis {
    pub name: String,
    pub values: Vec<Real>,
}

impl SweepAxis {
    pub fn new(name: impl Into<String>, values: impl Into<Vec<Real>>) -> Self {
        Self {
            name: name.into(),
            values: values.into(),
        }
    }
}

/// Declaration of a registration stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Key under which the result is recorded (e.g. `"BB+ICP"`).
    pub name: String,
    /// File-name tag of the stage's transform file (e.g. `"BB_ICP"`).
    pub tag: String,
    pub kind: StageKind,
    /// Stage whose estimate seeds this one; refinement stages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_from: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub command: CommandTemplate,
    /// Fixed algorithm parameters, available as `{name}` placeholders.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Real>,
    /// Parameter sweep; expanded into one instance per value combination.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sweep: Vec<SweepAxis>,
}

fn default_true() -> bool {
    true
}

impl StageSpec {
    pub fn global(
        name: impl Into<String>,
        tag: impl Into<String>,
        command: CommandTemplate,
    ) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            kind: StageKind::Global,
            seed_from: None,
            enabled: true,
            command,
            params: BTreeMap::new(),
            sweep: Vec::new(),
        }
    }

    pub fn refinement(
        name: impl Into<String>,
        tag: impl Into<String>,
        command: CommandTemplate,
    ) -> Self {
        Self {
            kind: StageKind::Refinement,
            ..Self::global(name, tag, command)
        }
    }

    pub fn seeded_from(mut self, stage: impl Into<String>) -> Self {
        self.seed_from = Some(stage.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Real) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_sweep(mut self, axis: SweepAxis) -> Self {
        self.sweep.push(axis);
        self
    }
}

/// When and how aligned clouds are shown for manual inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayPolicy {
    /// Show a stage whose error exceeds a threshold.
    pub on_large_deviation: bool,
    pub angular_threshold_deg: Real,
    pub translation_threshold: Real,
    /// Show the untransformed and ground-truth-aligned pair before any stage runs.
    pub show_ground_truth: bool,
    pub show_axes: bool,
    pub show_normals: bool,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self {
            on_large_deviation: true,
            angular_threshold_deg: 2.0,
            translation_threshold: 0.3,
            show_ground_truth: false,
            show_axes: true,
            show_normals: false,
        }
    }
}

/// Complete configuration of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub format_version: String,
    /// Directory for sampler outputs and per-stage transform files.
    pub work_dir: PathBuf,
    /// Time budget applied to commands without their own `timeout_secs`.
    pub default_timeout_secs: Option<Real>,
    pub sampler: CommandTemplate,
    pub visualizer: Option<CommandTemplate>,
    pub display: DisplayPolicy,
    /// Stages in execution order.
    pub stages: Vec<StageSpec>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            work_dir: PathBuf::from("."),
            default_timeout_secs: None,
            sampler: CommandTemplate::new(
                "../build/bin/renderPcFromPc",
                [
                    "-i",
                    "{input}",
                    "-o",
                    "{output}",
                    "-a",
                    "{angle}",
                    "-t",
                    "{translation}",
                    "-m",
                    "{min_overlap}",
                ],
            ),
            visualizer: None,
            display: DisplayPolicy::default(),
            stages: default_stages(),
        }
    }
}

fn bb_command(extra: &[&str]) -> CommandTemplate {
    let mut args = vec![
        "-a",
        "{scan_a}",
        "-b",
        "{scan_b}",
        "-o",
        "{output}",
        "-l",
        "{lambdaS3}",
        "-t",
        "{lambdaR3}",
    ];
    args.extend_from_slice(extra);
    CommandTemplate::new("../build/bin/dpvMFoptRotPly", args)
}

fn pairwise_command(program: &str) -> CommandTemplate {
    CommandTemplate::new(program, ["-a", "{scan_a}", "-b", "{scan_b}", "-o", "{output}"])
}

fn icp_command() -> CommandTemplate {
    CommandTemplate::new(
        "../build/bin/icp",
        ["-a", "{scan_a}", "-b", "{scan_b}", "-o", "{output}", "-n"],
    )
    .with_seed_args(["-s", "{seed}"])
}

fn icp_after(name: &str, tag: &str, seed: &str) -> StageSpec {
    StageSpec::refinement(format!("{name}+ICP"), format!("{tag}_ICP"), icp_command())
        .seeded_from(seed)
        .enabled(false)
}

/// The standard line-up of global solvers and their ICP refinements.
pub fn default_stages() -> Vec<StageSpec> {
    let bb = |name: &str, tag: &str, extra: &[&str]| {
        StageSpec::global(name, tag, bb_command(extra))
            .with_param("lambdaS3", 45.0)
            .with_param("lambdaR3", 0.5)
    };

    vec![
        StageSpec::global("Gogma", "Gogma", pairwise_command("../build/bin/gogma")).enabled(false),
        StageSpec::global(
            "GoICP",
            "GoICP",
            pairwise_command("../build/bin/goicp").with_timeout(600.0),
        )
        .with_param("trim", 0.2)
        .enabled(false),
        StageSpec::global("FFT", "FFT", pairwise_command("../build/bin/fftRegistration"))
            .enabled(false),
        icp_after("FFT", "FFT", "FFT"),
        bb("Map", "Map", &["--simpleRotation", "--tryMfAmbig"]).enabled(false),
        icp_after("Map", "Map", "Map"),
        bb("BB", "BB", &[]),
        icp_after("BB", "BB", "BB"),
        bb("BBEGI", "BBEGI", &["--egi"]).enabled(false),
        icp_after("BBEGI", "BBEGI", "BBEGI"),
        StageSpec::global("BB", "BB_sweep", bb_command(&[]))
            .with_sweep(SweepAxis::new("lambdaS3", vec![45.0]))
            .with_sweep(SweepAxis::new("lambdaR3", vec![0.5]))
            .enabled(false),
        StageSpec::global("MM", "MM", pairwise_command("../build/bin/momentMatching"))
            .enabled(false),
        icp_after("MM", "MM", "MM"),
        StageSpec::refinement("ICP", "ICP", icp_command()).enabled(false),
    ]
}

fn check_timeout(secs: Option<Real>, what: &str) -> Result<(), ConfigError> {
    match secs {
        Some(s) if !(s.is_finite() && s > 0.0) => Err(ConfigError::Invalid(format!(
            "{what}: timeout must be a positive number of seconds, got {s}"
        ))),
        _ => Ok(()),
    }
}

impl EvaluationConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check thresholds, timeouts and stage declarations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.display;
        if !(d.angular_threshold_deg >= 0.0) || !(d.translation_threshold >= 0.0) {
            return Err(ConfigError::Invalid(
                "display thresholds must be non-negative".to_string(),
            ));
        }
        check_timeout(self.default_timeout_secs, "default_timeout_secs")?;
        check_timeout(self.sampler.timeout_secs, "sampler")?;

        for stage in &self.stages {
            if stage.name.trim().is_empty() || stage.tag.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "stage name and tag must be non-empty".to_string(),
                ));
            }
            check_timeout(stage.command.timeout_secs, &stage.name)?;
            if let Some(axis) = stage.sweep.iter().find(|axis| axis.values.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "stage {}: sweep axis {} has no values",
                    stage.name, axis.name
                )));
            }
        }
        Ok(())
    }

    /// Names of the stages enabled by configuration (before sweep expansion).
    pub fn enabled_stage_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.as_str())
            .collect()
    }
}
