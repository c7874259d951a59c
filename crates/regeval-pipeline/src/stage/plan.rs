//! Stage plan: the ordered, normalized list of stages for one run.
//!
//! Normalization happens once, before any stage runs. A stage is skipped if
//! it is disabled, or if it is seeded by a stage that is itself skipped, so
//! a refinement never starts from an undefined seed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use log::debug;
use regeval_core::Real;
use thiserror::Error;

use super::{ExternalAlgorithm, RegistrationAlgorithm};
use crate::config::{StageKind, StageSpec};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("stage name {0} is used more than once")]
    DuplicateStage(String),
    #[error("stages {first} and {second} write the same file {}", .path.display())]
    DuplicateOutput {
        first: String,
        second: String,
        path: PathBuf,
    },
    #[error("stage {stage} is seeded from unknown stage {seed}")]
    UnknownSeed { stage: String, seed: String },
    #[error("stage {stage} is seeded from {seed}, which does not run before it")]
    SeedNotPreceding { stage: String, seed: String },
    #[error("global stage {0} cannot take a seed")]
    SeedOnGlobal(String),
}

/// Why a planned stage will not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// The named seed stage does not run.
    SeedUnavailable(String),
}

/// Where stage transform files live: `<work_dir>/<p>_A_<p>_B_<tag>.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFiles {
    pub work_dir: PathBuf,
    pub prefix: String,
}

impl StageFiles {
    pub fn new(work_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn output_path(&self, tag: &str) -> PathBuf {
        let p = &self.prefix;
        self.work_dir.join(format!("{p}_A_{p}_B_{tag}.csv"))
    }
}

/// One stage of a plan.
#[derive(Debug)]
pub struct PlannedStage {
    pub name: String,
    pub kind: StageKind,
    pub seed_from: Option<String>,
    pub output: PathBuf,
    pub params: BTreeMap<String, Real>,
    pub enabled: bool,
    pub algorithm: Box<dyn RegistrationAlgorithm>,
    skip: Option<SkipReason>,
}

impl PlannedStage {
    pub fn new(
        name: impl Into<String>,
        kind: StageKind,
        output: impl Into<PathBuf>,
        algorithm: Box<dyn RegistrationAlgorithm>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            seed_from: None,
            output: output.into(),
            params: BTreeMap::new(),
            enabled: true,
            algorithm,
            skip: None,
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

    pub fn with_params(mut self, params: BTreeMap<String, Real>) -> Self {
        self.params = params;
        self
    }

    /// `None` when the stage will run.
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        self.skip.as_ref()
    }

    pub fn will_run(&self) -> bool {
        self.skip.is_none()
    }
}

/// Expand a stage's sweep into one spec per value combination.
///
/// Each instance gets `_<value>` suffixes on its name and tag (one per axis,
/// in axis order) and the swept values merged into its parameters.
pub fn expand_sweep(spec: &StageSpec) -> Vec<StageSpec> {
    let mut instances = vec![StageSpec {
        sweep: Vec::new(),
        ..spec.clone()
    }];
    for axis in &spec.sweep {
        instances = instances
            .iter()
            .flat_map(|base| {
                axis.values.iter().map(move |value| {
                    let mut instance = base.clone();
                    instance.name = format!("{}_{value:?}", base.name);
                    instance.tag = format!("{}_{value:?}", base.tag);
                    instance.params.insert(axis.name.clone(), *value);
                    instance
                })
            })
            .collect();
    }
    instances
}

/// Normalized, ordered stages of a run.
#[derive(Debug, Default)]
pub struct EvaluationPlan {
    stages: Vec<PlannedStage>,
}

impl EvaluationPlan {
    /// Build a plan of external algorithms from configured stage specs.
    pub fn from_specs(
        specs: &[StageSpec],
        files: &StageFiles,
        default_timeout_secs: Option<Real>,
    ) -> Result<Self, PlanError> {
        let stages = specs
            .iter()
            .flat_map(expand_sweep)
            .map(|spec| {
                let algorithm = ExternalAlgorithm::new(spec.command, default_timeout_secs);
                let mut stage = PlannedStage::new(
                    spec.name,
                    spec.kind,
                    files.output_path(&spec.tag),
                    Box::new(algorithm),
                )
                .enabled(spec.enabled)
                .with_params(spec.params);
                stage.seed_from = spec.seed_from;
                stage
            })
            .collect();
        Self::new(stages)
    }

    /// Validate the stage list and resolve which stages run.
    pub fn new(mut stages: Vec<PlannedStage>) -> Result<Self, PlanError> {
        let mut position: HashMap<String, usize> = HashMap::new();
        {
            let mut outputs: HashMap<&Path, &str> = HashMap::new();
            for (idx, stage) in stages.iter().enumerate() {
                if position.insert(stage.name.clone(), idx).is_some() {
                    return Err(PlanError::DuplicateStage(stage.name.clone()));
                }
                if let Some(first) = outputs.insert(&stage.output, &stage.name) {
                    return Err(PlanError::DuplicateOutput {
                        first: first.to_string(),
                        second: stage.name.clone(),
                        path: stage.output.clone(),
                    });
                }
            }
        }

        for (idx, stage) in stages.iter().enumerate() {
            let Some(seed) = &stage.seed_from else {
                continue;
            };
            if stage.kind == StageKind::Global {
                return Err(PlanError::SeedOnGlobal(stage.name.clone()));
            }
            match position.get(seed) {
                None => {
                    return Err(PlanError::UnknownSeed {
                        stage: stage.name.clone(),
                        seed: seed.clone(),
                    });
                }
                Some(&seed_idx) if seed_idx >= idx => {
                    return Err(PlanError::SeedNotPreceding {
                        stage: stage.name.clone(),
                        seed: seed.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        let mut running: HashSet<String> = HashSet::new();
        for stage in &mut stages {
            stage.skip = if !stage.enabled {
                Some(SkipReason::Disabled)
            } else {
                match &stage.seed_from {
                    Some(seed) if !running.contains(seed) => {
                        Some(SkipReason::SeedUnavailable(seed.clone()))
                    }
                    _ => None,
                }
            };
            match &stage.skip {
                None => {
                    running.insert(stage.name.clone());
                }
                Some(SkipReason::SeedUnavailable(seed)) if stage.enabled => {
                    debug!("{} forced off: seed stage {seed} does not run", stage.name);
                }
                Some(_) => {}
            }
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[PlannedStage] {
        &self.stages
    }

    pub fn get(&self, name: &str) -> Option<&PlannedStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Names of the stages that will run, in order.
    pub fn runnable(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.will_run())
            .map(|s| s.name.as_str())
            .collect()
    }
}
