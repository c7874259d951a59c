//! Registration stages.
//!
//! A stage wraps one registration algorithm behind [`RegistrationAlgorithm`]:
//! two scans in, an optional estimate out. Global stages search from scratch;
//! refinement stages may start from the estimate of an earlier stage, passed
//! as a seed transform file.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use regeval_core::{Real, RigidTransform};

mod external;
mod plan;

pub use external::ExternalAlgorithm;
pub use plan::{EvaluationPlan, PlanError, PlannedStage, SkipReason, StageFiles, expand_sweep};

/// Inputs of one stage execution.
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    pub scan_a: &'a Path,
    pub scan_b: &'a Path,
    /// Where the algorithm writes its estimate.
    pub output: &'a Path,
    /// Transform file to start from; refinement stages only.
    pub seed: Option<&'a Path>,
    pub params: &'a BTreeMap<String, Real>,
}

/// What a stage execution produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub estimate: Option<RigidTransform>,
    /// Algorithm-specific extra values (e.g. hypothesis scores).
    pub aux: Vec<Real>,
    pub elapsed: Duration,
    pub success: bool,
}

impl StageOutcome {
    /// No estimate at all.
    pub fn failed(elapsed: Duration) -> Self {
        Self {
            estimate: None,
            aux: Vec::new(),
            elapsed,
            success: false,
        }
    }
}

/// A registration algorithm the runner can invoke.
///
/// `Err` means the algorithm could not be invoked at all. The runner records
/// it as a failed stage and carries on.
pub trait RegistrationAlgorithm: Debug {
    fn run(&self, request: &StageRequest<'_>) -> Result<StageOutcome>;
}
