//! Stage runner: executes a plan against one scene.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use regeval_core::{
    PoseError, Real, RigidTransform, Vec3, evaluate, evaluate_rotation_only,
    write_transform_file,
};

use crate::display::DisplayTrigger;
use crate::record::{EvaluationRecord, GroundTruthRecord, ResultAggregator, StageResult, Verdict};
use crate::scene::SceneSample;
use crate::stage::{EvaluationPlan, PlannedStage, StageOutcome, StageRequest};

/// Classify an outcome and compute its error against ground truth.
///
/// A failed outcome whose translation is entirely NaN still has its rotation
/// evaluated; any other failure leaves both errors undefined.
pub fn assess_outcome(
    ground_truth: &RigidTransform,
    outcome: &StageOutcome,
) -> (Verdict, PoseError) {
    match &outcome.estimate {
        Some(est) if outcome.success => (Verdict::Success, evaluate(ground_truth, Some(est))),
        Some(est) if est.translation_undefined() => {
            let error = evaluate_rotation_only(ground_truth, Some(est));
            if error.angular_deg.is_nan() {
                (Verdict::Failure, PoseError::UNDEFINED)
            } else {
                (Verdict::RotationOnly, error)
            }
        }
        _ => (Verdict::Failure, PoseError::UNDEFINED),
    }
}

/// Transform to show for a stage: identity without an estimate, and a zero
/// translation in place of an undefined one.
fn display_transform(estimate: Option<&RigidTransform>) -> RigidTransform {
    match estimate {
        None => RigidTransform::identity(),
        Some(est) if est.translation().iter().any(|v| v.is_nan()) => {
            RigidTransform::new(*est.rotation(), Vec3::zeros())
        }
        Some(est) => *est,
    }
}

/// What later stages need from a finished one.
struct Finished<'p> {
    estimate: Option<RigidTransform>,
    /// Cumulative wall-clock seconds.
    dt: Real,
    success: bool,
    output: &'p Path,
}

/// Write the seed stage's estimate back to its file so refinement reads a
/// well-formed transform.
fn emit_seed(name: &str, seed_name: &str, seed: &Finished<'_>) -> bool {
    let Some(estimate) = &seed.estimate else {
        warn!("{name}: seed stage {seed_name} has no estimate");
        return false;
    };
    match write_transform_file(seed.output, estimate) {
        Ok(()) => true,
        Err(err) => {
            warn!("{name}: cannot write seed: {err}");
            false
        }
    }
}

fn run_stage(stage: &PlannedStage, scene: &SceneSample, seed: Option<&Path>) -> StageOutcome {
    let request = StageRequest {
        scan_a: &scene.scan_a,
        scan_b: &scene.scan_b,
        output: &stage.output,
        seed,
        params: &stage.params,
    };
    match stage.algorithm.run(&request) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("{}: {err:#}", stage.name);
            StageOutcome::failed(Duration::ZERO)
        }
    }
}

/// Run every runnable stage of `plan` in order and collect the results.
///
/// Stage failures are recorded, never propagated. A refinement stage whose
/// seed stage did not succeed is skipped and left out of the record.
pub fn run_evaluation(
    scene: &SceneSample,
    plan: &EvaluationPlan,
    version: &str,
    display: &DisplayTrigger<'_>,
) -> EvaluationRecord {
    let ground_truth = &scene.ground_truth;
    let mut aggregator = ResultAggregator::new(GroundTruthRecord::from_scene(scene), version);
    display.ground_truth(&scene.scan_a, &scene.scan_b, ground_truth);

    let mut finished: HashMap<&str, Finished<'_>> = HashMap::new();
    for stage in plan.stages() {
        let name = stage.name.as_str();
        if let Some(reason) = stage.skip_reason() {
            debug!("{name}: not run ({reason:?})");
            continue;
        }

        let seed = match stage.seed_from.as_deref() {
            None => None,
            Some(seed_name) => match finished.get(seed_name) {
                Some(prior) if prior.success && emit_seed(name, seed_name, prior) => Some(prior),
                _ => {
                    info!("{name}: skipped, seed stage {seed_name} did not succeed");
                    continue;
                }
            },
        };

        let outcome = run_stage(stage, scene, seed.map(|prior| prior.output));
        let (verdict, error) = assess_outcome(ground_truth, &outcome);
        let dt = outcome.elapsed.as_secs_f64() + seed.map_or(0.0, |prior| prior.dt);
        info!("{name}: {} deg {} m", error.angular_deg, error.translation);

        display.stage(
            name,
            &scene.scan_a,
            &scene.scan_b,
            &display_transform(outcome.estimate.as_ref()),
            &error,
        );

        aggregator.record(
            name,
            StageResult {
                name: name.to_string(),
                kind: stage.kind,
                estimate: outcome.estimate,
                err_a: error.angular_deg,
                err_t: error.translation,
                dt,
                success: outcome.success,
                verdict,
                aux: outcome.aux,
                params: stage.params.clone(),
            },
        );
        finished.insert(
            name,
            Finished {
                estimate: outcome.estimate,
                dt,
                success: outcome.success,
                output: &stage.output,
            },
        );
    }

    aggregator.finalize()
}
