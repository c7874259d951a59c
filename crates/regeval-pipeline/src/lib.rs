//! Evaluation pipeline for point-cloud registration algorithms.
//!
//! A run resolves a scene with known ground truth ([`scene`]), executes an
//! ordered plan of registration stages against it ([`stage`], [`runner`]),
//! and collects one result per stage into an [`EvaluationRecord`]
//! ([`record`]). Stages whose error exceeds the configured thresholds can be
//! shown for manual inspection ([`display`]).
//!
//! Registration algorithms, the scene sampler and the visualizer are external
//! programs described by [`config::CommandTemplate`]s.

pub mod config;
pub mod display;
pub mod external;
pub mod record;
pub mod runner;
pub mod scene;
pub mod stage;

pub use config::{
    CommandTemplate, ConfigError, DisplayPolicy, EvaluationConfig, FORMAT_VERSION, StageKind,
    StageSpec, SweepAxis,
};
pub use display::{
    DisplayRequest, DisplayTrigger, ExternalVisualizer, Visualizer, should_display,
};
pub use record::{
    EvaluationRecord, GroundTruthRecord, ResultAggregator, StageResult, StageResults, Verdict,
    epoch_millis, read_record, results_path, write_record,
};
pub use runner::{assess_outcome, run_evaluation};
pub use scene::{SceneError, SceneRequest, SceneSample, resolve_scene};
pub use stage::{
    EvaluationPlan, ExternalAlgorithm, PlanError, PlannedStage, RegistrationAlgorithm,
    SkipReason, StageFiles, StageOutcome, StageRequest,
};
