//! Evaluation records: per-stage results plus the scene's ground truth.
//!
//! [`ResultAggregator`] collects one [`StageResult`] per stage as the run
//! progresses; [`ResultAggregator::finalize`] attaches the ground truth and
//! format version. The record is written once, as JSON, at the end of a run.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::{info, warn};
use regeval_core::{PoseError, Real, RigidTransform, Vec3, serde_nan};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::StageKind;
use crate::scene::SceneSample;

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Rotation and translation errors are both defined.
    Success,
    /// Translation failed but the rotation estimate is usable.
    RotationOnly,
    /// No usable estimate.
    Failure,
}

/// Result of one stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Key of the result; taken from the enclosing map when deserialized.
    #[serde(skip)]
    pub name: String,
    pub kind: StageKind,
    pub estimate: Option<RigidTransform>,
    /// Angular error in degrees, NaN if undefined.
    #[serde(with = "serde_nan::scalar")]
    pub err_a: Real,
    /// Translation error, NaN if undefined.
    #[serde(with = "serde_nan::scalar")]
    pub err_t: Real,
    /// Wall-clock seconds, including the seed stage for chained refinements.
    pub dt: Real,
    pub success: bool,
    pub verdict: Verdict,
    /// Algorithm-specific extra values.
    #[serde(
        rename = "Ks",
        with = "serde_nan::vec",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub aux: Vec<Real>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Real>,
}

impl StageResult {
    pub fn error(&self) -> PoseError {
        PoseError::new(self.err_a, self.err_t)
    }
}

/// Ground-truth block of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    #[serde(with = "serde_nan::array")]
    pub q: [Real; 4],
    #[serde(with = "serde_nan::array")]
    pub t: [Real; 3],
    #[serde(rename = "q_A_W", with = "serde_nan::array")]
    pub q_a_w: [Real; 4],
    #[serde(rename = "t_A_W", with = "serde_nan::array")]
    pub t_a_w: [Real; 3],
    #[serde(rename = "q_B_W", with = "serde_nan::array")]
    pub q_b_w: [Real; 4],
    #[serde(rename = "t_B_W", with = "serde_nan::array")]
    pub t_b_w: [Real; 3],
    #[serde(with = "serde_nan::scalar")]
    pub overlap: Real,
    #[serde(rename = "sizeA")]
    pub size_a: u64,
    #[serde(rename = "sizeB")]
    pub size_b: u64,
    /// Translation between the two viewpoints.
    #[serde(with = "serde_nan::scalar")]
    pub dtranslation: Real,
    /// Rotation between the two viewpoints, degrees.
    #[serde(with = "serde_nan::scalar")]
    pub dangle: Real,
}

impl GroundTruthRecord {
    pub fn from_scene(scene: &SceneSample) -> Self {
        Self {
            q: scene.ground_truth.quaternion_wxyz(),
            t: scene.ground_truth.translation_array(),
            q_a_w: scene.pose_a.quaternion_wxyz(),
            t_a_w: scene.pose_a.translation_array(),
            q_b_w: scene.pose_b.quaternion_wxyz(),
            t_b_w: scene.pose_b.translation_array(),
            overlap: scene.overlap,
            size_a: scene.size_a,
            size_b: scene.size_b,
            dtranslation: scene.relative_translation_magnitude(),
            dangle: scene.relative_angle_deg(),
        }
    }

    pub fn ground_truth(&self) -> RigidTransform {
        RigidTransform::from_wxyz(self.q, Vec3::from(self.t))
    }
}

/// Stage results keyed by name, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResults(Vec<StageResult>);

impl StageResults {
    pub fn get(&self, name: &str) -> Option<&StageResult> {
        self.0.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StageResult> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert or replace in place; returns `true` when a result was replaced.
    fn upsert(&mut self, result: StageResult) -> bool {
        match self.0.iter_mut().find(|r| r.name == result.name) {
            Some(slot) => {
                *slot = result;
                true
            }
            None => {
                self.0.push(result);
                false
            }
        }
    }
}

impl<'a> IntoIterator for &'a StageResults {
    type Item = &'a StageResult;
    type IntoIter = std::slice::Iter<'a, StageResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for StageResults {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for result in &self.0 {
            map.serialize_entry(&result.name, result)?;
        }
        map.end()
    }
}

struct StageResultsVisitor;

impl<'de> Visitor<'de> for StageResultsVisitor {
    type Value = StageResults;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from stage name to stage result")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut results = StageResults::default();
        while let Some((name, mut result)) = access.next_entry::<String, StageResult>()? {
            result.name = name;
            results.upsert(result);
        }
        Ok(results)
    }
}

impl<'de> Deserialize<'de> for StageResults {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(StageResultsVisitor)
    }
}

/// Everything recorded about one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub version: String,
    #[serde(rename = "GT")]
    pub ground_truth: GroundTruthRecord,
    pub stages: StageResults,
}

/// Collects stage results during a run.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    version: String,
    ground_truth: GroundTruthRecord,
    stages: StageResults,
}

impl ResultAggregator {
    pub fn new(ground_truth: GroundTruthRecord, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ground_truth,
            stages: StageResults::default(),
        }
    }

    /// Record a stage result. Recording the same name twice keeps the
    /// original position and the latest result.
    pub fn record(&mut self, name: impl Into<String>, mut result: StageResult) {
        result.name = name.into();
        let name = result.name.clone();
        if self.stages.upsert(result) {
            warn!("stage {name} recorded twice; keeping the latest result");
        }
    }

    pub fn stages(&self) -> &StageResults {
        &self.stages
    }

    pub fn finalize(self) -> EvaluationRecord {
        EvaluationRecord {
            version: self.version,
            ground_truth: self.ground_truth,
            stages: self.stages,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// `<output_dir>/<input stem>_<millis>_results.json`.
pub fn results_path(output_dir: &Path, input: &Path, millis: u128) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "regeval".to_string());
    output_dir.join(format!("{stem}_{millis}_results.json"))
}

pub fn write_record(path: &Path, record: &EvaluationRecord) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(record).context("failed to serialize results")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!("results written to {}", path.display());
    Ok(())
}

pub fn read_record(path: &Path) -> Result<EvaluationRecord> {
    let json =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground_truth() -> GroundTruthRecord {
        GroundTruthRecord {
            q: [1.0, 0.0, 0.0, 0.0],
            t: [0.0, 0.0, 0.0],
            q_a_w: [1.0, 0.0, 0.0, 0.0],
            t_a_w: [0.0, 0.0, 0.0],
            q_b_w: [1.0, 0.0, 0.0, 0.0],
            t_b_w: [0.0, 0.0, 0.0],
            overlap: 0.7,
            size_a: 100,
            size_b: 120,
            dtranslation: 0.0,
            dangle: 0.0,
        }
    }

    fn result(err_a: Real, verdict: Verdict) -> StageResult {
        StageResult {
            name: String::new(),
            kind: StageKind::Global,
            estimate: None,
            err_a,
            err_t: Real::NAN,
            dt: 1.5,
            success: false,
            verdict,
            aux: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    #[test]
    fn record_keeps_first_position_and_last_value() {
        let mut agg = ResultAggregator::new(ground_truth(), "1.0");
        agg.record("BB", result(1.0, Verdict::RotationOnly));
        agg.record("ICP", result(2.0, Verdict::RotationOnly));
        agg.record("BB", result(3.0, Verdict::RotationOnly));

        let record = agg.finalize();
        assert_eq!(record.stages.names(), vec!["BB", "ICP"]);
        assert_eq!(record.stages.get("BB").unwrap().err_a, 3.0);
    }

    #[test]
    fn json_layout_uses_record_keys() {
        let mut agg = ResultAggregator::new(ground_truth(), "1.0");
        let mut r = result(Real::NAN, Verdict::Failure);
        r.aux = vec![0.5];
        agg.record("BB", r);
        let value = serde_json::to_value(agg.finalize()).unwrap();

        assert_eq!(value["version"], "1.0");
        assert_eq!(value["GT"]["sizeA"], 100);
        assert_eq!(value["GT"]["q_A_W"][0], 1.0);
        let bb = &value["stages"]["BB"];
        assert!(bb["err_a"].is_null());
        assert!(bb["estimate"].is_null());
        assert_eq!(bb["verdict"], "failure");
        assert_eq!(bb["Ks"][0], 0.5);
        assert!(bb.get("params").is_none());
        assert!(bb.get("name").is_none());
    }

    #[test]
    fn results_path_uses_input_stem() {
        let path = results_path(Path::new("/out"), Path::new("/data/bunny.ply"), 1234);
        assert_eq!(path, Path::new("/out/bunny_1234_results.json"));
    }
}
