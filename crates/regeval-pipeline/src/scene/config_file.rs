//! Pre-rendered scene configs.
//!
//! ```text
//! scan_a.ply
//! scan_b.ply
//! <ignored>
//! qx qy qz qw tx ty tz overlap sizeA sizeB
//! ```
//!
//! Scan paths are relative to the config file's directory. The packed
//! transform is stored A→B with an x,y,z,w quaternion; ground truth is its
//! inverse with the translation re-derived as `-(q_gt · t_stored)`.

use std::fs;
use std::path::Path;

use log::{debug, warn};
use regeval_core::{Quat, Real, RigidTransform, Vec3};

use super::{SceneError, SceneSample, require_file};

const PACKED_VALUES: usize = 10;

/// `true` when the path contains `config_`, one or more digits, any single
/// character and `txt`.
pub fn is_scene_config(path: &Path) -> bool {
    let text = path.to_string_lossy();
    text.match_indices("config_").any(|(idx, marker)| {
        let rest = &text[idx + marker.len()..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return false;
        }
        // The character before `txt` may itself be the last digit.
        (1..=digits).any(|end| {
            let mut tail = rest[end..].chars();
            tail.next().is_some() && tail.as_str().starts_with("txt")
        })
    })
}

/// Ground truth from the stored A→B transform (x,y,z,w quaternion order).
pub fn ground_truth_from_stored(q_xyzw: [Real; 4], t: Vec3) -> RigidTransform {
    let rotation: Quat = RigidTransform::from_xyzw(q_xyzw, Vec3::zeros())
        .rotation()
        .inverse();
    let translation = -(rotation * t);
    RigidTransform::new(rotation, translation)
}

/// Parse config contents; `path` locates the scans and labels errors.
pub fn parse_scene_config(path: &Path, contents: &str) -> Result<SceneSample, SceneError> {
    let malformed = |reason: String| SceneError::MalformedConfig {
        path: path.to_path_buf(),
        reason,
    };
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    let mut lines = contents.lines();
    let mut scan_line = |which: &str| {
        lines
            .next()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| malformed(format!("missing path of scan {which}")))
    };
    let scan_a = base.join(scan_line("A")?);
    let scan_b = base.join(scan_line("B")?);
    lines.next();

    let values = lines
        .flat_map(str::split_whitespace)
        .map(|token| {
            token
                .parse::<Real>()
                .map_err(|_| malformed(format!("invalid number '{token}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() < PACKED_VALUES {
        return Err(malformed(format!(
            "expected {PACKED_VALUES} ground-truth values, got {}",
            values.len()
        )));
    }

    let ground_truth = ground_truth_from_stored(
        [values[0], values[1], values[2], values[3]],
        Vec3::new(values[4], values[5], values[6]),
    );
    let overlap = values[7];
    if !(0.0..=1.0).contains(&overlap) {
        warn!("{}: overlap {overlap} outside [0, 1]", path.display());
    }

    let label = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(SceneSample {
        scan_a,
        scan_b,
        pose_a: RigidTransform::identity(),
        pose_b: RigidTransform::identity(),
        ground_truth,
        overlap,
        size_a: count(values[8]),
        size_b: count(values[9]),
        label,
    })
}

pub(crate) fn count(value: Real) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Load a scene config and check that both scans exist.
pub fn load_scene_config(path: &Path) -> Result<SceneSample, SceneError> {
    let contents = fs::read_to_string(path).map_err(|source| SceneError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })?;
    let scene = parse_scene_config(path, &contents)?;
    require_file(&scene.scan_a)?;
    require_file(&scene.scan_b)?;
    debug!(
        "scene {} from config: {} / {}",
        scene.label,
        scene.scan_a.display(),
        scene.scan_b.display()
    );
    Ok(scene)
}
