//! Text transform files exchanged with external tools.
//!
//! Layout:
//!
//! ```text
//! qw qx qy qz tx ty tz
//! 1 0 0 0 0.1 0.2 0.3 [extra values...]
//! [auxiliary rows...]
//! ```
//!
//! The header line is optional on read. Values after the first seven on the
//! data line (e.g. overlap and point counts written by the sampler) are kept
//! in [`TransformFile::data`]. Any following numeric rows (e.g. per-hypothesis
//! scores written by global solvers) are kept in [`TransformFile::aux`].
//! `nan`/`NaN` tokens are accepted and preserved.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::math::{Real, Vec3};
use crate::transform::RigidTransform;

/// Header line written before the transform values.
pub const TRANSFORM_HEADER: &str = "qw qx qy qz tx ty tz";

#[derive(Debug, Error)]
pub enum TransformFileError {
    #[error("failed to access transform file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("transform file {} contains no data line", .path.display())]
    MissingData { path: PathBuf },
    #[error(
        "transform file {} line {line}: expected at least 7 values, got {got}",
        .path.display()
    )]
    TooFewValues {
        path: PathBuf,
        line: usize,
        got: usize,
    },
    #[error(
        "transform file {} line {line}: invalid number '{token}'",
        .path.display()
    )]
    InvalidNumber {
        path: PathBuf,
        line: usize,
        token: String,
    },
}

/// Parsed contents of a transform file.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformFile {
    pub transform: RigidTransform,
    /// Extra values following the seven transform values on the data line.
    pub data: Vec<Real>,
    /// Numeric rows following the data line.
    pub aux: Vec<Vec<Real>>,
}

fn parse_row(path: &Path, line: usize, text: &str) -> Result<Vec<Real>, TransformFileError> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<Real>()
                .map_err(|_| TransformFileError::InvalidNumber {
                    path: path.to_path_buf(),
                    line,
                    token: token.to_string(),
                })
        })
        .collect()
}

fn is_header(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .is_some_and(|token| token.parse::<Real>().is_err())
}

/// Parse transform-file contents. `path` is only used for error messages.
pub fn parse_transform_file(
    path: &Path,
    contents: &str,
) -> Result<TransformFile, TransformFileError> {
    let mut rows = contents
        .lines()
        .enumerate()
        .map(|(idx, text)| (idx + 1, text.trim()))
        .filter(|(_, text)| !text.is_empty())
        .peekable();

    if rows.peek().is_some_and(|(_, text)| is_header(text)) {
        rows.next();
    }

    let (line, text) = rows.next().ok_or_else(|| TransformFileError::MissingData {
        path: path.to_path_buf(),
    })?;
    let values = parse_row(path, line, text)?;
    if values.len() < 7 {
        return Err(TransformFileError::TooFewValues {
            path: path.to_path_buf(),
            line,
            got: values.len(),
        });
    }

    let transform = RigidTransform::from_wxyz(
        [values[0], values[1], values[2], values[3]],
        Vec3::new(values[4], values[5], values[6]),
    );
    let data = values[7..].to_vec();

    let aux = rows
        .map(|(line, text)| parse_row(path, line, text))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TransformFile {
        transform,
        data,
        aux,
    })
}

/// Read and parse a transform file.
pub fn read_transform_file(path: &Path) -> Result<TransformFile, TransformFileError> {
    let contents = fs::read_to_string(path).map_err(|source| TransformFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = parse_transform_file(path, &contents)?;
    debug!(
        "read transform from {}: q={:?} t={:?}",
        path.display(),
        parsed.transform.quaternion_wxyz(),
        parsed.transform.translation_array()
    );
    Ok(parsed)
}

/// Write a transform in the canonical `qw qx qy qz tx ty tz` layout.
pub fn write_transform_file(
    path: &Path,
    transform: &RigidTransform,
) -> Result<(), TransformFileError> {
    let q = transform.quaternion_wxyz();
    let t = transform.translation_array();
    let contents = format!(
        "{TRANSFORM_HEADER}\n{} {} {} {} {} {} {}\n",
        q[0], q[1], q[2], q[3], t[0], t[1], t[2]
    );
    fs::write(path, contents).map_err(|source| TransformFileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_header_data_and_aux() {
        let text = "qw qx qy qz tx ty tz\n1 0 0 0 0.5 -1 2 0.7 1200 1300\n0.9 0.05\n\n0.01\n";
        let file = parse_transform_file(Path::new("mem"), text).unwrap();
        assert_relative_eq!(file.transform.translation().y, -1.0);
        assert_eq!(file.data, vec![0.7, 1200.0, 1300.0]);
        assert_eq!(file.aux, vec![vec![0.9, 0.05], vec![0.01]]);
    }

    #[test]
    fn header_is_optional() {
        let file = parse_transform_file(Path::new("mem"), "1 0 0 0 1 2 3").unwrap();
        assert_eq!(file.transform.translation_array(), [1.0, 2.0, 3.0]);
        assert!(file.data.is_empty());
        assert!(file.aux.is_empty());
    }

    #[test]
    fn nan_translation_is_preserved() {
        let file = parse_transform_file(Path::new("mem"), "1 0 0 0 nan NaN nan").unwrap();
        assert!(file.transform.translation_undefined());
        assert_relative_eq!(file.transform.quaternion_wxyz()[0], 1.0);
    }

    #[test]
    fn rejects_short_and_malformed_rows() {
        let short = parse_transform_file(Path::new("mem"), "qw qx qy qz tx ty tz\n1 0 0 0 1");
        assert!(matches!(
            short,
            Err(TransformFileError::TooFewValues { line: 2, got: 5, .. })
        ));
        let bad = parse_transform_file(Path::new("mem"), "1 0 0 0 1 x 3");
        assert!(matches!(bad, Err(TransformFileError::InvalidNumber { .. })));
        let empty = parse_transform_file(Path::new("mem"), "qw qx qy qz tx ty tz\n");
        assert!(matches!(empty, Err(TransformFileError::MissingData { .. })));
    }

    #[test]
    fn write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("est.csv");
        let t = RigidTransform::from_wxyz([0.9, 0.1, -0.3, 0.2], Vec3::new(0.25, -4.0, 1e-3));
        write_transform_file(&path, &t).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(TRANSFORM_HEADER));

        let back = read_transform_file(&path).unwrap();
        for (a, b) in back
            .transform
            .quaternion_wxyz()
            .iter()
            .zip(t.quaternion_wxyz().iter())
        {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        assert_eq!(back.transform.translation_array(), t.translation_array());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_transform_file(Path::new("/nonexistent/regeval/t.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/regeval/t.csv"));
    }
}
