//! Core geometry and error model for `regeval`.
//!
//! This crate provides the building blocks shared by the evaluation pipeline
//! and the command-line tool:
//!
//! - linear algebra type aliases (`Real`, `Vec3`, `Quat`, `Iso3`),
//! - [`RigidTransform`], an immutable rotation + translation value,
//! - the registration error model ([`evaluate`], [`angular_error_deg`],
//!   [`translation_error`]) using NaN as the "error undefined" sentinel,
//! - a reader/writer for the `qw qx qy qz tx ty tz` transform files exchanged
//!   with external registration tools,
//! - serde helpers that store NaN as JSON `null`.
//!
//! # Example
//!
//! ```
//! use regeval_core::{RigidTransform, Vec3, evaluate};
//!
//! let gt = RigidTransform::from_wxyz([1.0, 0.0, 0.0, 0.0], Vec3::new(0.1, 0.0, 0.0));
//! let est = RigidTransform::from_wxyz([1.0, 0.0, 0.0, 0.0], Vec3::new(0.1, 0.0, 0.0));
//!
//! let err = evaluate(&gt, Some(&est));
//! assert!(err.angular_deg.abs() < 1e-9);
//! assert!(evaluate(&gt, None).angular_deg.is_nan());
//! ```

/// Linear algebra type aliases.
mod math;
/// Rigid transform value type.
mod transform;

/// Registration error model.
pub mod error_model;
/// NaN-aware serde adapters.
pub mod serde_nan;
/// Transform-file reading and writing.
pub mod transform_file;

pub use error_model::{
    PoseError, angular_error_deg, evaluate, evaluate_rotation_only, translation_error,
};
pub use math::*;
pub use transform::{RigidTransform, TransformRecord};
pub use transform_file::{
    TRANSFORM_HEADER, TransformFile, TransformFileError, parse_transform_file,
    read_transform_file, write_transform_file,
};
