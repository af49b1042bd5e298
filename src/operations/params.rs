// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Parameters of each named operation.
//!
//! Numeric values are passed to the tools unmodified. Relative paths are
//! taken relative to the operation's working directory.

use std::path::{Path, PathBuf};

/// Dilate, erode, extract and smooth a segmentation into a surface mesh
#[derive(Debug, Clone)]
pub struct SurfaceParams {
    pub dir: PathBuf,
    pub segmentation: PathBuf,
    pub iterations: i32,
    pub threshold: f32,
    pub blur: i32,
    pub smooth: i32,
}

/// Tetrahedral mesh from `converted.inr` in `dir`
#[derive(Debug, Clone)]
pub struct CgalMeshParams {
    pub dir: PathBuf,
    /// Output name, without extension
    pub file_name: String,
    /// Meshtools3D parameter file
    pub template: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RegistrationParams {
    pub dir: PathBuf,
    pub fixed: PathBuf,
    pub moving: PathBuf,
    pub dof_out: PathBuf,
    /// Transformation model, e.g. `Rigid`
    pub model: String,
}

impl RegistrationParams {
    /// Rigid registration of `<mra>.nii` onto `<lge>.nii`, written to
    /// `rigid.dof`
    pub fn rigid(dir: &Path, lge: &str, mra: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            fixed: dir.join(format!("{}.nii", lge)),
            moving: dir.join(format!("{}.nii", mra)),
            dof_out: dir.join("rigid.dof"),
            model: "Rigid".into(),
        }
    }
}

/// Apply a transformation to an image
#[derive(Debug, Clone)]
pub struct TransformationParams {
    pub dir: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub dof: PathBuf,
}

impl TransformationParams {
    /// Transform with the `rigid.dof` of an earlier registration in `dir`
    pub fn with_rigid(dir: &Path, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            input: input.into(),
            output: output.into(),
            dof: dir.join("rigid.dof"),
        }
    }
}

/// Apply a transformation to the points of a mesh
#[derive(Debug, Clone)]
pub struct PointTransformationParams {
    pub dir: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub dof: PathBuf,
}

/// Transform a mesh once per output time frame
#[derive(Debug, Clone)]
pub struct ApplyParams {
    pub dir: PathBuf,
    pub mesh: PathBuf,
    pub initial_time: f64,
    pub dof: PathBuf,
    pub frames: u32,
    /// Temporal smoothing factor: 1, 2 or 5
    pub smooth: u32,
}

/// Rigid translation of one mesh onto another
#[derive(Debug, Clone)]
pub struct TranslationParams {
    pub dir: PathBuf,
    pub source: PathBuf,
    pub target: PathBuf,
    pub output: PathBuf,
}

/// Isotropic resampling. The input's directory is the working directory.
#[derive(Debug, Clone)]
pub struct ResamplingParams {
    pub input: PathBuf,
    pub output: PathBuf,
    pub isotropic: f64,
}

/// Motion tracking over an image sequence
#[derive(Debug, Clone)]
pub struct TrackingParams {
    pub dir: PathBuf,
    /// File listing the time-frame images
    pub images: PathBuf,
    /// Optional registration parameter file
    pub parameters: Option<PathBuf>,
}

/// CemrgNet segmentation of an MRA image
#[derive(Debug, Clone)]
pub struct PredictionParams {
    pub input: PathBuf,
}
