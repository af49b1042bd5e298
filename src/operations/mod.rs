// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Named operations and their fixed stage templates
//!
//! Each operation owns the order of its stages, their flags and the fixed
//! names of intermediate artifacts. Backends only decide how paths are
//! written and how executables are reached.

mod params;

pub use params::{
    ApplyParams, CgalMeshParams, PointTransformationParams, PredictionParams,
    RegistrationParams, ResamplingParams, SurfaceParams, TrackingParams, TransformationParams,
    TranslationParams,
};

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::backend::{absolutize, Tool, Toolkit};
use crate::pipeline::{Finalize, PipelinePlan, Prepare, StageTemplate, Validation};

/// Dilated segmentation
pub const DILATED: &str = "segmentation.d.nii";
/// Closed (dilated then eroded) segmentation
pub const CLOSED: &str = "segmentation.s.nii";
/// Extracted and smoothed surface
pub const SURFACE: &str = "segmentation.vtk";
/// Input the CGAL mesher reads from the working directory
pub const CGAL_INPUT: &str = "converted.inr";
/// Output folder of the CGAL mesher
pub const CGAL_OUTPUT_DIR: &str = "CGALMeshDir";
/// Tracking output
pub const TRACKING_DOF: &str = "tsffd.dof";
/// Prefix of the per-frame meshes written by apply
pub const TRANSFORMED_PREFIX: &str = "transformed-";
/// Transformation produced by the translation stage
pub const TRANSLATION_DOF: &str = ".init-tx.dof";
/// Input name CemrgNet expects
pub const PREDICTION_INPUT: &str = "test.nii";
/// Output name CemrgNet writes
pub const PREDICTION_RAW: &str = "output.nii";
/// Final prediction artifact
pub const PREDICTION_OUTPUT: &str = "LA-cemrgnet.nii";

/// One engine entry point with its parameters
#[derive(Debug, Clone)]
pub enum Operation {
    Surface(SurfaceParams),
    CgalMesh(CgalMeshParams),
    Registration(RegistrationParams),
    Transformation(TransformationParams),
    PointTransformation(PointTransformationParams),
    Apply(ApplyParams),
    Translation(TranslationParams),
    Resampling(ResamplingParams),
    Tracking(TrackingParams),
    Prediction(PredictionParams),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Surface(_) => "surface",
            Self::CgalMesh(_) => "cgal-mesh",
            Self::Registration(_) => "registration",
            Self::Transformation(_) => "transformation",
            Self::PointTransformation(_) => "point-transformation",
            Self::Apply(_) => "apply",
            Self::Translation(_) => "translation",
            Self::Resampling(_) => "resampling",
            Self::Tracking(_) => "tracking",
            Self::Prediction(_) => "prediction",
        }
    }

    pub fn toolkit(&self) -> Toolkit {
        match self {
            Self::CgalMesh(_) => Toolkit::Meshtools3d,
            Self::Prediction(_) => Toolkit::CemrgNet,
            _ => Toolkit::Mirtk,
        }
    }

    /// Build the backend-independent plan. Relative working directories and
    /// inputs are taken relative to the process working directory.
    pub fn plan(&self) -> PipelinePlan {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        self.plan_in(&cwd)
    }

    /// Build the plan with relative working directories and inputs taken
    /// relative to `base`
    pub fn plan_in(&self, base: &Path) -> PipelinePlan {
        match &self.anchored(base) {
            Self::Surface(p) => surface(p),
            Self::CgalMesh(p) => cgal_mesh(p),
            Self::Registration(p) => registration(p),
            Self::Transformation(p) => transformation(p),
            Self::PointTransformation(p) => point_transformation(p),
            Self::Apply(p) => apply(p),
            Self::Translation(p) => translation(p),
            Self::Resampling(p) => resampling(p),
            Self::Tracking(p) => tracking(p),
            Self::Prediction(p) => prediction(p),
        }
    }

    /// Copy of this operation whose working directory (or input, for the
    /// operations that work next to their input) is absolute
    fn anchored(&self, base: &Path) -> Operation {
        let anchor = |path: &Path| -> PathBuf { absolutize(path, base).components().collect() };
        match self {
            Self::Surface(p) => Self::Surface(SurfaceParams { dir: anchor(&p.dir), ..p.clone() }),
            Self::CgalMesh(p) => Self::CgalMesh(CgalMeshParams { dir: anchor(&p.dir), ..p.clone() }),
            Self::Registration(p) => {
                Self::Registration(RegistrationParams { dir: anchor(&p.dir), ..p.clone() })
            }
            Self::Transformation(p) => {
                Self::Transformation(TransformationParams { dir: anchor(&p.dir), ..p.clone() })
            }
            Self::PointTransformation(p) => Self::PointTransformation(PointTransformationParams {
                dir: anchor(&p.dir),
                ..p.clone()
            }),
            Self::Apply(p) => Self::Apply(ApplyParams { dir: anchor(&p.dir), ..p.clone() }),
            Self::Translation(p) => {
                Self::Translation(TranslationParams { dir: anchor(&p.dir), ..p.clone() })
            }
            Self::Resampling(p) => {
                Self::Resampling(ResamplingParams { input: anchor(&p.input), ..p.clone() })
            }
            Self::Tracking(p) => Self::Tracking(TrackingParams { dir: anchor(&p.dir), ..p.clone() }),
            Self::Prediction(p) => Self::Prediction(PredictionParams { input: anchor(&p.input) }),
        }
    }
}

/// Time step between frames of the apply operation
pub fn frame_increment(smooth: u32) -> f64 {
    match smooth {
        2 => 5.0,
        5 => 2.0,
        _ => 10.0,
    }
}

fn surface(p: &SurfaceParams) -> PipelinePlan {
    let dir = &p.dir;
    let dilated = dir.join(DILATED);
    let closed = dir.join(CLOSED);
    let mesh = dir.join(SURFACE);

    PipelinePlan::new("surface", Toolkit::Mirtk, dir)
        .stage(
            StageTemplate::new(Tool::DilateImage, &dilated)
                .input(absolutize(&p.segmentation, dir))
                .output_arg()
                .option("-iterations", p.iterations)
                .verbose(),
        )
        .stage(
            StageTemplate::new(Tool::ErodeImage, &closed)
                .input(&dilated)
                .output_arg()
                .option("-iterations", p.iterations)
                .verbose(),
        )
        .stage(
            StageTemplate::new(Tool::ExtractSurface, &mesh)
                .input(&closed)
                .output_arg()
                .option("-isovalue", p.threshold)
                .option("-blur", p.blur)
                .flag("-ascii")
                .verbose(),
        )
        .stage(
            StageTemplate::new(Tool::SmoothSurface, &mesh)
                .input(&mesh)
                .output_arg()
                .option("-iterations", p.smooth)
                .verbose(),
        )
}

fn cgal_mesh(p: &CgalMeshParams) -> PipelinePlan {
    let dir = &p.dir;
    let out_dir = dir.join(CGAL_OUTPUT_DIR);
    let output = out_dir.join(format!("{}.vtk", p.file_name));

    let mut stage = StageTemplate::new(Tool::Meshtools3d, output)
        .input_option("-f", absolutize(&p.template, dir))
        .path_option("-seg_dir", dir)
        .option("-seg_name", CGAL_INPUT)
        .path_option("-out_dir", &out_dir)
        .option("-out_name", &p.file_name);
    stage.consumes.push(dir.join(CGAL_INPUT));

    // Windows reads TBB_NUM_THREADS from the system environment
    if !cfg!(windows) {
        stage = stage.local_env("TBB_NUM_THREADS", "12");
    }

    PipelinePlan::new("cgal-mesh", Toolkit::Meshtools3d, dir).stage(stage)
}

fn registration(p: &RegistrationParams) -> PipelinePlan {
    let dir = &p.dir;
    PipelinePlan::new("registration", Toolkit::Mirtk, dir).stage(
        StageTemplate::new(Tool::Register, absolutize(&p.dof_out, dir))
            .input(absolutize(&p.moving, dir))
            .input(absolutize(&p.fixed, dir))
            .output_option("-dofout")
            .option("-model", &p.model)
            .verbose(),
    )
}

fn transformation(p: &TransformationParams) -> PipelinePlan {
    let dir = &p.dir;
    PipelinePlan::new("transformation", Toolkit::Mirtk, dir).stage(
        StageTemplate::new(Tool::TransformImage, absolutize(&p.output, dir))
            .input(absolutize(&p.input, dir))
            .output_arg()
            .input_option("-dofin", absolutize(&p.dof, dir))
            .verbose(),
    )
}

fn point_transformation(p: &PointTransformationParams) -> PipelinePlan {
    let dir = &p.dir;
    PipelinePlan::new("point-transformation", Toolkit::Mirtk, dir).stage(
        StageTemplate::new(Tool::TransformPoints, absolutize(&p.output, dir))
            .input(absolutize(&p.input, dir))
            .output_arg()
            .input_option("-dofin", absolutize(&p.dof, dir))
            .flag("-ascii")
            .verbose(),
    )
}

fn apply(p: &ApplyParams) -> PipelinePlan {
    let dir = &p.dir;
    let mesh = absolutize(&p.mesh, dir);
    let dof = absolutize(&p.dof, dir);
    let increment = frame_increment(p.smooth);
    let iterations = p.frames.checked_mul(p.smooth).unwrap_or_else(|| {
        warn!("{} frames x smooth {} is out of range; nothing to apply", p.frames, p.smooth);
        0
    });

    let mut plan = PipelinePlan::new("apply", Toolkit::Mirtk, dir).validate(Validation::EveryStage);
    for i in 0..iterations {
        let time = p.initial_time + f64::from(i) * increment;
        plan = plan.stage(
            StageTemplate::new(Tool::TransformPoints, transformed_frame(dir, i))
                .input(&mesh)
                .output_arg()
                .input_option("-dofin", &dof)
                .flag("-ascii")
                .option("-St", time)
                .verbose(),
        );
    }
    plan
}

/// Path of the `index`th mesh written by apply
pub fn transformed_frame(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("{}{}.vtk", TRANSFORMED_PREFIX, index))
}

fn translation(p: &TranslationParams) -> PipelinePlan {
    let dir = &p.dir;
    let source = absolutize(&p.source, dir);
    let dof = dir.join(TRANSLATION_DOF);

    PipelinePlan::new("translation", Toolkit::Mirtk, dir)
        .stage(
            StageTemplate::new(Tool::InitDof, &dof)
                .output_arg()
                .flag("-translations")
                .flag("-norotations")
                .flag("-noscaling")
                .flag("-noshearing")
                .flag("-displacements")
                .input(&source)
                .input(absolutize(&p.target, dir))
                .verbose(),
        )
        .stage(
            StageTemplate::new(Tool::TransformPoints, absolutize(&p.output, dir))
                .input(&source)
                .output_arg()
                .input_option("-dofin", &dof)
                .flag("-ascii")
                .verbose(),
        )
}

fn resampling(p: &ResamplingParams) -> PipelinePlan {
    let dir = parent_dir(&p.input);
    PipelinePlan::new("resampling", Toolkit::Mirtk, &dir).stage(
        StageTemplate::new(Tool::ResampleImage, absolutize(&p.output, &dir))
            .input(&p.input)
            .output_arg()
            .option("-isotropic", p.isotropic)
            .option("-interp", "CSpline")
            .verbose(),
    )
}

fn tracking(p: &TrackingParams) -> PipelinePlan {
    let dir = &p.dir;
    let mut stage = StageTemplate::new(Tool::Register, dir.join(TRACKING_DOF))
        .input_option("-images", absolutize(&p.images, dir));
    if let Some(ref param) = p.parameters {
        stage = stage.input_option("-parin", absolutize(param, dir));
    }
    stage = stage.output_option("-dofout").verbose();

    PipelinePlan::new("tracking", Toolkit::Mirtk, dir).stage(stage)
}

fn prediction(p: &PredictionParams) -> PipelinePlan {
    let dir = parent_dir(&p.input);
    let staged = dir.join(PREDICTION_INPUT);
    let raw = dir.join(PREDICTION_RAW);

    let mut stage = StageTemplate::new(Tool::CemrgNet, &raw);
    stage.consumes.push(staged.clone());

    PipelinePlan::new("prediction", Toolkit::CemrgNet, &dir)
        .prepare(Prepare::CopyIfMissing {
            from: p.input.clone(),
            to: staged,
        })
        .stage(stage)
        .finalize(Finalize::Rename {
            from: raw,
            to: dir.join(PREDICTION_OUTPUT),
        })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
