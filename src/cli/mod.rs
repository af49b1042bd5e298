// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for medflow.

pub mod doctor;
pub mod operation;
pub mod plan;
pub mod remote;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::backend::absolutize;
use crate::config::EngineConfig;
use crate::operations::{
    ApplyParams, CgalMeshParams, Operation, PointTransformationParams, PredictionParams,
    RegistrationParams, ResamplingParams, SurfaceParams, TrackingParams, TransformationParams,
    TranslationParams, TRACKING_DOF,
};

/// Medical-image tool orchestrator
///
/// Runs MIRTK, Meshtools3D and CemrgNet through a container runtime,
/// falling back to locally installed binaries.
#[derive(Parser, Debug)]
#[clap(
    name = "medflow",
    version,
    about = "Run containerized or local medical-image processing pipelines",
    long_about = None,
    after_help = "Examples:\n\
        medflow surf LA.nii                   Surface mesh from a segmentation\n\
        medflow register LGE.nii MRA.nii      Rigid registration into rigid.dof\n\
        medflow plan surf LA.nii              Show the command lines without running\n\
        medflow doctor                        Check which backends are available\n\n\
        See 'medflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Configuration file (defaults to .medflow.yaml, then the user config)
    #[clap(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[clap(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[clap(flatten)]
    Operation(OperationCommand),

    /// Print the command lines each backend would run
    Plan {
        #[clap(subcommand)]
        operation: OperationCommand,
    },

    /// Report which container and local backends are available
    Doctor,

    /// Transfer files to a reconstruction server and run it there
    Remote {
        /// Login name on the server
        #[clap(short, long)]
        user: String,

        /// Server host name
        #[clap(long)]
        host: String,

        #[clap(subcommand)]
        action: RemoteAction,
    },
}

/// One engine operation and its parameters
#[derive(Subcommand, Debug, Clone)]
pub enum OperationCommand {
    /// Surface mesh from a segmentation (dilate, erode, extract, smooth)
    Surf {
        /// Segmentation image
        segmentation: PathBuf,

        /// Working directory
        #[clap(short, long, default_value = ".")]
        dir: PathBuf,

        /// Dilation and erosion iterations
        #[clap(long, default_value = "1")]
        iterations: i32,

        /// Isovalue for surface extraction
        #[clap(long, default_value = "0.5")]
        threshold: f32,

        /// Blurring applied before extraction
        #[clap(long, default_value = "0")]
        blur: i32,

        /// Smoothing iterations
        #[clap(long, default_value = "10")]
        smooth: i32,
    },

    /// Tetrahedral mesh from converted.inr
    CgalMesh {
        /// Output name, without extension
        name: String,

        /// Meshtools3D parameter file
        #[clap(short, long)]
        template: PathBuf,

        #[clap(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Register a moving image onto a fixed one
    Register {
        fixed: PathBuf,
        moving: PathBuf,

        #[clap(short, long, default_value = ".")]
        dir: PathBuf,

        /// Transformation written by the registration
        #[clap(long, default_value = "rigid.dof")]
        dof_out: PathBuf,

        /// Transformation model
        #[clap(long, default_value = "Rigid")]
        model: String,
    },

    /// Apply a transformation to an image
    Transform {
        input: PathBuf,
        output: PathBuf,

        #[clap(short, long, default_value = ".")]
        dir: PathBuf,

        #[clap(long, default_value = "rigid.dof")]
        dof: PathBuf,
    },

    /// Apply a transformation to the points of a mesh
    TransformPoints {
        input: PathBuf,
        output: PathBuf,

        #[clap(short, long, default_value = ".")]
        dir: PathBuf,

        #[clap(long, default_value = "rigid.dof")]
        dof: PathBuf,
    },

    /// Transform a mesh once per time frame
    Apply {
        mesh: PathBuf,

        /// Number of frames
        #[clap(long)]
        frames: u32,

        /// Temporal smoothing factor (1, 2 or 5)
        #[clap(long, default_value = "1")]
        smooth: u32,

        /// Time of the first frame
        #[clap(long, default_value = "0")]
        initial_time: f64,

        #[clap(long, default_value = TRACKING_DOF)]
        dof: PathBuf,

        #[clap(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Rigidly translate one mesh onto another
    Translate {
        source: PathBuf,
        target: PathBuf,
        output: PathBuf,

        #[clap(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Isotropic resampling of an image
    Resample {
        input: PathBuf,
        output: PathBuf,

        /// Voxel size
        #[clap(long, default_value = "1")]
        isotropic: f64,
    },

    /// Motion tracking over an image sequence
    Track {
        /// File listing the time-frame images
        images: PathBuf,

        /// Registration parameter file
        #[clap(long)]
        parameters: Option<PathBuf>,

        #[clap(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Segment the left atrium with CemrgNet
    Predict {
        /// MRA image
        input: PathBuf,
    },
}

impl OperationCommand {
    /// Build the operation, resolving relative paths against `cwd`
    pub fn into_operation(self, cwd: &Path) -> Operation {
        match self {
            Self::Surf {
                segmentation,
                dir,
                iterations,
                threshold,
                blur,
                smooth,
            } => Operation::Surface(SurfaceParams {
                dir: resolve(&dir, cwd),
                segmentation,
                iterations,
                threshold,
                blur,
                smooth,
            }),
            Self::CgalMesh {
                name,
                template,
                dir,
            } => Operation::CgalMesh(CgalMeshParams {
                dir: resolve(&dir, cwd),
                file_name: name,
                template: resolve(&template, cwd),
            }),
            Self::Register {
                fixed,
                moving,
                dir,
                dof_out,
                model,
            } => Operation::Registration(RegistrationParams {
                dir: resolve(&dir, cwd),
                fixed,
                moving,
                dof_out,
                model,
            }),
            Self::Transform {
                input,
                output,
                dir,
                dof,
            } => Operation::Transformation(TransformationParams {
                dir: resolve(&dir, cwd),
                input,
                output,
                dof,
            }),
            Self::TransformPoints {
                input,
                output,
                dir,
                dof,
            } => Operation::PointTransformation(PointTransformationParams {
                dir: resolve(&dir, cwd),
                input,
                output,
                dof,
            }),
            Self::Apply {
                mesh,
                frames,
                smooth,
                initial_time,
                dof,
                dir,
            } => Operation::Apply(ApplyParams {
                dir: resolve(&dir, cwd),
                mesh,
                initial_time,
                dof,
                frames,
                smooth,
            }),
            Self::Translate {
                source,
                target,
                output,
                dir,
            } => Operation::Translation(TranslationParams {
                dir: resolve(&dir, cwd),
                source,
                target,
                output,
            }),
            Self::Resample {
                input,
                output,
                isotropic,
            } => Operation::Resampling(ResamplingParams {
                input: resolve(&input, cwd),
                output: resolve(&output, cwd),
                isotropic,
            }),
            Self::Track {
                images,
                parameters,
                dir,
            } => Operation::Tracking(TrackingParams {
                dir: resolve(&dir, cwd),
                images,
                parameters,
            }),
            Self::Predict { input } => Operation::Prediction(PredictionParams {
                input: resolve(&input, cwd),
            }),
        }
    }
}

/// Absolute form of `path`, without `.` components
pub(crate) fn resolve(path: &Path, cwd: &Path) -> PathBuf {
    absolutize(path, cwd).components().collect()
}

/// Remote server actions. Each one connects first and disconnects after.
#[derive(Subcommand, Debug, Clone)]
pub enum RemoteAction {
    /// Copy a local folder or file to the server
    Upload {
        /// Name of the folder or file inside --dir
        name: String,

        #[clap(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Copy a folder or file from the server
    Download {
        /// Name under the remote root
        name: String,

        /// Local destination folder
        #[clap(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Upload the Transfer folder, reconstruct, and download the result
    Reconstruct {
        /// Image the other stacks are reconstructed onto
        #[clap(short, long)]
        target: String,

        /// Output file name
        #[clap(short, long, default_value = "recon.nii")]
        output: String,

        /// Folder holding Transfer/
        #[clap(short, long, default_value = ".")]
        dir: PathBuf,

        /// Images inside Transfer/ to reconstruct from
        #[clap(long, default_value = "*.nii.gz")]
        pattern: String,

        #[clap(long, default_value = "0.75")]
        resolution: f64,

        #[clap(long, default_value = "150")]
        delta: f64,

        /// Packages per stack
        #[clap(long, default_value = "4")]
        package: i32,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Configuration for a command run from `cwd`
pub(crate) fn load_config(explicit: Option<&Path>, cwd: &Path) -> miette::Result<EngineConfig> {
    EngineConfig::load(explicit, cwd).map_err(miette::Report::new)
}

pub(crate) fn current_dir() -> miette::Result<PathBuf> {
    std::env::current_dir().map_err(|e| miette::miette!("Failed to get current directory: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_relative_paths_follow_working_directory() {
        let cli = Cli::parse_from(["medflow", "register", "LGE.nii", "MRA.nii", "-d", "case1"]);
        let Commands::Operation(cmd) = cli.command else {
            panic!("expected an operation");
        };
        match cmd.into_operation(Path::new("/data/study")) {
            Operation::Registration(p) => {
                assert_eq!(p.dir, PathBuf::from("/data/study/case1"));
                assert_eq!(p.fixed, PathBuf::from("LGE.nii"));
                assert_eq!(p.dof_out, PathBuf::from("rigid.dof"));
                assert_eq!(p.model, "Rigid");
            }
            other => panic!("unexpected operation {}", other.name()),
        }
    }

    #[test]
    fn test_default_dir_is_the_working_directory() {
        assert_eq!(
            resolve(Path::new("."), Path::new("/data/study")),
            PathBuf::from("/data/study")
        );
    }

    #[test]
    fn test_plan_wraps_an_operation() {
        let cli = Cli::parse_from(["medflow", "plan", "predict", "/scans/MRA.nii", "-f", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Plan {
                operation: OperationCommand::Predict { .. }
            }
        ));
    }
}
