// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! # medflow - medical-image tool orchestration
//!
//! `medflow` runs MIRTK, Meshtools3D and CemrgNet pipelines through a
//! container runtime and falls back to locally installed binaries when the
//! container does not produce the expected output.
//!
//! ## Features
//!
//! - **Named operations** - surface meshes, registration, transformations,
//!   motion tracking, resampling and CemrgNet segmentation
//! - **Two execution tiers** - containerized first, local binaries once
//! - **Supervised processes** - one at a time, output merged into one log
//! - **Remote reconstruction** - ssh/scp session with a GPU server
//!
//! ## Quick Start
//!
//! ```bash
//! # Surface mesh from a segmentation
//! medflow surf LA.nii
//!
//! # See what would run, for both backends
//! medflow plan register LGE.nii MRA.nii
//!
//! # Check which backends are available
//! medflow doctor
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fallback;
pub mod operations;
pub mod pipeline;
pub mod process;
pub mod remote;
pub mod sinks;
pub mod validation;

#[cfg(all(test, unix))]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{Engine, ToolingStatus};
pub use errors::{MedflowError, MedflowResult};
pub use operations::Operation;
pub use pipeline::{ExecutionResult, FailureKind};
pub use sinks::{Collaborators, LogSink, NotificationSink, ProgressSink};

// Re-export remote types
pub use remote::{ReconstructionRequest, RemoteSession, SessionState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
