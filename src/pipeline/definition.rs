// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Pipeline data structures
//!
//! A [`PipelinePlan`] is what an operation asks for, independent of where
//! it runs. The backend resolver turns it into a [`Pipeline`] of
//! [`StageSpec`]s with concrete command lines.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{Arg, Tool, Toolkit};
use crate::process::Invocation;

/// Mount point of the working directory inside the container
pub const CONTAINER_MOUNT: &str = "/data";

/// One tool invocation before a backend is chosen
#[derive(Debug, Clone, PartialEq)]
pub struct StageTemplate {
    /// Tool to run
    pub tool: Tool,
    /// Arguments in order
    pub args: Vec<Arg>,
    /// Artifact the stage is expected to produce
    pub output: PathBuf,
    /// Artifacts of earlier stages this stage reads
    pub consumes: Vec<PathBuf>,
    /// Environment only the local binary gets
    pub local_env: Vec<(String, String)>,
}

impl StageTemplate {
    pub fn new(tool: Tool, output: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            args: Vec::new(),
            output: output.into(),
            consumes: Vec::new(),
            local_env: Vec::new(),
        }
    }

    /// Positional path the stage reads
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.consumes.push(path.clone());
        self.args.push(Arg::Path(path));
        self
    }

    /// Positional path for the declared output
    pub fn output_arg(mut self) -> Self {
        self.args.push(Arg::Path(self.output.clone()));
        self
    }

    /// Positional path that is neither read from an earlier stage nor the
    /// declared output
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.args.push(Arg::Path(path.into()));
        self
    }

    /// A bare flag such as `-ascii`
    pub fn flag(mut self, flag: &str) -> Self {
        self.args.push(Arg::literal(flag));
        self
    }

    /// A flag followed by a literal value
    pub fn option(mut self, flag: &str, value: impl ToString) -> Self {
        self.args.push(Arg::literal(flag));
        self.args.push(Arg::literal(value));
        self
    }

    /// A flag followed by a path the stage reads
    pub fn input_option(mut self, flag: &str, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.args.push(Arg::literal(flag));
        self.consumes.push(path.clone());
        self.args.push(Arg::Path(path));
        self
    }

    /// A flag followed by a path
    pub fn path_option(mut self, flag: &str, path: impl Into<PathBuf>) -> Self {
        self.args.push(Arg::literal(flag));
        self.args.push(Arg::Path(path.into()));
        self
    }

    /// A flag followed by the declared output
    pub fn output_option(mut self, flag: &str) -> Self {
        self.args.push(Arg::literal(flag));
        self.args.push(Arg::Path(self.output.clone()));
        self
    }

    /// `-verbose 3`, which every MIRTK tool takes
    pub fn verbose(self) -> Self {
        self.option("-verbose", 3)
    }

    /// Environment variable for the local binary only
    pub fn local_env(mut self, key: &str, value: &str) -> Self {
        self.local_env.push((key.to_string(), value.to_string()));
        self
    }
}

/// How a pipeline's success is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Validation {
    /// Only the final declared artifact must exist
    FinalArtifact,
    /// Every stage's declared artifact must exist; nothing is intermediate
    EveryStage,
}

/// Input staging done before the first stage
#[derive(Debug, Clone, PartialEq)]
pub enum Prepare {
    /// Copy `from` to `to` unless `to` already exists
    CopyIfMissing { from: PathBuf, to: PathBuf },
}

/// Post-processing of the produced artifact
#[derive(Debug, Clone, PartialEq)]
pub enum Finalize {
    /// Rename the produced artifact; if the rename fails, the unrenamed
    /// artifact is accepted in its place
    Rename { from: PathBuf, to: PathBuf },
}

/// Backend-independent description of an operation's pipeline
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    /// Operation name, for logs
    pub operation: &'static str,
    /// Toolkit every stage belongs to
    pub toolkit: Toolkit,
    /// Directory bind-mounted into the container
    pub mount_root: PathBuf,
    /// Stages in execution order
    pub stages: Vec<StageTemplate>,
    /// Artifact reported on success
    pub final_output: PathBuf,
    pub validation: Validation,
    pub prepare: Option<Prepare>,
    pub finalize: Option<Finalize>,
}

impl PipelinePlan {
    /// A plan whose final artifact is the last stage's output
    pub fn new(operation: &'static str, toolkit: Toolkit, mount_root: impl Into<PathBuf>) -> Self {
        Self {
            operation,
            toolkit,
            mount_root: mount_root.into(),
            stages: Vec::new(),
            final_output: PathBuf::new(),
            validation: Validation::FinalArtifact,
            prepare: None,
            finalize: None,
        }
    }

    /// Append a stage; its output becomes the final artifact
    pub fn stage(mut self, stage: StageTemplate) -> Self {
        self.final_output = stage.output.clone();
        self.stages.push(stage);
        self
    }

    pub fn validate(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn prepare(mut self, prepare: Prepare) -> Self {
        self.prepare = Some(prepare);
        self
    }

    /// Rename the last stage's output; the rename target becomes the final
    /// artifact
    pub fn finalize(mut self, finalize: Finalize) -> Self {
        let Finalize::Rename { ref to, .. } = finalize;
        self.final_output = to.clone();
        self.finalize = Some(finalize);
        self
    }
}

/// How a stage's executable is reached
#[derive(Debug, Clone, PartialEq)]
pub enum Executable {
    /// `runtime run [--rm] --volume=<mount_root>:/data image [entrypoint]`
    Container {
        runtime: PathBuf,
        image: String,
        entrypoint: Option<String>,
        mount_root: PathBuf,
        remove: bool,
    },
    /// A binary inside an install directory
    Local { binary: PathBuf, install_dir: PathBuf },
}

/// One fully resolved stage. Built fresh for every run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub tool: Tool,
    pub executable: Executable,
    /// Tool arguments, paths already rendered for the backend
    pub args: Vec<String>,
    /// Absolute path of the artifact the stage must produce
    pub expected_output: PathBuf,
    /// Absolute paths of artifacts the stage reads
    pub consumes: Vec<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl StageSpec {
    /// Full command line for the process supervisor
    pub fn invocation(&self) -> Invocation {
        match &self.executable {
            Executable::Container {
                runtime,
                image,
                entrypoint,
                mount_root,
                remove,
            } => {
                let mut inv = Invocation::new(runtime).arg("run");
                if *remove {
                    inv = inv.arg("--rm");
                }
                inv = inv
                    .arg(format!("--volume={}:{}", mount_root.display(), CONTAINER_MOUNT))
                    .arg(image.clone());
                if let Some(entry) = entrypoint {
                    inv = inv.arg(entry.clone());
                }
                inv.args(self.args.iter().cloned()).current_dir(mount_root)
            }
            Executable::Local {
                binary,
                install_dir,
            } => {
                let mut inv = Invocation::new(binary)
                    .args(self.args.iter().cloned())
                    .current_dir(install_dir);
                for (k, v) in &self.env {
                    inv = inv.env(k.clone(), v.clone());
                }
                inv
            }
        }
    }
}

/// A resolved, runnable pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub operation: &'static str,
    /// Backend label, for logs and results
    pub backend: String,
    pub stages: Vec<StageSpec>,
    pub final_output: PathBuf,
    pub validation: Validation,
    pub prepare: Option<Prepare>,
    pub finalize: Option<Finalize>,
}

impl Pipeline {
    /// Stage outputs that are not the final artifact. A pipeline validated
    /// stage by stage has none.
    pub fn intermediates(&self) -> Vec<PathBuf> {
        if self.validation == Validation::EveryStage {
            return Vec::new();
        }

        let mut out: Vec<PathBuf> = Vec::new();
        for stage in &self.stages {
            let path = &stage.expected_output;
            if *path != self.final_output && !out.contains(path) {
                out.push(path.clone());
            }
        }
        if let Some(Finalize::Rename { ref from, .. }) = self.finalize {
            out.retain(|p| p != from);
        }
        out
    }

    /// Intermediates that exist after stage `index` and that no later stage
    /// reads
    pub fn superseded_after(&self, index: usize) -> Vec<PathBuf> {
        if self.stages.is_empty() {
            return Vec::new();
        }
        let produced = &self.stages[..=index.min(self.stages.len() - 1)];
        let later = self.stages.get(index.saturating_add(1)..).unwrap_or_default();

        self.intermediates()
            .into_iter()
            .filter(|p| produced.iter().any(|s| s.expected_output == *p))
            .filter(|p| !later.iter().any(|s| s.consumes.contains(p)))
            .collect()
    }
}

/// Why a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Required backend (container runtime or install directory) absent
    ToolingMissing,
    /// A process could not be launched
    StartFailure,
    /// Processes ran but the expected artifact is absent
    ValidationFailure,
    /// A remote call did not reach its success sentinel
    RemoteProtocol,
}

/// Outcome of one pipeline run, or of a whole fallback chain
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Whether the declared artifact(s) exist
    pub succeeded: bool,
    /// Final artifact, present only on success
    pub output_path: Option<PathBuf>,
    /// Captured process output
    pub log: String,
    /// Backend that produced the result
    pub backend: Option<String>,
    /// Stages whose process ran to exit
    pub stages_completed: usize,
    pub duration: Duration,
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(output: PathBuf, log: String) -> Self {
        Self {
            succeeded: true,
            output_path: Some(output),
            log,
            backend: None,
            stages_completed: 0,
            duration: Duration::ZERO,
            failure: None,
        }
    }

    /// Create a failed result
    pub fn failure(kind: FailureKind, log: String) -> Self {
        Self {
            succeeded: false,
            output_path: None,
            log,
            backend: None,
            stages_completed: 0,
            duration: Duration::ZERO,
            failure: Some(kind),
        }
    }

    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = Some(backend.to_string());
        self
    }

    pub fn with_stages(mut self, completed: usize, duration: Duration) -> Self {
        self.stages_completed = completed;
        self.duration = duration;
        self
    }

    /// Prepend the log of an earlier attempt
    pub fn after(mut self, earlier_log: &str) -> Self {
        if !earlier_log.is_empty() {
            self.log = format!("{}{}", earlier_log, self.log);
        }
        self
    }

    /// Final artifact, for callers that treat an empty path as failure
    pub fn output(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }
}
