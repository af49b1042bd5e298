// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Pipeline sequencer
//!
//! Runs a pipeline's stages strictly one after another. Every stage runs
//! regardless of whether earlier artifacts look right; only the final
//! verdict depends on validation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{ExecutionResult, FailureKind, Finalize, Pipeline, Prepare, Validation};
use crate::process::ProcessSupervisor;
use crate::sinks::ProgressSink;
use crate::validation::OutputValidator;

/// Runs resolved pipelines through a process supervisor
pub struct PipelineSequencer {
    supervisor: Arc<ProcessSupervisor>,
    validator: Arc<dyn OutputValidator>,
    progress: Arc<dyn ProgressSink>,
}

impl PipelineSequencer {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        validator: Arc<dyn OutputValidator>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            supervisor,
            validator,
            progress,
        }
    }

    /// Run every stage in order and validate the result
    pub async fn run(&self, pipeline: &Pipeline) -> ExecutionResult {
        let start = Instant::now();
        let mut log = String::new();

        if pipeline.stages.is_empty() {
            warn!("{} has no stages to run", pipeline.operation);
            return ExecutionResult::failure(FailureKind::ValidationFailure, log)
                .with_backend(&pipeline.backend);
        }

        if let Some(ref prepare) = pipeline.prepare {
            if let Err(e) = apply_prepare(prepare).await {
                warn!("Could not stage input for {}: {}", pipeline.operation, e);
                return ExecutionResult::failure(FailureKind::StartFailure, log)
                    .with_backend(&pipeline.backend)
                    .with_stages(0, start.elapsed());
            }
        }

        let mut completed = 0;
        let mut every_stage_ok = true;
        let mut removed: HashSet<PathBuf> = HashSet::new();

        for (index, stage) in pipeline.stages.iter().enumerate() {
            let invocation = stage.invocation();
            info!(
                "[{}/{}] {} ({})",
                index + 1,
                pipeline.stages.len(),
                stage.tool,
                pipeline.backend
            );
            debug!("{}", invocation);

            match self.supervisor.run(&invocation).await {
                Ok(outcome) => {
                    log.push_str(&outcome.log);
                    if outcome.timed_out {
                        warn!("{} was stopped by the stage timeout", stage.tool);
                    }
                }
                Err(e) => {
                    warn!("Aborting {} at stage {}: {}", pipeline.operation, stage.tool, e);
                    log.push_str(&format!("{}\n", e));
                    return ExecutionResult::failure(FailureKind::StartFailure, log)
                        .with_backend(&pipeline.backend)
                        .with_stages(completed, start.elapsed());
                }
            }

            completed += 1;
            self.progress.tick();

            if pipeline.validation == Validation::EveryStage
                && !self.validator.exists(&stage.expected_output).await
            {
                every_stage_ok = false;
            }

            for path in pipeline.superseded_after(index) {
                if removed.insert(path.clone()) {
                    remove_artifact(&path).await;
                }
            }
        }

        let output = match pipeline.finalize {
            Some(ref finalize) => apply_finalize(finalize).await,
            None => pipeline.final_output.clone(),
        };

        let succeeded = match pipeline.validation {
            Validation::FinalArtifact => self.validator.exists(&output).await,
            Validation::EveryStage => every_stage_ok,
        };

        let result = if succeeded {
            ExecutionResult::success(output, log)
        } else {
            ExecutionResult::failure(FailureKind::ValidationFailure, log)
        };

        result
            .with_backend(&pipeline.backend)
            .with_stages(completed, start.elapsed())
    }
}

async fn apply_prepare(prepare: &Prepare) -> std::io::Result<()> {
    match prepare {
        Prepare::CopyIfMissing { from, to } => {
            if tokio::fs::try_exists(to).await.unwrap_or(false) {
                debug!("{} already exists", to.display());
                return Ok(());
            }
            info!("Copying {} to {}", from.display(), to.display());
            tokio::fs::copy(from, to).await.map(|_| ())
        }
    }
}

/// Returns the artifact to validate
async fn apply_finalize(finalize: &Finalize) -> PathBuf {
    match finalize {
        Finalize::Rename { from, to } => match tokio::fs::rename(from, to).await {
            Ok(()) => to.clone(),
            Err(e) => {
                debug!("Could not rename {} to {}: {}", from.display(), to.display(), e);
                from.clone()
            }
        },
    }
}

async fn remove_artifact(path: &PathBuf) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed intermediate {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}
