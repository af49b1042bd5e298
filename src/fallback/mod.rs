// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Container-first execution with a local-binary fallback
//!
//! The container tier always goes first. If its artifact is missing the
//! whole pipeline is resolved again for the local install and run from the
//! start. There is no third attempt.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{Backend, BackendResolver};
use crate::operations::Operation;
use crate::pipeline::{ExecutionResult, FailureKind, PipelinePlan, PipelineSequencer};
use crate::sinks::NotificationSink;

/// Title of the warning raised when a toolkit cannot be found
pub const TOOLING_WARNING_TITLE: &str = "Please check the LOG";

/// Runs operations through the container tier, then the local tier
pub struct FallbackController {
    resolver: BackendResolver,
    sequencer: PipelineSequencer,
    notifier: Arc<dyn NotificationSink>,
}

impl FallbackController {
    pub fn new(
        resolver: BackendResolver,
        sequencer: PipelineSequencer,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            resolver,
            sequencer,
            notifier,
        }
    }

    /// Run `operation`, falling back to local binaries at most once
    pub async fn execute(&self, operation: &Operation) -> ExecutionResult {
        self.execute_plan(&operation.plan()).await
    }

    /// Run an already built plan through both tiers
    pub async fn execute_plan(&self, plan: &PipelinePlan) -> ExecutionResult {
        let toolkit = plan.toolkit;
        let container = self.resolver.containerized(toolkit, &plan.mount_root);

        let first = match container.ensure_available(toolkit) {
            Ok(()) => {
                info!("Attempting {} using {}", plan.operation, container);
                let result = self
                    .sequencer
                    .run(&self.resolver.resolve(plan, &container))
                    .await;
                if result.succeeded {
                    return result;
                }
                warn!(
                    "Container did not produce a good outcome. Trying with local {} libraries.",
                    toolkit
                );
                Some(result)
            }
            Err(e) => {
                warn!("Skipping the container tier: {}", e);
                None
            }
        };

        let earlier_log = first.as_ref().map(|r| r.log.clone()).unwrap_or_default();

        let local = match self.resolver.local(toolkit) {
            Some(local) => local,
            None => {
                warn!("{} has no local distribution", toolkit);
                return match first {
                    Some(result) => result,
                    None => self.tooling_missing(plan, None, String::new()),
                };
            }
        };

        if let Err(e) = local.ensure_available(toolkit) {
            warn!("{}", e);
            return self.tooling_missing(plan, Some(&local), earlier_log);
        }

        info!("Attempting {} using {}", plan.operation, local);
        self.sequencer
            .run(&self.resolver.resolve(plan, &local))
            .await
            .after(&earlier_log)
    }

    fn tooling_missing(
        &self,
        plan: &PipelinePlan,
        local: Option<&Backend>,
        log: String,
    ) -> ExecutionResult {
        let message = format!("{} libraries not found", plan.toolkit.label());
        if let Some(Backend::LocalBinary { install_dir }) = local {
            warn!(
                "{}. Please make sure the {} folder exists: {}",
                message,
                plan.toolkit.install_dir_name().unwrap_or_default(),
                install_dir.display()
            );
        }
        self.notifier.warn(TOOLING_WARNING_TITLE, &message);

        let mut result = ExecutionResult::failure(FailureKind::ToolingMissing, log);
        if let Some(backend) = local {
            result = result.with_backend(backend.label());
        }
        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backend::Tool;
    use crate::config::EngineConfig;
    use crate::operations::{RegistrationParams, SurfaceParams};
    use crate::process::ProcessSupervisor;
    use crate::sinks::{NullSink, RecordingNotifier, TickCounter};
    use crate::testing::{call_log, fake_install, write_script, FakeTool};
    use crate::validation::ExistenceValidator;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Fake container runtime: records the call, then behaves like the
    /// requested tool would inside the mount
    fn fake_docker(root: &Path, writes_dofout: bool) -> PathBuf {
        let path = root.join("docker");
        let action = if writes_dofout {
            "while [ $# -gt 0 ]; do\n  if [ \"$1\" = -dofout ]; then : > \"$2\"; fi\n  shift\ndone"
        } else {
            ""
        };
        let body = format!(
            "echo docker >> \"{calls}\"\n\
             for a in \"$@\"; do\n  case \"$a\" in --volume=*) vol=\"${{a#--volume=}}\"; vol=\"${{vol%:/data}}\";; esac\ndone\n\
             cd \"$vol\" || exit 1\n\
             {action}",
            calls = root.join("calls.log").display(),
            action = action,
        );
        write_script(&path, &body);
        path
    }

    fn controller(
        runtime: PathBuf,
        install: PathBuf,
        notifier: Arc<RecordingNotifier>,
        ticks: Arc<TickCounter>,
    ) -> FallbackController {
        let mut config = EngineConfig::default();
        config.container_runtime = runtime;
        config.install.mirtk = Some(install);
        let sequencer = PipelineSequencer::new(
            Arc::new(ProcessSupervisor::new(Arc::new(NullSink))),
            Arc::new(ExistenceValidator),
            ticks,
        );
        FallbackController::new(BackendResolver::new(Arc::new(config)), sequencer, notifier)
    }

    fn work_dir(temp: &TempDir) -> PathBuf {
        let work = temp.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        work
    }

    #[tokio::test]
    async fn test_local_tier_attempted_exactly_once() {
        let temp = TempDir::new().unwrap();
        let docker = fake_docker(temp.path(), false);
        let install = fake_install(temp.path(), &[Tool::Register], FakeTool::WritesNothing);
        let work = work_dir(&temp);
        let notifier = Arc::new(RecordingNotifier::default());

        let result = controller(docker, install, notifier.clone(), Arc::default())
            .execute(&Operation::Registration(RegistrationParams::rigid(&work, "LGE", "MRA")))
            .await;

        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(FailureKind::ValidationFailure));
        assert_eq!(call_log(temp.path()), vec!["docker", "register"]);
        assert!(notifier.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_no_tooling_runs_nothing() {
        let temp = TempDir::new().unwrap();
        let work = work_dir(&temp);
        let notifier = Arc::new(RecordingNotifier::default());
        let ticks = Arc::new(TickCounter::default());

        let result = controller(
            PathBuf::from("/nonexistent/docker"),
            temp.path().join("MLib"),
            notifier.clone(),
            ticks.clone(),
        )
        .execute(&Operation::Registration(RegistrationParams::rigid(&work, "LGE", "MRA")))
        .await;

        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(FailureKind::ToolingMissing));
        assert!(result.output().is_none());
        assert!(call_log(temp.path()).is_empty());
        assert_eq!(ticks.count(), 0);
        assert_eq!(
            notifier.warnings(),
            vec![("Please check the LOG".to_string(), "MIRTK libraries not found".to_string())]
        );
    }

    #[tokio::test]
    async fn test_container_success_skips_local() {
        let temp = TempDir::new().unwrap();
        let docker = fake_docker(temp.path(), true);
        let install = fake_install(temp.path(), &[Tool::Register], FakeTool::WritesDofout);
        let work = work_dir(&temp);

        let result = controller(docker, install, Arc::default(), Arc::default())
            .execute(&Operation::Registration(RegistrationParams::rigid(&work, "LGE", "MRA")))
            .await;

        assert!(result.succeeded);
        assert_eq!(result.output_path, Some(work.join("rigid.dof")));
        assert_eq!(result.backend.as_deref(), Some("container"));
        assert_eq!(call_log(temp.path()), vec!["docker"]);
    }

    #[tokio::test]
    async fn test_missing_runtime_goes_straight_to_local() {
        let temp = TempDir::new().unwrap();
        let install = fake_install(temp.path(), &[Tool::Register], FakeTool::WritesDofout);
        let work = work_dir(&temp);

        let result = controller(
            PathBuf::from("/nonexistent/docker"),
            install,
            Arc::default(),
            Arc::default(),
        )
        .execute(&Operation::Registration(RegistrationParams::rigid(&work, "LGE", "MRA")))
        .await;

        assert!(result.succeeded);
        assert_eq!(result.backend.as_deref(), Some("local"));
        assert_eq!(call_log(temp.path()), vec!["register"]);
    }

    #[tokio::test]
    async fn test_surface_reruns_whole_sequence_locally() {
        let temp = TempDir::new().unwrap();
        let docker = fake_docker(temp.path(), false);
        let install = fake_install(
            temp.path(),
            &[
                Tool::DilateImage,
                Tool::ErodeImage,
                Tool::ExtractSurface,
                Tool::SmoothSurface,
            ],
            FakeTool::WritesSecondArg,
        );
        let work = work_dir(&temp);
        std::fs::write(work.join("LA.nii"), b"seg").unwrap();
        let ticks = Arc::new(TickCounter::default());

        let result = controller(docker, install, Arc::default(), ticks.clone())
            .execute(&Operation::Surface(SurfaceParams {
                dir: work.clone(),
                segmentation: PathBuf::from("LA.nii"),
                iterations: 2,
                threshold: 0.5,
                blur: 0,
                smooth: 5,
            }))
            .await;

        assert!(result.succeeded);
        assert_eq!(result.output_path, Some(work.join("segmentation.vtk")));
        assert_eq!(
            call_log(temp.path()),
            vec![
                "docker",
                "docker",
                "docker",
                "docker",
                "dilate-image",
                "erode-image",
                "extract-surface",
                "smooth-surface"
            ]
        );
        assert_eq!(ticks.count(), 8);
        assert!(work.join("segmentation.vtk").exists());
        assert!(!work.join("segmentation.d.nii").exists());
        assert!(!work.join("segmentation.s.nii").exists());
        assert!(result.log.contains("docker Completed!"));
        assert!(result.log.contains("smooth-surface Completed!"));
    }
}
