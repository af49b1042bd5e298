// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Engine facade
//!
//! An [`Engine`] owns the single process supervisor and hands out one
//! entry point per operation. Entry points that produce an artifact return
//! `None` on failure; the others return whether the operation succeeded.
//! Every failure has already been logged and, where the user can act on it,
//! raised through the notification sink.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::backend::{Backend, BackendResolver, Toolkit};
use crate::config::EngineConfig;
use crate::fallback::FallbackController;
use crate::operations::{
    ApplyParams, CgalMeshParams, Operation, PointTransformationParams, PredictionParams,
    RegistrationParams, ResamplingParams, SurfaceParams, TrackingParams, TransformationParams,
    TranslationParams,
};
use crate::pipeline::{ExecutionResult, Pipeline, PipelineSequencer};
use crate::process::{LogBuffer, ProcessSupervisor};
use crate::remote::RemoteSession;
use crate::sinks::Collaborators;
use crate::validation::{ExistenceValidator, OutputValidator};

/// Orchestrates external tools for one embedding application
pub struct Engine {
    config: Arc<EngineConfig>,
    collaborators: Collaborators,
    supervisor: Arc<ProcessSupervisor>,
    validator: Arc<dyn OutputValidator>,
}

impl Engine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let supervisor = ProcessSupervisor::new(collaborators.log.clone())
            .with_timeout(config.stage_timeout());
        Self {
            config: Arc::new(config),
            collaborators,
            supervisor: Arc::new(supervisor),
            validator: Arc::new(ExistenceValidator),
        }
    }

    /// Replace the existence check used to judge stage outputs
    pub fn with_validator(mut self, validator: Arc<dyn OutputValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Merged output of every process this engine has run
    pub fn log(&self) -> &LogBuffer {
        self.supervisor.log()
    }

    fn resolver(&self) -> BackendResolver {
        BackendResolver::new(self.config.clone())
    }

    fn controller(&self) -> FallbackController {
        let sequencer = PipelineSequencer::new(
            self.supervisor.clone(),
            self.validator.clone(),
            self.collaborators.progress.clone(),
        );
        FallbackController::new(self.resolver(), sequencer, self.collaborators.notifier.clone())
    }

    /// Run any operation and get the full result
    pub async fn execute(&self, operation: &Operation) -> ExecutionResult {
        self.controller().execute(operation).await
    }

    /// Resolved pipelines for both tiers, without running anything. The
    /// local pipeline is absent for toolkits without a local distribution.
    pub fn plan(&self, operation: &Operation) -> (Pipeline, Option<Pipeline>) {
        let resolver = self.resolver();
        let plan = operation.plan();
        let container = resolver.resolve(
            &plan,
            &resolver.containerized(plan.toolkit, &plan.mount_root),
        );
        let local = resolver
            .local(plan.toolkit)
            .map(|backend| resolver.resolve(&plan, &backend));
        (container, local)
    }

    /// Surface mesh from a segmentation
    pub async fn surface(&self, params: SurfaceParams) -> Option<PathBuf> {
        self.execute(&Operation::Surface(params)).await.output_path
    }

    /// CGAL tetrahedral mesh
    pub async fn cgal_mesh(&self, params: CgalMeshParams) -> Option<PathBuf> {
        self.execute(&Operation::CgalMesh(params)).await.output_path
    }

    pub async fn register(&self, params: RegistrationParams) -> bool {
        self.execute(&Operation::Registration(params)).await.succeeded
    }

    pub async fn transform(&self, params: TransformationParams) -> bool {
        self.execute(&Operation::Transformation(params)).await.succeeded
    }

    pub async fn transform_points(&self, params: PointTransformationParams) -> bool {
        self.execute(&Operation::PointTransformation(params)).await.succeeded
    }

    /// Per-frame point transformation; true only if every frame was written
    pub async fn apply(&self, params: ApplyParams) -> bool {
        self.execute(&Operation::Apply(params)).await.succeeded
    }

    pub async fn translate(&self, params: TranslationParams) -> bool {
        self.execute(&Operation::Translation(params)).await.succeeded
    }

    pub async fn resample(&self, params: ResamplingParams) -> bool {
        self.execute(&Operation::Resampling(params)).await.succeeded
    }

    pub async fn track(&self, params: TrackingParams) -> bool {
        self.execute(&Operation::Tracking(params)).await.succeeded
    }

    /// CemrgNet segmentation
    pub async fn predict(&self, params: PredictionParams) -> Option<PathBuf> {
        self.execute(&Operation::Prediction(params)).await.output_path
    }

    /// A new, disconnected session with a reconstruction server
    pub fn remote_session(&self, user: &str, host: &str) -> RemoteSession {
        RemoteSession::new(
            user,
            host,
            self.config.remote.clone(),
            self.collaborators.log.clone(),
        )
    }

    /// Which backends could run right now, per toolkit
    pub fn tooling_status(&self, mount_root: &Path) -> Vec<ToolingStatus> {
        let resolver = self.resolver();
        [Toolkit::Mirtk, Toolkit::Meshtools3d, Toolkit::CemrgNet]
            .into_iter()
            .map(|toolkit| {
                let container = resolver.containerized(toolkit, mount_root);
                let local = resolver.local(toolkit);
                let install_dir = match local {
                    Some(Backend::LocalBinary { ref install_dir }) => Some(install_dir.clone()),
                    _ => None,
                };
                ToolingStatus {
                    toolkit,
                    image: self.config.images.image(toolkit).to_string(),
                    runtime: self.config.container_runtime.clone(),
                    runtime_found: container.ensure_available(toolkit).is_ok(),
                    install_found: local
                        .as_ref()
                        .is_some_and(|b| b.ensure_available(toolkit).is_ok()),
                    install_dir,
                }
            })
            .collect()
    }
}

/// Availability of one toolkit's backends
#[derive(Debug, Clone, Serialize)]
pub struct ToolingStatus {
    pub toolkit: Toolkit,
    pub image: String,
    pub runtime: PathBuf,
    pub runtime_found: bool,
    pub install_dir: Option<PathBuf>,
    pub install_found: bool,
}

impl ToolingStatus {
    /// At least one tier could start
    pub fn usable(&self) -> bool {
        self.runtime_found || self.install_found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{NullSink, RecordingNotifier, TickCounter};
    use tempfile::TempDir;

    fn offline_config(install: PathBuf) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.container_runtime = PathBuf::from("/nonexistent/docker");
        config.install.mirtk = Some(install);
        config
    }

    #[test]
    fn test_engines_are_independent() {
        let a = Engine::new(EngineConfig::default(), Collaborators::silent());
        let b = Engine::new(EngineConfig::default(), Collaborators::silent());
        a.log().append("only in a");
        assert!(b.log().is_empty());
    }

    #[test]
    fn test_plan_resolves_both_tiers() {
        let temp = TempDir::new().unwrap();
        let engine = Engine::new(
            offline_config(temp.path().join("MLib")),
            Collaborators::silent(),
        );
        let op = Operation::Registration(RegistrationParams::rigid(temp.path(), "LGE", "MRA"));

        let (container, local) = engine.plan(&op);
        assert_eq!(container.backend, "container");
        assert_eq!(container.stages[0].args[0], "MRA.nii");
        let local = local.unwrap();
        assert_eq!(local.backend, "local");
        assert_eq!(local.stages[0].args[0], temp.path().join("MRA.nii").to_string_lossy());
    }

    #[test]
    fn test_prediction_plan_has_no_local_tier() {
        let engine = Engine::new(EngineConfig::default(), Collaborators::silent());
        let (_, local) = engine.plan(&Operation::Prediction(PredictionParams {
            input: PathBuf::from("/scans/MRA.nii"),
        }));
        assert!(local.is_none());
    }

    #[tokio::test]
    async fn test_artifact_entry_point_returns_none_without_tooling() {
        let temp = TempDir::new().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = Engine::new(
            offline_config(temp.path().join("MLib")),
            Collaborators::new(
                Arc::new(NullSink),
                Arc::new(TickCounter::default()),
                notifier.clone(),
            ),
        );

        let out = engine
            .surface(SurfaceParams {
                dir: temp.path().to_path_buf(),
                segmentation: PathBuf::from("LA.nii"),
                iterations: 1,
                threshold: 0.5,
                blur: 0,
                smooth: 10,
            })
            .await;

        assert!(out.is_none());
        assert_eq!(notifier.warnings().len(), 1);
    }

    #[test]
    fn test_tooling_status_reports_missing_runtime() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("MLib")).unwrap();
        let engine = Engine::new(
            offline_config(temp.path().join("MLib")),
            Collaborators::silent(),
        );

        let status = engine.tooling_status(temp.path());
        let mirtk = status.iter().find(|s| s.toolkit == Toolkit::Mirtk).unwrap();
        assert!(!mirtk.runtime_found);
        assert!(mirtk.install_found);
        assert!(mirtk.usable());

        let cemrgnet = status.iter().find(|s| s.toolkit == Toolkit::CemrgNet).unwrap();
        assert!(cemrgnet.install_dir.is_none());
        assert!(!cemrgnet.usable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_register_through_local_tier() {
        use crate::backend::Tool;
        use crate::testing::{fake_install, FakeTool};

        let temp = TempDir::new().unwrap();
        let install = fake_install(temp.path(), &[Tool::Register], FakeTool::WritesDofout);
        let ticks = Arc::new(TickCounter::default());
        let engine = Engine::new(
            offline_config(install),
            Collaborators::new(Arc::new(NullSink), ticks.clone(), Arc::new(NullSink)),
        );

        assert!(engine.register(RegistrationParams::rigid(temp.path(), "LGE", "MRA")).await);
        assert!(temp.path().join("rigid.dof").exists());
        assert_eq!(ticks.count(), 1);
        assert!(engine.log().snapshot().contains("register Completed!"));
    }

    #[cfg(unix)]
    fn apply_params(dir: &Path) -> ApplyParams {
        ApplyParams {
            dir: dir.to_path_buf(),
            mesh: PathBuf::from("segmentation.vtk"),
            initial_time: 0.0,
            dof: PathBuf::from("tsffd.dof"),
            frames: 3,
            smooth: 2,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_fails_when_one_frame_is_missing() {
        use crate::testing::{call_log, write_script};

        let temp = TempDir::new().unwrap();
        let install = temp.path().join("MLib");
        std::fs::create_dir_all(&install).unwrap();
        write_script(
            &install.join("transform-points"),
            &format!(
                "echo transform-points >> \"{}\"\ncase \"$2\" in\n  */transformed-3.vtk) ;;\n  *) : > \"$2\" ;;\nesac",
                temp.path().join("calls.log").display()
            ),
        );
        let ticks = Arc::new(TickCounter::default());
        let engine = Engine::new(
            offline_config(install),
            Collaborators::new(Arc::new(NullSink), ticks.clone(), Arc::new(NullSink)),
        );

        assert!(!engine.apply(apply_params(temp.path())).await);
        assert_eq!(ticks.count(), 6);
        assert_eq!(call_log(temp.path()).len(), 6);
        assert!(!temp.path().join("transformed-3.vtk").exists());
        assert!(temp.path().join("transformed-5.vtk").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_keeps_every_frame() {
        use crate::backend::Tool;
        use crate::testing::{fake_install, FakeTool};

        let temp = TempDir::new().unwrap();
        let install = fake_install(temp.path(), &[Tool::TransformPoints], FakeTool::WritesSecondArg);
        let engine = Engine::new(offline_config(install), Collaborators::silent());

        assert!(engine.apply(apply_params(temp.path())).await);
        for i in 0..6 {
            assert!(temp.path().join(format!("transformed-{}.vtk", i)).exists());
        }
    }
}
