// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Execution backends
//!
//! The same operation can run inside a container (paths relative to the
//! bind-mounted working directory) or through locally installed binaries
//! (absolute paths). [`BackendResolver`] turns a backend-independent
//! [`PipelinePlan`] into concrete [`StageSpec`]s for either one.

mod args;
mod tools;

pub use args::{absolutize, relative_path, render_args, Arg, PathForm};
pub use tools::{Tool, Toolkit};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::errors::{MedflowError, MedflowResult};
use crate::pipeline::{Executable, Pipeline, PipelinePlan, StageSpec, StageTemplate};
use crate::process::is_launchable;

/// Where a pipeline's stages run
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    /// `runtime run --volume=<mount_root>:/data <image> ...`
    Containerized {
        runtime: PathBuf,
        image: String,
        mount_root: PathBuf,
        remove: bool,
    },
    /// Binaries installed under `install_dir`
    LocalBinary { install_dir: PathBuf },
}

impl Backend {
    /// Short label for logs and results
    pub fn label(&self) -> &'static str {
        match self {
            Self::Containerized { .. } => "container",
            Self::LocalBinary { .. } => "local",
        }
    }

    /// Check that the backend could start a process at all
    pub fn ensure_available(&self, toolkit: Toolkit) -> MedflowResult<()> {
        match self {
            Self::Containerized { runtime, .. } => {
                if is_launchable(runtime) {
                    Ok(())
                } else {
                    Err(MedflowError::ContainerRuntimeNotFound {
                        runtime: runtime.clone(),
                    })
                }
            }
            Self::LocalBinary { install_dir } => {
                if install_dir.is_dir() {
                    Ok(())
                } else {
                    Err(MedflowError::ToolingNotInstalled {
                        toolkit: toolkit.label().to_string(),
                        location: install_dir.clone(),
                    })
                }
            }
        }
    }

    fn resolve_stage(&self, template: &StageTemplate) -> StageSpec {
        match self {
            Self::Containerized {
                runtime,
                image,
                mount_root,
                remove,
            } => StageSpec {
                tool: template.tool,
                executable: Executable::Container {
                    runtime: runtime.clone(),
                    image: image.clone(),
                    entrypoint: template.tool.container_entrypoint().map(String::from),
                    mount_root: mount_root.clone(),
                    remove: *remove,
                },
                args: render_args(&template.args, PathForm::RelativeTo(mount_root)),
                expected_output: template.output.clone(),
                consumes: template.consumes.clone(),
                env: Vec::new(),
            },
            Self::LocalBinary { install_dir } => StageSpec {
                tool: template.tool,
                executable: Executable::Local {
                    binary: install_dir.join(format!(
                        "{}{}",
                        template.tool.binary_name(),
                        std::env::consts::EXE_SUFFIX
                    )),
                    install_dir: install_dir.clone(),
                },
                args: render_args(&template.args, PathForm::Absolute),
                expected_output: template.output.clone(),
                consumes: template.consumes.clone(),
                env: template.local_env.clone(),
            },
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Containerized { image, .. } => write!(f, "container {}", image),
            Self::LocalBinary { install_dir } => write!(f, "local {}", install_dir.display()),
        }
    }
}

/// Builds backends from configuration and resolves plans against them
#[derive(Debug, Clone)]
pub struct BackendResolver {
    config: Arc<EngineConfig>,
}

impl BackendResolver {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Container backend for `toolkit`, mounting `mount_root`
    pub fn containerized(&self, toolkit: Toolkit, mount_root: &Path) -> Backend {
        Backend::Containerized {
            runtime: self.config.container_runtime.clone(),
            image: self.config.images.image(toolkit).to_string(),
            mount_root: mount_root.to_path_buf(),
            remove: toolkit.removes_container(),
        }
    }

    /// Local backend for `toolkit`, or `None` if the toolkit only ships as
    /// an image
    pub fn local(&self, toolkit: Toolkit) -> Option<Backend> {
        self.config
            .install
            .root(toolkit)
            .map(|install_dir| Backend::LocalBinary { install_dir })
    }

    /// Resolve every stage of `plan` for `backend`, keeping stage order
    pub fn resolve(&self, plan: &PipelinePlan, backend: &Backend) -> Pipeline {
        Pipeline {
            operation: plan.operation,
            backend: backend.label().to_string(),
            stages: plan.stages.iter().map(|t| backend.resolve_stage(t)).collect(),
            final_output: plan.final_output.clone(),
            validation: plan.validation,
            prepare: plan.prepare.clone(),
            finalize: plan.finalize.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageTemplate;

    fn resolver() -> BackendResolver {
        let mut config = EngineConfig::default();
        config.container_runtime = PathBuf::from("docker");
        config.install.mirtk = Some(PathBuf::from("/opt/MLib"));
        BackendResolver::new(Arc::new(config))
    }

    fn dilate_plan() -> PipelinePlan {
        PipelinePlan::new("surface", Toolkit::Mirtk, "/w").stage(
            StageTemplate::new(Tool::DilateImage, "/w/segmentation.d.nii")
                .input("/w/seg.nii")
                .output_arg()
                .option("-iterations", 2)
                .verbose(),
        )
    }

    #[test]
    fn test_container_paths_relative_to_mount() {
        let r = resolver();
        let backend = r.containerized(Toolkit::Mirtk, Path::new("/w"));
        let pipeline = r.resolve(&dilate_plan(), &backend);

        assert_eq!(
            pipeline.stages[0].invocation().to_string(),
            "docker run --volume=/w:/data biomedia/mirtk:v1.1.0 dilate-image \
             seg.nii segmentation.d.nii -iterations 2 -verbose 3"
        );
    }

    #[test]
    fn test_local_paths_absolute_from_install_root() {
        let r = resolver();
        let backend = r.local(Toolkit::Mirtk).unwrap();
        let pipeline = r.resolve(&dilate_plan(), &backend);
        let inv = pipeline.stages[0].invocation();

        assert_eq!(inv.program, PathBuf::from("/opt/MLib").join(format!(
            "dilate-image{}",
            std::env::consts::EXE_SUFFIX
        )));
        assert_eq!(
            inv.args,
            vec!["/w/seg.nii", "/w/segmentation.d.nii", "-iterations", "2", "-verbose", "3"]
        );
        assert_eq!(inv.working_dir, Some(PathBuf::from("/opt/MLib")));
    }

    #[test]
    fn test_cemrgnet_has_no_local_backend() {
        assert!(resolver().local(Toolkit::CemrgNet).is_none());
    }

    #[test]
    fn test_missing_install_dir_is_tooling_error() {
        let backend = Backend::LocalBinary {
            install_dir: PathBuf::from("/nonexistent/MLib"),
        };
        let err = backend.ensure_available(Toolkit::Mirtk).unwrap_err();
        assert!(matches!(err, MedflowError::ToolingNotInstalled { .. }));
    }

    #[test]
    fn test_missing_runtime_is_unavailable() {
        let backend = Backend::Containerized {
            runtime: PathBuf::from("/nonexistent/docker"),
            image: "img".into(),
            mount_root: PathBuf::from("/w"),
            remove: false,
        };
        assert!(backend.ensure_available(Toolkit::Mirtk).is_err());
    }
}
