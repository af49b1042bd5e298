// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Engine configuration
//!
//! Loaded from `.medflow.yaml`. Every field has a default, so an absent
//! file or a partial one is fine.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::backend::Toolkit;
use crate::errors::{MedflowError, MedflowResult};

/// Name of the per-project configuration file
pub const CONFIG_FILE: &str = ".medflow.yaml";

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Container runtime executable
    pub container_runtime: PathBuf,

    /// Container images per toolkit
    pub images: ImageConfig,

    /// Local install roots per toolkit
    pub install: InstallConfig,

    /// Kill stages running longer than this. Unset waits forever.
    pub stage_timeout_secs: Option<u64>,

    /// Remote server settings
    pub remote: RemoteConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            container_runtime: default_container_runtime(),
            images: ImageConfig::default(),
            install: InstallConfig::default(),
            stage_timeout_secs: None,
            remote: RemoteConfig::default(),
        }
    }
}

fn default_container_runtime() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/usr/local/bin/docker")
    } else {
        PathBuf::from("docker")
    }
}

impl EngineConfig {
    /// Load configuration, looking in order at `explicit`, `.medflow.yaml`
    /// under `working_dir`, then the user configuration directory
    pub fn load(explicit: Option<&Path>, working_dir: &Path) -> MedflowResult<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(MedflowError::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            return Self::from_file(path);
        }

        let local = working_dir.join(CONFIG_FILE);
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(user) = user_config_path() {
            if user.exists() {
                return Self::from_file(&user);
            }
        }

        debug!("No configuration file found; using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> MedflowResult<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| MedflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> MedflowResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> MedflowResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Stage timeout policy
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

/// `config.yaml` in the platform configuration directory
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "medflow", "medflow").map(|dirs| dirs.config_dir().join("config.yaml"))
}

/// Container image names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub mirtk: String,
    pub meshtools3d: String,
    pub cemrgnet: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            mirtk: Toolkit::Mirtk.default_image().into(),
            meshtools3d: Toolkit::Meshtools3d.default_image().into(),
            cemrgnet: Toolkit::CemrgNet.default_image().into(),
        }
    }
}

impl ImageConfig {
    pub fn image(&self, toolkit: Toolkit) -> &str {
        match toolkit {
            Toolkit::Mirtk => &self.mirtk,
            Toolkit::Meshtools3d => &self.meshtools3d,
            Toolkit::CemrgNet => &self.cemrgnet,
        }
    }
}

/// Local install roots. Unset roots fall back to the platform default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub mirtk: Option<PathBuf>,
    pub meshtools3d: Option<PathBuf>,
}

impl InstallConfig {
    /// Install root for `toolkit`, or `None` if it has no local distribution
    pub fn root(&self, toolkit: Toolkit) -> Option<PathBuf> {
        let configured = match toolkit {
            Toolkit::Mirtk => self.mirtk.clone(),
            Toolkit::Meshtools3d => self.meshtools3d.clone(),
            Toolkit::CemrgNet => None,
        };
        configured.or_else(|| default_install_root(toolkit))
    }
}

/// Platform default install root: an application bundle folder on macOS,
/// next to the running executable elsewhere
pub fn default_install_root(toolkit: Toolkit) -> Option<PathBuf> {
    let dir = toolkit.install_dir_name()?;

    if cfg!(target_os = "macos") {
        return Some(Path::new("/Applications").join("CemrgApp").join(dir));
    }

    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(dir))
}

/// Remote server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Remote shell program
    pub ssh: PathBuf,
    /// File copy program
    pub scp: PathBuf,
    /// Working directory on the server
    pub remote_root: String,
    /// Control socket shared by every ssh/scp call to the same server
    pub control_path: String,
    /// How long to wait for the first output of a new shell
    pub first_output_timeout_secs: u64,
    /// How long to wait for the connection sentinel
    pub connect_timeout_secs: u64,
    /// How long the remote cleanup before an upload may take
    pub cleanup_timeout_secs: u64,
    /// Give up on a transfer after this long. Unset waits forever.
    pub transfer_timeout_secs: Option<u64>,
    /// Interval between log scans
    pub poll_interval_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh: PathBuf::from("ssh"),
            scp: PathBuf::from("scp"),
            remote_root: "~/CEMRG-GPUReconstruction".into(),
            control_path: "~/.ssh/%r@%h:%p".into(),
            first_output_timeout_secs: 20,
            connect_timeout_secs: 60,
            cleanup_timeout_secs: 60,
            transfer_timeout_secs: None,
            poll_interval_ms: 1000,
        }
    }
}

impl RemoteConfig {
    pub fn first_output_timeout(&self) -> Duration {
        Duration::from_secs(self.first_output_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.images.mirtk, "biomedia/mirtk:v1.1.0");
        assert_eq!(config.remote.remote_root, "~/CEMRG-GPUReconstruction");
        assert!(config.stage_timeout().is_none());
        assert!(config.remote.transfer_timeout().is_none());
        assert!(config.install.root(Toolkit::CemrgNet).is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
install:
  mirtk: /opt/MLib
remote:
  connect_timeout_secs: 5
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.install.root(Toolkit::Mirtk), Some(PathBuf::from("/opt/MLib")));
        assert_eq!(config.remote.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.remote.first_output_timeout(), Duration::from_secs(20));
        assert_eq!(config.images.meshtools3d, "alonsojasl/meshtools3d:v1.0");
    }

    #[test]
    fn test_load_prefers_working_dir_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "stage_timeout_secs: 30\n").unwrap();

        let config = EngineConfig::load(None, temp.path()).unwrap();
        assert_eq!(config.stage_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let err = EngineConfig::load(Some(&temp.path().join("nope.yaml")), temp.path());
        assert!(matches!(err, Err(MedflowError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = EngineConfig::default();
        let yaml = config.to_yaml().unwrap();
        let back = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(back.images.cemrgnet, config.images.cemrgnet);
    }
}
