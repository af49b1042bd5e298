// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

use std::path::Path;

use crate::backend::Toolkit;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Suggest installing the local distribution of a toolkit
    pub fn install_toolkit(toolkit: Toolkit, expected: Option<&Path>) -> Self {
        let location = expected
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<not configured>".into());

        // CemrgNet only ships as an image
        let commands = if toolkit.install_dir_name().is_some() {
            vec![
                "# Or pull the container image instead:".into(),
                format!("docker pull {}", toolkit.default_image()),
            ]
        } else {
            vec![format!("docker pull {}", toolkit.default_image())]
        };

        Self {
            action: format!("Install the {} tools", toolkit.label()),
            steps: vec![
                format!("The container run failed and no local {} install was found", toolkit.label()),
                format!("Expected the binaries in: {}", location),
                "Set 'install' in .medflow.yaml if they live elsewhere".into(),
            ],
            commands,
        }
    }

    /// Suggest making the container runtime reachable
    pub fn container_runtime(runtime: &Path) -> Self {
        Self {
            action: "Make the container runtime available".into(),
            steps: vec![
                format!("'{}' could not be located", runtime.display()),
                "Install Docker and make sure the daemon is running".into(),
            ],
            commands: vec!["docker info".into()],
        }
    }

    /// Suggest checking the ssh setup for a server
    pub fn remote_connection(target: &str) -> Self {
        Self {
            action: format!("Check the connection to {}", target),
            steps: vec![
                "The server must accept key- or agent-based login".into(),
                "A password prompt cannot be answered from here".into(),
            ],
            commands: vec![
                "# Verify that this logs in without a prompt:".into(),
                format!("ssh {} true", target),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_suggestion_mentions_location() {
        let s = RecoverySuggestion::install_toolkit(Toolkit::Mirtk, Some(Path::new("/opt/MLib")));
        let text = s.to_string();
        assert!(text.contains("/opt/MLib"));
        assert!(text.contains("biomedia/mirtk:v1.1.0"));
    }

    #[test]
    fn test_container_only_toolkit_suggests_pull() {
        let s = RecoverySuggestion::install_toolkit(Toolkit::CemrgNet, None);
        assert_eq!(s.commands, vec!["docker pull orodrazeghi/cemrgnet".to_string()]);
    }
}
