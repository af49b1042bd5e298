// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Error types
//!
//! Every failure the engine can hit carries a diagnostic code and, where
//! there is something the user can do about it, a help line.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for medflow operations
pub type MedflowResult<T> = Result<T, MedflowError>;

/// Main error type for medflow
#[derive(Error, Debug, Diagnostic)]
pub enum MedflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Tooling Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{toolkit} libraries not found")]
    #[diagnostic(
        code(medflow::tooling_not_installed),
        help("Make sure the {toolkit} folder exists at {}", location.display())
    )]
    ToolingNotInstalled { toolkit: String, location: PathBuf },

    #[error("Container runtime '{}' not found", runtime.display())]
    #[diagnostic(
        code(medflow::container_runtime_not_found),
        help("Install Docker or set 'container_runtime' in .medflow.yaml")
    )]
    ContainerRuntimeNotFound { runtime: PathBuf },

    // ─────────────────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Cannot start '{program}': another process is still running")]
    #[diagnostic(
        code(medflow::process_busy),
        help("Stages run one at a time; wait for the current one to finish")
    )]
    ProcessBusy { program: String },

    #[error("Failed to start '{program}': {error}")]
    #[diagnostic(code(medflow::start_failure))]
    StartFailure {
        program: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    #[error("Lost track of '{program}': {error}")]
    #[diagnostic(code(medflow::process_wait))]
    ProcessWait { program: String, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Remote Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Not connected to {target}")]
    #[diagnostic(
        code(medflow::not_connected),
        help("Connect to the server before transferring files or running commands")
    )]
    NotConnected { target: String },

    #[error("Remote {operation} failed: {reason}")]
    #[diagnostic(code(medflow::remote_protocol))]
    RemoteProtocol {
        operation: String,
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Configuration file not found: {}", path.display())]
    #[diagnostic(
        code(medflow::config_not_found),
        help("Create .medflow.yaml or drop --config to use defaults")
    )]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to read file '{}': {error}", path.display())]
    #[diagnostic(code(medflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("No files matched pattern: {pattern}")]
    #[diagnostic(code(medflow::no_input_files))]
    NoInputFiles { pattern: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(medflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(medflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(medflow::json_error))]
    Json { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(medflow::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for MedflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for MedflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for MedflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<glob::PatternError> for MedflowError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl MedflowError {
    /// Create a start failure with a hint based on the OS error
    pub fn start_failure(program: &str, error: &std::io::Error) -> Self {
        let help = match error.kind() {
            std::io::ErrorKind::NotFound => {
                Some(format!("'{}' does not exist or is not on PATH", program))
            }
            std::io::ErrorKind::PermissionDenied => {
                Some(format!("'{}' is not executable by the current user", program))
            }
            _ => None,
        };

        Self::StartFailure {
            program: program.to_string(),
            error: error.to_string(),
            help,
        }
    }

    /// Create a remote protocol failure with a hint for the operation
    pub fn remote(operation: &str, reason: impl Into<String>) -> Self {
        let help = match operation {
            "connect" => Some(
                "Check that key- or agent-based ssh login works from a terminal".to_string(),
            ),
            "upload" | "download" => {
                Some("Check the connection and that the remote path exists".to_string())
            }
            _ => None,
        };

        Self::RemoteProtocol {
            operation: operation.to_string(),
            reason: reason.into(),
            help,
        }
    }
}
