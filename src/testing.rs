// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Fake tool installs for tests
//!
//! Every fake script appends its own name to `calls.log` in the scratch
//! root, so tests can assert exactly which processes ran and in what order.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::backend::Tool;

/// What a fake tool does besides recording the call
#[derive(Debug, Clone, Copy)]
pub enum FakeTool {
    /// Creates nothing
    WritesNothing,
    /// Creates an empty file at its second positional argument
    WritesSecondArg,
    /// Creates an empty file at the argument following `-dofout`
    WritesDofout,
}

/// Write an executable shell script at `path`
pub fn write_script(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Create `<root>/MLib` holding fake versions of `tools`
pub fn fake_install(root: &Path, tools: &[Tool], behaviour: FakeTool) -> PathBuf {
    let install = root.join("MLib");
    std::fs::create_dir_all(&install).unwrap();
    let calls = root.join("calls.log");

    let action = match behaviour {
        FakeTool::WritesNothing => "",
        FakeTool::WritesSecondArg => ": > \"$2\"",
        FakeTool::WritesDofout => {
            "while [ $# -gt 0 ]; do\n  if [ \"$1\" = -dofout ]; then : > \"$2\"; fi\n  shift\ndone"
        }
    };

    for tool in tools {
        let body = format!(
            "echo {name} >> \"{calls}\"\necho \"running {name} $*\"\n{action}",
            name = tool.binary_name(),
            calls = calls.display(),
            action = action,
        );
        write_script(&install.join(tool.binary_name()), &body);
    }
    install
}

/// Names recorded by fake tools under `root`, in call order
pub fn call_log(root: &Path) -> Vec<String> {
    std::fs::read_to_string(root.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}
