// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Command-line integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory plus a config pointing the tooling at it
fn workspace(runtime: &str) -> (TempDir, PathBuf, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let config = root.join("medflow-test.yaml");
    std::fs::write(
        &config,
        format!(
            "container_runtime: {}\ninstall:\n  mirtk: {}\n",
            runtime,
            root.join("MLib").display()
        ),
    )
    .unwrap();
    (temp, root, config)
}

fn medflow(root: &Path, config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("medflow").unwrap();
    cmd.env("NO_COLOR", "1")
        .arg("-C")
        .arg(root)
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn test_help_lists_operations() {
    Command::cargo_bin("medflow")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("surf"))
        .stdout(predicate::str::contains("register"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_plan_shows_both_backends() {
    let (_temp, root, config) = workspace("docker");

    let container = format!(
        "docker run --volume={}:/data biomedia/mirtk:v1.1.0 dilate-image LA.nii segmentation.d.nii -iterations 1 -verbose 3",
        root.display()
    );
    let local = format!(
        "{mlib}/dilate-image {dir}/LA.nii {dir}/segmentation.d.nii -iterations 1 -verbose 3",
        mlib = root.join("MLib").display(),
        dir = root.display()
    );

    medflow(&root, &config)
        .args(["plan", "surf", "LA.nii"])
        .assert()
        .success()
        .stdout(predicate::str::contains(container))
        .stdout(predicate::str::contains(local))
        .stdout(predicate::str::contains("smooth-surface"));
}

#[test]
fn test_plan_json_for_container_only_toolkit() {
    let (_temp, root, config) = workspace("docker");

    let output = medflow(&root, &config)
        .args(["plan", "predict", "MRA.nii", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["operation"], "prediction");
    let tiers = doc["tiers"].as_array().unwrap();
    assert_eq!(tiers.len(), 1);
    assert_eq!(tiers[0]["backend"], "container");
    assert!(tiers[0]["stages"][0]["command"]
        .as_str()
        .unwrap()
        .contains("run --rm"));
}

#[test]
fn test_doctor_reports_missing_runtime() {
    let (_temp, root, config) = workspace("/nonexistent/docker");

    let output = medflow(&root, &config)
        .args(["doctor", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let statuses = doc.as_array().unwrap();
    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|s| s["runtime_found"] == false));
}

#[test]
fn test_operation_without_tooling_fails_with_guidance() {
    let (_temp, root, config) = workspace("/nonexistent/docker");

    medflow(&root, &config)
        .args(["register", "LGE.nii", "MRA.nii"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MIRTK libraries not found"))
        .stderr(predicate::str::contains("Install the MIRTK tools"));

    assert!(!root.join("rigid.dof").exists());
}

#[cfg(unix)]
#[test]
fn test_register_with_local_install() {
    use std::os::unix::fs::PermissionsExt;

    let (_temp, root, config) = workspace("/nonexistent/docker");
    let mlib = root.join("MLib");
    std::fs::create_dir_all(&mlib).unwrap();
    let register = mlib.join("register");
    std::fs::write(
        &register,
        "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = -dofout ]; then : > \"$2\"; fi\n  shift\ndone\n",
    )
    .unwrap();
    std::fs::set_permissions(&register, std::fs::Permissions::from_mode(0o755)).unwrap();

    medflow(&root, &config)
        .args(["register", "LGE.nii", "MRA.nii"])
        .assert()
        .success()
        .stdout(predicate::str::contains("registration finished using local"));

    assert!(root.join("rigid.dof").exists());
}
