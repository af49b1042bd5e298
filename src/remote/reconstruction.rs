// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! GPU reconstruction command line

use serde::{Deserialize, Serialize};

/// Mask image the reconstruction always reads
pub const MASK: &str = "Mask.nii.gz";
/// Remote executable
pub const RECONSTRUCTION_BINARY: &str = "reconstruction_GPU2";
/// Folder under the remote root that holds the uploaded images
pub const TRANSFER_DIR: &str = "Transfer";

/// Parameters of one reconstruction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionRequest {
    /// Uploaded image names, in any order
    pub images: Vec<String>,
    /// Image the others are reconstructed onto
    pub target: String,
    pub resolution: f64,
    pub delta: f64,
    /// Package count, repeated once per image
    pub package: i32,
    /// Output name, written next to the transfer folder
    pub output: String,
}

impl ReconstructionRequest {
    /// Image order for the command: target first, mask left out
    pub fn ordered_images(&self) -> Vec<String> {
        let mut images: Vec<String> = self
            .images
            .iter()
            .filter(|img| img.as_str() != MASK && **img != self.target)
            .cloned()
            .collect();
        images.insert(0, self.target.clone());
        images
    }

    /// Arguments following `user@host` on the ssh command line
    pub fn remote_args(&self, remote_root: &str) -> Vec<String> {
        let images = self.ordered_images();
        let packages = vec![self.package.to_string(); images.len()].join(" ");

        let mut args = vec![
            format!("cd {}/{};", remote_root, TRANSFER_DIR),
            RECONSTRUCTION_BINARY.to_string(),
            "-o".into(),
            format!("../{}", self.output),
            "-i".into(),
        ];
        args.extend(images);
        args.extend([
            "-m".to_string(),
            MASK.to_string(),
            "-d".into(),
            "0".into(),
            "--resolution".into(),
            self.resolution.to_string(),
            "--delta".into(),
            self.delta.to_string(),
            "--packages".into(),
            packages,
        ]);
        args
    }
}
