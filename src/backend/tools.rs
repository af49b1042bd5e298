// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Catalog of the external tools the engine knows how to invoke.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A distribution of tools that ships as one image and one install folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toolkit {
    /// MIRTK image registration and surface tools
    Mirtk,
    /// Meshtools3D CGAL mesher
    Meshtools3d,
    /// CemrgNet segmentation network
    CemrgNet,
}

impl Toolkit {
    /// Human readable name, as used in warnings
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mirtk => "MIRTK",
            Self::Meshtools3d => "Meshtools3D",
            Self::CemrgNet => "CemrgNet",
        }
    }

    /// Image used when no override is configured
    pub fn default_image(&self) -> &'static str {
        match self {
            Self::Mirtk => "biomedia/mirtk:v1.1.0",
            Self::Meshtools3d => "alonsojasl/meshtools3d:v1.0",
            Self::CemrgNet => "orodrazeghi/cemrgnet",
        }
    }

    /// Name of the folder holding the local binaries, if the toolkit has a
    /// local distribution at all
    pub fn install_dir_name(&self) -> Option<&'static str> {
        match self {
            Self::Mirtk => Some("MLib"),
            Self::Meshtools3d => Some("M3DLib"),
            Self::CemrgNet => None,
        }
    }

    /// Whether the container should be removed after it exits
    pub fn removes_container(&self) -> bool {
        matches!(self, Self::CemrgNet)
    }
}

impl fmt::Display for Toolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One external executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    DilateImage,
    ErodeImage,
    ExtractSurface,
    SmoothSurface,
    Register,
    TransformImage,
    TransformPoints,
    ResampleImage,
    InitDof,
    Meshtools3d,
    CemrgNet,
}

impl Tool {
    /// File name of the local binary
    pub fn binary_name(&self) -> &'static str {
        match self {
            Self::DilateImage => "dilate-image",
            Self::ErodeImage => "erode-image",
            Self::ExtractSurface => "extract-surface",
            Self::SmoothSurface => "smooth-surface",
            Self::Register => "register",
            Self::TransformImage => "transform-image",
            Self::TransformPoints => "transform-points",
            Self::ResampleImage => "resample-image",
            Self::InitDof => "init-dof",
            Self::Meshtools3d => "meshtools3d",
            Self::CemrgNet => "cemrgnet",
        }
    }

    /// Toolkit that ships this tool
    pub fn toolkit(&self) -> Toolkit {
        match self {
            Self::Meshtools3d => Toolkit::Meshtools3d,
            Self::CemrgNet => Toolkit::CemrgNet,
            _ => Toolkit::Mirtk,
        }
    }

    /// Command passed after the image name. The Meshtools3D and CemrgNet
    /// images run their tool as the image entrypoint, so they take none.
    pub fn container_entrypoint(&self) -> Option<&'static str> {
        match self.toolkit() {
            Toolkit::Mirtk => Some(self.binary_name()),
            Toolkit::Meshtools3d | Toolkit::CemrgNet => None,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirtk_tools_use_binary_as_entrypoint() {
        assert_eq!(Tool::DilateImage.container_entrypoint(), Some("dilate-image"));
        assert_eq!(Tool::Register.toolkit(), Toolkit::Mirtk);
    }

    #[test]
    fn test_entrypoint_images_take_no_command() {
        assert_eq!(Tool::Meshtools3d.container_entrypoint(), None);
        assert_eq!(Tool::CemrgNet.container_entrypoint(), None);
        assert!(Toolkit::CemrgNet.install_dir_name().is_none());
    }
}
