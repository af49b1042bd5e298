// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Output validation
//!
//! A stage succeeded if and only if its declared output exists afterwards.
//! Exit codes are not consulted. A zero-byte file left behind by a killed
//! process passes the default check; swap in [`MinimumSizeValidator`] where
//! that matters.

use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

/// Decides whether an expected artifact counts as produced
#[async_trait]
pub trait OutputValidator: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
}

/// Plain filesystem existence check
#[derive(Debug, Default, Clone, Copy)]
pub struct ExistenceValidator;

#[async_trait]
impl OutputValidator for ExistenceValidator {
    async fn exists(&self, path: &Path) -> bool {
        let found = tokio::fs::try_exists(path).await.unwrap_or(false);
        if found {
            info!("Successful output: {}", path.display());
        } else {
            warn!("Output file not found: {}", path.display());
        }
        found
    }
}

/// Requires the artifact to be a file of at least `min_bytes`
#[derive(Debug, Clone, Copy)]
pub struct MinimumSizeValidator {
    pub min_bytes: u64,
}

impl MinimumSizeValidator {
    pub fn new(min_bytes: u64) -> Self {
        Self { min_bytes }
    }
}

#[async_trait]
impl OutputValidator for MinimumSizeValidator {
    async fn exists(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() >= self.min_bytes => true,
            Ok(meta) => {
                warn!(
                    "Output {} is only {} bytes (need {})",
                    path.display(),
                    meta.len(),
                    self.min_bytes
                );
                false
            }
            Err(_) => {
                warn!("Output file not found: {}", path.display());
                false
            }
        }
    }
}
