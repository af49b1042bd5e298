// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! medflow - medical-image tool orchestration
//!
//! Run containerized or local MIRTK, Meshtools3D and CemrgNet pipelines.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Operation(command) => {
            medflow::cli::operation::run(command, cli.config, cli.format, cli.verbose).await
        }
        Commands::Plan { operation } => {
            medflow::cli::plan::run(operation, cli.config, cli.format, cli.verbose).await
        }
        Commands::Doctor => medflow::cli::doctor::run(cli.config, cli.format, cli.verbose).await,
        Commands::Remote { user, host, action } => {
            medflow::cli::remote::run(user, host, action, cli.config, cli.verbose).await
        }
    }
}
