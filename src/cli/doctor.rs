// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Doctor command - report backend availability

use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use super::{current_dir, load_config, OutputFormat};
use crate::engine::{Engine, ToolingStatus};
use crate::errors::RecoverySuggestion;
use crate::sinks::Collaborators;

/// Run the doctor command
pub async fn run(config: Option<PathBuf>, format: OutputFormat, verbose: bool) -> Result<()> {
    let cwd = current_dir()?;
    let engine = Engine::new(
        load_config(config.as_deref(), &cwd)?,
        Collaborators::silent(),
    );
    let statuses = engine.tooling_status(&cwd);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&statuses).into_diagnostic()?);
        return Ok(());
    }

    println!("{}", "Checking tooling...".bold());
    println!();
    for status in &statuses {
        print_status(status, verbose);
    }
    println!();

    let runtime_missing = statuses.iter().any(|s| !s.runtime_found);
    if runtime_missing && verbose {
        print!(
            "{}",
            RecoverySuggestion::container_runtime(&engine.config().container_runtime)
        );
        println!();
    }

    for status in statuses.iter().filter(|s| !s.usable()) {
        print!(
            "{}",
            RecoverySuggestion::install_toolkit(status.toolkit, status.install_dir.as_deref())
        );
        println!();
    }

    if statuses.iter().all(ToolingStatus::usable) {
        println!("{}", "Every toolkit has a usable backend.".green().bold());
    } else {
        println!(
            "{}",
            "Some toolkits cannot run on this machine.".yellow().bold()
        );
    }

    Ok(())
}

fn print_status(status: &ToolingStatus, verbose: bool) {
    let mark = |ok: bool| if ok { "✓".green() } else { "✗".red() };

    println!("{}:", status.toolkit.label().bold());
    println!(
        "  {} container  {} via {}",
        mark(status.runtime_found),
        status.image,
        status.runtime.display()
    );
    match status.install_dir {
        Some(ref dir) => println!("  {} local      {}", mark(status.install_found), dir.display()),
        None => println!("  {} local      {}", "-".dimmed(), "not distributed".dimmed()),
    }
    if verbose && !status.usable() {
        println!("  {}", "no backend can run this toolkit".yellow());
    }
}
