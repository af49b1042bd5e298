// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Operation commands - run one engine operation

use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;

use super::{current_dir, load_config, OperationCommand, OutputFormat};
use crate::engine::Engine;
use crate::errors::RecoverySuggestion;
use crate::operations::Operation;
use crate::pipeline::{ExecutionResult, FailureKind};
use crate::sinks::{Collaborators, ConsoleNotifier, LogSink, ProgressBarSink, TracingLogSink};

/// Run an operation command
pub async fn run(
    command: OperationCommand,
    config: Option<PathBuf>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let cwd = current_dir()?;
    let operation = command.into_operation(&cwd);
    let config = load_config(config.as_deref(), &cwd)?;

    let stages = operation.plan().stages.len() as u64;
    let bar = Arc::new(ProgressBarSink::new(stages, operation.name()));
    let log: Arc<dyn LogSink> = if verbose {
        bar.clone()
    } else {
        Arc::new(TracingLogSink)
    };
    let engine = Engine::new(
        config,
        Collaborators::new(log, bar.clone(), Arc::new(ConsoleNotifier)),
    );

    let result = engine.execute(&operation).await;
    bar.finish();

    match format {
        OutputFormat::Text => print_text_result(&engine, &operation, &result),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
        }
    }

    if result.succeeded {
        Ok(())
    } else {
        Err(miette::miette!("{} failed", operation.name()))
    }
}

fn print_text_result(engine: &Engine, operation: &Operation, result: &ExecutionResult) {
    println!();
    if result.succeeded {
        println!(
            "{} {} finished using {} ({} stage{}, {:.1}s)",
            "✓".green(),
            operation.name().bold(),
            result.backend.as_deref().unwrap_or("unknown"),
            result.stages_completed,
            if result.stages_completed == 1 { "" } else { "s" },
            result.duration.as_secs_f64()
        );
        if let Some(output) = result.output() {
            println!("  {}: {}", "Output".bold(), output.display());
        }
        return;
    }

    let reason = match result.failure {
        Some(FailureKind::ToolingMissing) => "tooling not found",
        Some(FailureKind::StartFailure) => "a tool could not be started",
        Some(FailureKind::ValidationFailure) => "expected output was not produced",
        Some(FailureKind::RemoteProtocol) => "remote protocol error",
        None => "unknown error",
    };
    eprintln!(
        "{} {} failed: {}",
        "✗".red(),
        operation.name().bold(),
        reason
    );

    if result.failure == Some(FailureKind::ToolingMissing) {
        let toolkit = operation.toolkit();
        let expected = engine.config().install.root(toolkit);
        eprintln!();
        eprint!(
            "{}",
            RecoverySuggestion::install_toolkit(toolkit, expected.as_deref())
        );
    } else if !result.log.is_empty() {
        eprintln!();
        eprintln!("{}:", "Last output".yellow().bold());
        let lines: Vec<&str> = result.log.lines().collect();
        for line in &lines[lines.len().saturating_sub(10)..] {
            eprintln!("  {}", line.dimmed());
        }
    }
}
