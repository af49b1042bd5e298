// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Plan command - show what each backend would run

use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use super::{current_dir, load_config, OperationCommand, OutputFormat};
use crate::engine::Engine;
use crate::pipeline::Pipeline;
use crate::sinks::Collaborators;

/// Run the plan command
pub async fn run(
    command: OperationCommand,
    config: Option<PathBuf>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let cwd = current_dir()?;
    let operation = command.into_operation(&cwd);
    let engine = Engine::new(
        load_config(config.as_deref(), &cwd)?,
        Collaborators::silent(),
    );
    let (container, local) = engine.plan(&operation);

    match format {
        OutputFormat::Text => {
            println!("{}: {}", "Operation".bold(), operation.name());
            print_pipeline(&container, verbose);
            match local {
                Some(ref local) => print_pipeline(local, verbose),
                None => {
                    println!();
                    println!("{}", "local (no local distribution)".dimmed());
                }
            }
        }
        OutputFormat::Json => {
            let mut tiers = vec![pipeline_json(&container)];
            if let Some(ref local) = local {
                tiers.push(pipeline_json(local));
            }
            let doc = serde_json::json!({
                "operation": operation.name(),
                "toolkit": operation.toolkit(),
                "tiers": tiers,
            });
            println!("{}", serde_json::to_string_pretty(&doc).into_diagnostic()?);
        }
    }

    Ok(())
}

fn print_pipeline(pipeline: &Pipeline, verbose: bool) {
    println!();
    println!("{}:", pipeline.backend.cyan().bold());
    for (i, stage) in pipeline.stages.iter().enumerate() {
        println!("  {}. {}", i + 1, stage.invocation());
        if verbose {
            println!(
                "     {} {}",
                "→".dimmed(),
                stage.expected_output.display().to_string().dimmed()
            );
            for (key, value) in &stage.env {
                println!("     {} {}={}", "env".dimmed(), key, value);
            }
        }
    }
    println!(
        "  {}: {}",
        "Output".bold(),
        pipeline.final_output.display()
    );
}

fn pipeline_json(pipeline: &Pipeline) -> serde_json::Value {
    let stages: Vec<serde_json::Value> = pipeline
        .stages
        .iter()
        .map(|stage| {
            serde_json::json!({
                "tool": stage.tool,
                "command": stage.invocation().to_string(),
                "output": stage.expected_output,
            })
        })
        .collect();
    serde_json::json!({
        "backend": pipeline.backend,
        "stages": stages,
        "final_output": pipeline.final_output,
        "validation": pipeline.validation,
    })
}
