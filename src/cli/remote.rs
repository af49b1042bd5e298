// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Remote command - talk to a reconstruction server

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{current_dir, load_config, resolve, RemoteAction};
use crate::engine::Engine;
use crate::errors::{MedflowError, RecoverySuggestion};
use crate::remote::{ReconstructionRequest, RemoteSession, TRANSFER_DIR};
use crate::sinks::{Collaborators, ConsoleNotifier, LogSink, NullSink, TracingLogSink};

/// Run a remote action
pub async fn run(
    user: String,
    host: String,
    action: RemoteAction,
    config: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let cwd = current_dir()?;
    let log: Arc<dyn LogSink> = if verbose {
        Arc::new(TracingLogSink)
    } else {
        Arc::new(NullSink)
    };
    let engine = Engine::new(
        load_config(config.as_deref(), &cwd)?,
        Collaborators::new(log, Arc::new(NullSink), Arc::new(ConsoleNotifier)),
    );
    let mut session = engine.remote_session(&user, &host);

    println!("{} {}", "Connecting to".bold(), session.target());
    if let Err(e) = session.connect().await {
        eprintln!("  {} {}", "✗".red(), e);
        eprintln!();
        eprint!("{}", RecoverySuggestion::remote_connection(&session.target()));
        return Err(miette::Report::new(e));
    }
    println!("  {} Connected", "✓".green());

    let outcome = perform(&mut session, action, &cwd).await;
    session.disconnect().await;
    outcome.map_err(miette::Report::new)
}

async fn perform(
    session: &mut RemoteSession,
    action: RemoteAction,
    cwd: &Path,
) -> Result<(), MedflowError> {
    match action {
        RemoteAction::Upload { name, dir } => {
            session.upload(&resolve(&dir, cwd), &name).await?;
            println!("  {} Uploaded {}", "✓".green(), name);
        }
        RemoteAction::Download { name, dir } => {
            session.download(&name, &resolve(&dir, cwd)).await?;
            println!("  {} Downloaded {}", "✓".green(), name);
        }
        RemoteAction::Reconstruct {
            target,
            output,
            dir,
            pattern,
            resolution,
            delta,
            package,
        } => {
            let dir = resolve(&dir, cwd);
            let images = transfer_images(&dir.join(TRANSFER_DIR), &pattern)?;
            if images.is_empty() {
                return Err(MedflowError::NoInputFiles {
                    pattern: format!("{}/{}", TRANSFER_DIR, pattern),
                });
            }
            let request = ReconstructionRequest {
                images,
                target,
                resolution,
                delta,
                package,
                output: output.clone(),
            };

            session.upload(&dir, TRANSFER_DIR).await?;
            println!("  {} Uploaded {}", "✓".green(), TRANSFER_DIR);

            let outcome = session.reconstruct(&request).await?;
            println!(
                "  {} Reconstruction finished in {:.1}s",
                "✓".green(),
                outcome.duration.as_secs_f64()
            );

            session.download(&output, &dir).await?;
            println!(
                "  {} Downloaded {}",
                "✓".green(),
                dir.join(&output).display()
            );
        }
    }
    Ok(())
}

/// File names in `transfer` matching `pattern`, sorted
fn transfer_images(transfer: &Path, pattern: &str) -> Result<Vec<String>, MedflowError> {
    let full = transfer.join(pattern);
    let mut names: Vec<String> = glob::glob(&full.to_string_lossy())?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    Ok(names)
}
