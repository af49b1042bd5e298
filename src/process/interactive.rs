// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Long-lived processes that are polled rather than awaited
//!
//! Used for the remote shell, which stays up while commands are written to
//! its stdin, and for file copies whose outcome is read from their output.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{exit_marker, join_drains, spawn_drains, Invocation, LogBuffer};
use crate::errors::{MedflowError, MedflowResult};
use crate::sinks::LogSink;

/// A running process whose output drains into a shared log in the
/// background. Dropping the handle kills the process.
pub struct InteractiveProcess {
    program: String,
    stdin: Option<ChildStdin>,
    completed: Arc<AtomicBool>,
    kill: Option<oneshot::Sender<()>>,
    waiter: JoinHandle<()>,
}

impl InteractiveProcess {
    /// Start `invocation`, draining its output into `log`. With
    /// `keep_stdin` the process gets a pipe that [`write_line`] feeds.
    ///
    /// [`write_line`]: InteractiveProcess::write_line
    pub fn spawn(
        invocation: &Invocation,
        log: &LogBuffer,
        sink: &Arc<dyn LogSink>,
        keep_stdin: bool,
    ) -> MedflowResult<Self> {
        let program = invocation.program_name();
        debug!("Starting: {}", invocation);

        let mut cmd = invocation.command();
        cmd.stdin(if keep_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            warn!("Process error: could not start {}: {}", program, e);
            MedflowError::start_failure(&invocation.program.to_string_lossy(), &e)
        })?;

        let stdin = child.stdin.take();
        let drains = spawn_drains(&mut child, log, sink);
        let completed = Arc::new(AtomicBool::new(false));
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

        let waiter = {
            let log = log.clone();
            let sink = sink.clone();
            let completed = completed.clone();
            let program = program.clone();
            tokio::spawn(async move {
                let killed = tokio::select! {
                    _ = child.wait() => false,
                    _ = &mut kill_rx => {
                        let _ = child.kill().await;
                        true
                    }
                };
                join_drains(drains, killed).await;
                let marker = exit_marker(&program);
                log.append_line(&marker);
                sink.append(&format!("{}\n", marker));
                completed.store(true, Ordering::SeqCst);
            })
        };

        Ok(Self {
            program,
            stdin,
            completed,
            kill: Some(kill_tx),
            waiter,
        })
    }

    /// Bare program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the process has exited and its output is fully drained
    pub fn has_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Write one line to the process's stdin
    pub async fn write_line(&mut self, line: &str) -> MedflowResult<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| MedflowError::Io {
            message: format!("{} has no stdin", self.program),
        })?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Close stdin, kill the process if it is still running and wait for
    /// the exit marker to land in the log
    pub async fn terminate(mut self) {
        self.stdin = None;
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        let _ = (&mut self.waiter).await;
    }
}
