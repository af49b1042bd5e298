// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Process supervision
//!
//! A [`ProcessSupervisor`] runs one external process at a time, merges its
//! stdout and stderr into a [`LogBuffer`] in arrival order, and appends
//! `"<program> Completed!"` when the process exits. It never judges whether
//! the process did its job; that is the caller's business.

mod interactive;
mod log;

pub use interactive::InteractiveProcess;
pub use log::LogBuffer;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{MedflowError, MedflowResult};
use crate::sinks::LogSink;

/// A fully resolved command line
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Program to start
    pub program: PathBuf,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Working directory of the process
    pub working_dir: Option<PathBuf>,
    /// Extra environment on top of the inherited one
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Bare program name, as used in the exit marker
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What happened to one supervised process
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Exit code, if the process exited normally. Informative only.
    pub exit_code: Option<i32>,
    /// Output produced by this process, including the exit marker
    pub log: String,
    /// Wall-clock time from start to exit
    pub duration: Duration,
    /// Whether the timeout policy killed the process
    pub timed_out: bool,
}

/// Line appended to the log when `program` exits
pub fn exit_marker(program: &str) -> String {
    format!("{} Completed!", program)
}

/// Runs external processes one at a time
pub struct ProcessSupervisor {
    log: LogBuffer,
    sink: Arc<dyn LogSink>,
    running: AtomicBool,
    completed: AtomicBool,
    timeout: Option<Duration>,
}

impl ProcessSupervisor {
    /// Create a supervisor with a fresh log
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_log(LogBuffer::new(), sink)
    }

    /// Create a supervisor that appends to an existing log
    pub fn with_log(log: LogBuffer, sink: Arc<dyn LogSink>) -> Self {
        Self {
            log,
            sink,
            running: AtomicBool::new(false),
            completed: AtomicBool::new(true),
            timeout: None,
        }
    }

    /// Kill processes that outlive `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The merged log of every process run so far
    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Whether the last started process has exited
    pub fn has_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Whether a process is running right now
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a process to completion under the configured timeout policy
    pub async fn run(&self, invocation: &Invocation) -> MedflowResult<ProcessOutcome> {
        self.run_with_timeout(invocation, self.timeout).await
    }

    /// Run a process to completion, killing it after `timeout`
    pub async fn run_with_timeout(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> MedflowResult<ProcessOutcome> {
        let program = invocation.program_name();

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MedflowError::ProcessBusy { program });
        }
        let _guard = RunningGuard(&self.running);
        self.completed.store(false, Ordering::SeqCst);

        let mark = self.log.mark();
        let start = Instant::now();

        debug!("Starting: {}", invocation);

        let mut cmd = invocation.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.completed.store(true, Ordering::SeqCst);
                warn!("Process error: could not start {}: {}", program, e);
                return Err(MedflowError::start_failure(
                    &invocation.program.to_string_lossy(),
                    &e,
                ));
            }
        };

        let drains = spawn_drains(&mut child, &self.log, &self.sink);

        let mut timed_out = false;
        let status = match timeout {
            None => child.wait().await,
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!("{} exceeded {:?}; killing it", program, limit);
                    timed_out = true;
                    let _ = child.start_kill();
                    child.wait().await
                }
            },
        };

        join_drains(drains, timed_out).await;

        let marker = exit_marker(&program);
        self.log.append_line(&marker);
        self.sink.append(&format!("{}\n", marker));
        self.completed.store(true, Ordering::SeqCst);

        let status = status.map_err(|e| MedflowError::ProcessWait {
            program: program.clone(),
            error: e.to_string(),
        })?;

        Ok(ProcessOutcome {
            exit_code: status.code(),
            log: self.log.since(mark),
            duration: start.elapsed(),
            timed_out,
        })
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How long output may stay open after a kill. A forked grandchild can hold
/// the pipes long after the process itself is gone.
pub(crate) const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Wait for the drain tasks. After a kill they get [`DRAIN_GRACE`] and are
/// then abandoned.
pub(crate) async fn join_drains(drains: Vec<JoinHandle<()>>, killed: bool) {
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    for mut drain in drains {
        if !killed {
            let _ = drain.await;
        } else if tokio::time::timeout_at(deadline, &mut drain).await.is_err() {
            debug!("Output still open after kill; abandoning it");
            drain.abort();
        }
    }
}

/// Start one drain task per captured stream of `child`
pub(crate) fn spawn_drains(
    child: &mut tokio::process::Child,
    log: &LogBuffer,
    sink: &Arc<dyn LogSink>,
) -> Vec<JoinHandle<()>> {
    let mut drains = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        drains.push(tokio::spawn(drain(stdout, log.clone(), sink.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        drains.push(tokio::spawn(drain(stderr, log.clone(), sink.clone())));
    }
    drains
}

async fn drain<R>(mut reader: R, log: LogBuffer, sink: Arc<dyn LogSink>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut text = Utf8Chunks::default();
    loop {
        let chunk = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => text.push(&buf[..n]),
        };
        if !chunk.is_empty() {
            log.append(&chunk);
            sink.append(&chunk);
        }
    }
    let rest = text.finish();
    if !rest.is_empty() {
        log.append(&rest);
        sink.append(&rest);
    }
}

/// Decodes a byte stream read in arbitrary pieces, holding back a character
/// split across two reads until its remaining bytes arrive
#[derive(Debug, Default)]
struct Utf8Chunks {
    pending: Vec<u8>,
}

impl Utf8Chunks {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut complete = 0;
        loop {
            match std::str::from_utf8(&self.pending[complete..]) {
                Ok(_) => {
                    complete = self.pending.len();
                    break;
                }
                Err(e) => match e.error_len() {
                    Some(bad) => complete += e.valid_up_to() + bad,
                    // truncated sequence at the end: wait for more
                    None => {
                        complete += e.valid_up_to();
                        break;
                    }
                },
            }
        }
        let text = String::from_utf8_lossy(&self.pending[..complete]).into_owned();
        self.pending.drain(..complete);
        text
    }

    fn finish(self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}

/// Whether `path` names something a process could be started from
pub fn is_launchable(program: &Path) -> bool {
    which::which(program).is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sinks::NullSink;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(Arc::new(NullSink))
    }

    #[tokio::test]
    async fn test_merges_stdout_and_stderr() {
        let sup = supervisor();
        let inv = Invocation::new("sh").args(["-c", "echo out; echo err 1>&2"]);

        let outcome = sup.run(&inv).await.unwrap();

        assert!(outcome.log.contains("out"));
        assert!(outcome.log.contains("err"));
        assert!(outcome.log.ends_with("sh Completed!\n"));
        assert_eq!(outcome.exit_code, Some(0));
        assert!(sup.has_completed());
        assert!(!sup.is_running());
    }

    #[tokio::test]
    async fn test_exit_status_is_reported_not_judged() {
        let sup = supervisor();
        let outcome = sup.run(&Invocation::new("sh").args(["-c", "exit 3"])).await.unwrap();
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_missing_binary_is_start_failure() {
        let sup = supervisor();
        let err = sup
            .run(&Invocation::new("/nonexistent/dilate-image"))
            .await
            .unwrap_err();

        assert!(matches!(err, MedflowError::StartFailure { .. }));
        assert!(!sup.is_running());
        assert!(sup.has_completed());
    }

    #[tokio::test]
    async fn test_rejects_second_concurrent_process() {
        let sup = Arc::new(supervisor());
        let first = {
            let sup = sup.clone();
            tokio::spawn(async move {
                sup.run(&Invocation::new("sh").args(["-c", "sleep 1"])).await
            })
        };

        while !sup.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let second = sup.run(&Invocation::new("true")).await;
        assert!(matches!(second, Err(MedflowError::ProcessBusy { .. })));

        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_timeout_policy_kills_process() {
        let sup = supervisor().with_timeout(Some(Duration::from_millis(200)));
        let outcome = sup
            .run(&Invocation::new("sh").args(["-c", "exec sleep 10"]))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(outcome.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_is_not_held_up_by_forked_children() {
        let sup = supervisor().with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let outcome = sup
            .run(&Invocation::new("sh").args(["-c", "sleep 5; true"]))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(outcome.log.ends_with("sh Completed!\n"));
        assert!(!sup.is_running());
    }

    #[test]
    fn test_split_character_survives_read_boundary() {
        let bytes = "naïve".as_bytes();
        let mut text = Utf8Chunks::default();

        let first = text.push(&bytes[..3]);
        let second = text.push(&bytes[3..]);

        assert_eq!(first, "na");
        assert_eq!(format!("{}{}", first, second), "naïve");
        assert!(text.finish().is_empty());
    }

    #[test]
    fn test_invalid_bytes_are_replaced_not_held() {
        let mut text = Utf8Chunks::default();
        assert_eq!(text.push(b"a\xffb"), "a\u{fffd}b");
        assert_eq!(text.push(&[0xff, b'x', 0xc3]), "\u{fffd}x");
        assert_eq!(text.finish(), "\u{fffd}");
    }

    #[tokio::test]
    async fn test_log_accumulates_across_runs() {
        let sup = supervisor();
        sup.run(&Invocation::new("sh").args(["-c", "echo one"])).await.unwrap();
        let second = sup.run(&Invocation::new("sh").args(["-c", "echo two"])).await.unwrap();

        assert!(!second.log.contains("one"));
        let all = sup.log().snapshot();
        assert!(all.contains("one") && all.contains("two"));
    }

    #[test]
    fn test_invocation_display() {
        let inv = Invocation::new("/usr/bin/docker").args(["run", "--volume=/w:/data"]);
        assert_eq!(inv.to_string(), "/usr/bin/docker run --volume=/w:/data");
        assert_eq!(inv.program_name(), "docker");
    }
}
