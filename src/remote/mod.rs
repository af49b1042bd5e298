// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Remote reconstruction server session
//!
//! One persistent ssh shell plus short-lived scp and ssh calls, all writing
//! into a single merged log. Connection and transfer outcomes are read from
//! that log (see [`sentinels`]); the reconstruction command completes when
//! its ssh process exits.
//!
//! Every call reuses one authenticated master connection through
//! `ControlMaster`/`ControlPath` options. Login must work without a prompt.

mod reconstruction;
pub mod sentinels;

pub use reconstruction::{ReconstructionRequest, MASK, RECONSTRUCTION_BINARY, TRANSFER_DIR};
pub use sentinels::{Sentinels, Verdict};

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::errors::{MedflowError, MedflowResult};
use crate::process::{InteractiveProcess, Invocation, LogBuffer, ProcessOutcome, ProcessSupervisor};
use crate::sinks::LogSink;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Transferring,
    RemoteExecuting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Transferring => "transferring",
            Self::RemoteExecuting => "remote-executing",
        };
        f.write_str(s)
    }
}

/// A session with one reconstruction server
pub struct RemoteSession {
    user: String,
    host: String,
    config: RemoteConfig,
    log: LogBuffer,
    sink: Arc<dyn LogSink>,
    supervisor: ProcessSupervisor,
    shell: Option<InteractiveProcess>,
    state: SessionState,
}

impl RemoteSession {
    pub fn new(user: &str, host: &str, config: RemoteConfig, sink: Arc<dyn LogSink>) -> Self {
        let log = LogBuffer::new();
        Self {
            user: user.to_string(),
            host: host.to_string(),
            supervisor: ProcessSupervisor::with_log(log.clone(), sink.clone()),
            config,
            log,
            sink,
            shell: None,
            state: SessionState::Disconnected,
        }
    }

    /// `user@host`
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Working directory on the server
    pub fn remote_root(&self) -> &str {
        &self.config.remote_root
    }

    /// Everything every process of this session has printed
    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Open the remote shell and wait for it to confirm the connection
    pub async fn connect(&mut self) -> MedflowResult<()> {
        match self.state {
            SessionState::Connected => return Ok(()),
            SessionState::Disconnected => {}
            other => return Err(self.busy("connect", other)),
        }

        self.state = SessionState::Connecting;
        info!("Connecting to {}", self.target());

        let result = self.open_shell().await;
        match result {
            Ok(shell) => {
                info!("Connected to {}", self.target());
                self.shell = Some(shell);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", self.target(), e);
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn open_shell(&self) -> MedflowResult<InteractiveProcess> {
        let invocation = self.ssh().arg(self.target());

        let mark = self.log.mark();
        let mut shell = InteractiveProcess::spawn(&invocation, &self.log, &self.sink, true)?;
        let shell_name = shell.program().to_string();

        let log = &self.log;
        let got_output = wait_until(
            || !log.since(mark).is_empty(),
            Some(self.config.first_output_timeout()),
            self.poll_interval(),
        )
        .await;
        if !got_output {
            shell.terminate().await;
            return Err(MedflowError::remote(
                "connect",
                format!(
                    "no output from {} within {:?}",
                    self.target(),
                    self.config.first_output_timeout()
                ),
            ));
        }

        let init = [
            format!("mkdir -p {}", self.config.remote_root),
            "echo".to_string(),
            "echo".to_string(),
            format!("echo '{}'", sentinels::CONNECTION_ESTABLISHED),
            "echo".to_string(),
            "echo".to_string(),
        ];
        for line in &init {
            if let Err(e) = shell.write_line(line).await {
                // a dead shell leaves its exit marker, which the scan below catches
                debug!("Could not write to {}: {}", shell_name, e);
                break;
            }
        }

        let verdict = self
            .await_verdict(
                mark,
                &Sentinels::connect(&shell_name),
                Some(self.config.connect_timeout()),
            )
            .await;

        match verdict {
            Verdict::Succeeded => Ok(shell),
            Verdict::Failed => {
                shell.terminate().await;
                Err(MedflowError::remote("connect", "the remote shell exited"))
            }
            Verdict::Pending => {
                shell.terminate().await;
                Err(MedflowError::remote(
                    "connect",
                    format!(
                        "'{}' did not appear within {:?}",
                        sentinels::CONNECTION_ESTABLISHED,
                        self.config.connect_timeout()
                    ),
                ))
            }
        }
    }

    /// Copy `<local_dir>/<name>` into the remote root, replacing any stale
    /// copy there
    pub async fn upload(&mut self, local_dir: &Path, name: &str) -> MedflowResult<()> {
        self.begin(SessionState::Transferring, "upload")?;
        let result = self.run_upload(local_dir, name).await;
        self.state = SessionState::Connected;
        result
    }

    async fn run_upload(&self, local_dir: &Path, name: &str) -> MedflowResult<()> {
        let stale = format!("{}/{}", self.config.remote_root, name);
        info!("Clearing {}:{}", self.target(), stale);
        let cleanup = self
            .ssh()
            .arg(self.target())
            .arg("rm -rf")
            .arg(stale);
        let outcome = self
            .supervisor
            .run_with_timeout(&cleanup, Some(self.config.cleanup_timeout()))
            .await?;
        if outcome.timed_out {
            return Err(MedflowError::remote(
                "upload",
                format!(
                    "remote cleanup did not finish within {:?}",
                    self.config.cleanup_timeout()
                ),
            ));
        }

        let copy = self
            .scp()
            .arg("-r")
            .arg(local_dir.join(name).to_string_lossy().into_owned())
            .arg(format!("{}:{}", self.target(), self.config.remote_root));
        let sentinels = Sentinels::upload(&Invocation::new(&self.config.scp).program_name());
        self.transfer("upload", &copy, &sentinels).await
    }

    /// Copy `<remote root>/<name>` into `local_dir`
    pub async fn download(&mut self, name: &str, local_dir: &Path) -> MedflowResult<()> {
        self.begin(SessionState::Transferring, "download")?;

        let copy = self
            .scp()
            .arg(format!(
                "{}:{}/{}",
                self.target(),
                self.config.remote_root,
                name
            ))
            .arg(local_dir.to_string_lossy().into_owned());
        let sentinels = Sentinels::download(&Invocation::new(&self.config.scp).program_name());
        let result = self.transfer("download", &copy, &sentinels).await;

        self.state = SessionState::Connected;
        result
    }

    async fn transfer(
        &self,
        operation: &str,
        copy: &Invocation,
        sentinels: &Sentinels,
    ) -> MedflowResult<()> {
        info!("Starting {}: {}", operation, copy);
        let mark = self.log.mark();
        let process = InteractiveProcess::spawn(copy, &self.log, &self.sink, false)?;

        let verdict = self
            .await_verdict(mark, sentinels, self.config.transfer_timeout())
            .await;
        process.terminate().await;

        match verdict {
            Verdict::Succeeded => {
                info!("{} finished", operation);
                Ok(())
            }
            Verdict::Failed => Err(MedflowError::remote(
                operation,
                format!("'{}' reported by {}", sentinels.failure, copy.program_name()),
            )),
            Verdict::Pending => Err(MedflowError::remote(
                operation,
                format!("no outcome within {:?}", self.config.transfer_timeout()),
            )),
        }
    }

    /// Run the reconstruction on the server and wait for the ssh call to
    /// exit
    pub async fn reconstruct(
        &mut self,
        request: &ReconstructionRequest,
    ) -> MedflowResult<ProcessOutcome> {
        self.begin(SessionState::RemoteExecuting, "reconstruct")?;

        let invocation = self
            .ssh()
            .arg(self.target())
            .args(request.remote_args(&self.config.remote_root));
        info!("Dispatching reconstruction to {}", self.target());
        let result = self.supervisor.run_with_timeout(&invocation, None).await;

        self.state = SessionState::Connected;
        result
    }

    /// End the remote shell
    pub async fn disconnect(&mut self) {
        if let Some(shell) = self.shell.take() {
            info!("Disconnecting from {}", self.target());
            shell.terminate().await;
        }
        self.state = SessionState::Disconnected;
    }

    fn begin(&mut self, next: SessionState, operation: &str) -> MedflowResult<()> {
        match self.state {
            SessionState::Connected => {
                self.state = next;
                Ok(())
            }
            SessionState::Disconnected => Err(MedflowError::NotConnected {
                target: self.target(),
            }),
            other => Err(self.busy(operation, other)),
        }
    }

    fn busy(&self, operation: &str, state: SessionState) -> MedflowError {
        MedflowError::remote(
            operation,
            format!("session with {} is {}", self.target(), state),
        )
    }

    fn ssh(&self) -> Invocation {
        Invocation::new(&self.config.ssh).args(self.master_options())
    }

    fn scp(&self) -> Invocation {
        Invocation::new(&self.config.scp).args(self.master_options())
    }

    fn master_options(&self) -> Vec<String> {
        vec![
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            format!("ControlPath={}", self.config.control_path),
        ]
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    async fn await_verdict(
        &self,
        mark: usize,
        sentinels: &Sentinels,
        timeout: Option<Duration>,
    ) -> Verdict {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let verdict = sentinels.scan(&self.log.since(mark));
            if verdict != Verdict::Pending {
                return verdict;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Verdict::Pending;
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }
}

async fn wait_until<F>(condition: F, timeout: Option<Duration>, interval: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        if condition() {
            return true;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}
