//! Supervised execution of external commands.
//!
//! Every command cephfs-sync launches (filesystem probes, ping, scp, ssh,
//! mkdir, rsync) goes through a [`CommandRunner`]. The production runner,
//! [`Supervisor`], polls the child once per tick and escalates through an
//! explicit [`Escalator`] state machine:
//!
//! ```text
//! Running --timeout--> GracePeriodRequested --grace--> ForceKilled
//!    \                        /
//!     +-----> Completed <----+
//! ```
//!
//! A force-killed command reports [`FORCE_KILLED_EXIT_CODE`].

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::SupervisorError;

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Exit code reported when the supervisor had to SIGKILL the command.
pub const FORCE_KILLED_EXIT_CODE: i32 = -9;

/// How long to wait for output pipes to close after the child is gone.
/// Grandchildren that inherited the pipes can otherwise hold them open.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A command to be launched under supervision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute (resolved through `PATH` unless absolute).
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Replacement environment. `None` inherits the caller's environment.
    pub env: Option<Vec<(String, String)>>,
    /// Working directory for the child. `None` inherits the caller's.
    pub workdir: Option<PathBuf>,
    /// Time allowed before graceful termination is requested.
    pub timeout: Duration,
}

impl CommandSpec {
    /// Create a command with no arguments and the default timeout.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: None,
            workdir: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the child's environment entirely.
    pub fn env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = Some(env);
        self
    }

    /// Run the child in `dir`.
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Override the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of a supervised command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, `-<signal>` for signal deaths, or [`FORCE_KILLED_EXIT_CODE`].
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutcome {
    /// Build an outcome from its parts.
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// True if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// True if the supervisor had to SIGKILL the command.
    pub fn force_killed(&self) -> bool {
        self.exit_code == FORCE_KILLED_EXIT_CODE
    }

    /// Standard output followed by standard error.
    pub fn combined_output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Anything that can run a [`CommandSpec`] to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and return its outcome. A non-zero exit is an
    /// `Ok` outcome; only launch and supervision failures are errors.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome, SupervisorError>;
}

/// Lifecycle of one supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionState {
    /// Process is running within its timeout.
    Running,
    /// Graceful termination was requested; waiting out the grace period.
    GracePeriodRequested,
    /// Process was killed forcefully.
    ForceKilled,
    /// Process exited on its own (possibly in response to termination).
    Completed,
}

/// Action the supervisor must take after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Nothing to do.
    None,
    /// Send the graceful-termination signal.
    Terminate,
    /// Send the forceful-kill signal.
    Kill,
}

/// Timeout/escalation state machine, independent of any process.
///
/// Driven by a single logical clock: callers feed it the elapsed time and
/// whether the process is still alive, and it returns the signal to send.
#[derive(Debug, Clone)]
pub struct Escalator {
    state: SupervisionState,
    timeout: Duration,
    grace_period: Duration,
    terminate_requested_at: Option<Duration>,
}

impl Escalator {
    /// Create a machine in the `Running` state.
    pub fn new(timeout: Duration, grace_period: Duration) -> Self {
        Self {
            state: SupervisionState::Running,
            timeout,
            grace_period,
            terminate_requested_at: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SupervisionState {
        self.state
    }

    /// True once the machine reached `Completed` or `ForceKilled`.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            SupervisionState::Completed | SupervisionState::ForceKilled
        )
    }

    /// Feed one liveness observation taken at `elapsed`.
    pub fn observe(&mut self, elapsed: Duration, alive: bool) -> Escalation {
        if self.is_finished() {
            return Escalation::None;
        }
        if !alive {
            self.state = SupervisionState::Completed;
            return Escalation::None;
        }
        match self.state {
            SupervisionState::Running if elapsed >= self.timeout => {
                self.state = SupervisionState::GracePeriodRequested;
                self.terminate_requested_at = Some(elapsed);
                Escalation::Terminate
            }
            SupervisionState::GracePeriodRequested => {
                let requested_at = self.terminate_requested_at.unwrap_or(elapsed);
                if elapsed >= requested_at + self.grace_period {
                    self.state = SupervisionState::ForceKilled;
                    Escalation::Kill
                } else {
                    Escalation::None
                }
            }
            _ => Escalation::None,
        }
    }
}

/// Production [`CommandRunner`] that launches real processes.
#[derive(Debug, Clone)]
pub struct Supervisor {
    poll_interval: Duration,
    grace_period: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(1),
        }
    }
}

impl Supervisor {
    /// Create a supervisor with a custom tick and grace period.
    pub fn new(poll_interval: Duration, grace_period: Duration) -> Self {
        Self {
            poll_interval,
            grace_period,
        }
    }

    async fn supervise(&self, spec: &CommandSpec) -> Result<CommandOutcome, SupervisorError> {
        if spec.program.is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }
        let command_line = spec.to_string();
        tracing::debug!("Executing: {}", command_line);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(env) = &spec.env {
            command.env_clear().envs(env.iter().map(|(k, v)| (k, v)));
        }
        if let Some(dir) = &spec.workdir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            command: command_line.clone(),
            source,
        })?;
        let pgid = child.id().map(|pid| pid as libc::pid_t);

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = drain(child.stdout.take(), Arc::clone(&stdout_buf));
        let stderr_task = drain(child.stderr.take(), Arc::clone(&stderr_buf));

        let io_err = |source: std::io::Error| SupervisorError::Io {
            command: command_line.clone(),
            source,
        };

        let mut escalator = Escalator::new(spec.timeout, self.grace_period);
        let mut ticks: u32 = 0;
        let status = loop {
            let exited = child.try_wait().map_err(io_err)?;
            let elapsed = self.poll_interval * ticks;
            match escalator.observe(elapsed, exited.is_none()) {
                Escalation::Terminate => {
                    tracing::warn!(
                        "'{}' still running after {}s, sending SIGTERM",
                        command_line,
                        elapsed.as_secs()
                    );
                    signal_group(pgid, libc::SIGTERM);
                }
                Escalation::Kill => {
                    tracing::warn!("'{}' ignored SIGTERM, sending SIGKILL", command_line);
                    signal_group(pgid, libc::SIGKILL);
                }
                Escalation::None => {}
            }
            match escalator.state() {
                SupervisionState::Completed => break exited,
                SupervisionState::ForceKilled => {
                    child.wait().await.map_err(io_err)?;
                    break None;
                }
                _ => {}
            }
            tokio::time::sleep(self.poll_interval).await;
            ticks = ticks.saturating_add(1);
        };

        finish_drain(stdout_task).await;
        finish_drain(stderr_task).await;

        let exit_code = match status {
            Some(status) => exit_code_of(status),
            None => FORCE_KILLED_EXIT_CODE,
        };
        let outcome = CommandOutcome {
            exit_code,
            stdout: take_lossy(&stdout_buf),
            stderr: take_lossy(&stderr_buf),
        };
        tracing::debug!("'{}' finished with exit code {}", command_line, outcome.exit_code);
        Ok(outcome)
    }
}

#[async_trait]
impl CommandRunner for Supervisor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome, SupervisorError> {
        self.supervise(spec).await
    }
}

fn drain<R>(reader: Option<R>, buf: Arc<Mutex<Vec<u8>>>) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = reader?;
    Some(tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut guard) = buf.lock() {
                        guard.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    }))
}

async fn finish_drain(task: Option<JoinHandle<()>>) {
    if let Some(mut task) = task {
        if tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut task).await.is_err() {
            task.abort();
        }
    }
}

fn take_lossy(buf: &Mutex<Vec<u8>>) -> String {
    match buf.lock() {
        Ok(mut guard) => String::from_utf8_lossy(&std::mem::take(&mut *guard)).into_owned(),
        Err(_) => String::new(),
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => -status.signal().unwrap_or(0),
    }
}

fn signal_group(pgid: Option<libc::pid_t>, signal: libc::c_int) {
    let Some(pgid) = pgid else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group created for this child.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        tracing::debug!(
            "kill(-{}, {}) failed: {}",
            pgid,
            signal,
            std::io::Error::last_os_error()
        );
    }
}
