//! Subprocess execution for agent CLIs.
//!
//! Runs one external process with an argument vector (never a shell string),
//! optional stdin, extra environment and a hard timeout. On timeout or
//! cancellation the child is killed and reaped before returning.
//!
//! No retry logic lives here; that belongs to the conductor.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Default timeout for provider commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// A fully specified command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment, layered over the inherited one.
    pub env: BTreeMap<String, String>,
    /// Written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
    pub timeout: Duration,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
            cwd: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Output from a finished command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; -1 when the process was killed by a signal.
    pub exit_code: i32,
    pub duration: Duration,
}

impl ExecOutput {
    /// Check if command succeeded (exit code 0).
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The most informative error text: stderr, or stdout when stderr is empty.
    #[must_use]
    pub fn failure_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Executor-level failures. Providers translate these into classified errors.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("{0} cancelled")]
    Cancelled(String),

    #[error("I/O error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external processes.
#[async_trait]
pub trait CommandExecutor: Send + Sync + std::fmt::Debug {
    /// Run a command to completion, honouring its timeout and the token.
    async fn execute(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, ExecError>;

    /// Resolve a binary on the search path.
    fn which(&self, binary: &str) -> Option<PathBuf>;
}

/// [`CommandExecutor`] backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct TokioExecutor {
    /// Overrides `PATH` for binary lookup when set.
    search_path: Option<OsString>,
}

impl TokioExecutor {
    #[must_use]
    pub const fn new() -> Self {
        Self { search_path: None }
    }

    /// Resolve binaries against a fixed search path instead of `PATH`.
    #[must_use]
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }
}

enum Outcome {
    Finished(std::io::Result<(String, String, i32)>),
    TimedOut,
    Cancelled,
}

async fn communicate(
    child: &mut Child,
    input: Option<&str>,
) -> std::io::Result<(String, String, i32)> {
    let mut stdin = child.stdin.take();
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    // All three pipes are driven together so a chatty child cannot fill one
    // buffer while we block on another.
    let write_stdin = async {
        if let (Some(mut pipe), Some(text)) = (stdin.take(), input) {
            match pipe.write_all(text.as_bytes()).await {
                Ok(()) => {}
                // Child exited without reading all of its input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e),
            }
            pipe.shutdown().await.ok();
        }
        Ok::<_, std::io::Error>(())
    };

    let read_stdout = async {
        let mut stdout = Vec::new();
        if let Some(out) = stdout_pipe.as_mut() {
            out.read_to_end(&mut stdout).await?;
        }
        Ok::<_, std::io::Error>(stdout)
    };

    let read_stderr = async {
        let mut stderr = Vec::new();
        if let Some(err) = stderr_pipe.as_mut() {
            err.read_to_end(&mut stderr).await?;
        }
        Ok::<_, std::io::Error>(stderr)
    };

    let (written, stdout, stderr) = tokio::join!(write_stdin, read_stdout, read_stderr);
    written?;
    // Agent CLIs may emit arbitrary bytes; invalid UTF-8 is replaced, not fatal.
    let stdout = String::from_utf8_lossy(&stdout?).into_owned();
    let stderr = String::from_utf8_lossy(&stderr?).into_owned();

    let status = child.wait().await?;
    Ok((stdout, stderr, status.code().unwrap_or(-1)))
}

#[async_trait]
impl CommandExecutor for TokioExecutor {
    async fn execute(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled(spec.program.clone()));
        }

        let program = self
            .which(&spec.program)
            .ok_or_else(|| ExecError::NotFound(spec.program.clone()))?;

        let mut command = Command::new(&program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(
            program = %program.display(),
            args = spec.args.len(),
            timeout_secs = spec.timeout.as_secs(),
            "Spawning provider command"
        );

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecError::NotFound(spec.program.clone())
            } else {
                ExecError::Spawn {
                    program: spec.program.clone(),
                    source: e,
                }
            }
        })?;

        let outcome = tokio::select! {
            result = timeout(spec.timeout, communicate(&mut child, spec.stdin.as_deref())) => {
                result.map_or(Outcome::TimedOut, Outcome::Finished)
            }
            () = cancel.cancelled() => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Finished(Ok((stdout, stderr, exit_code))) => {
                let duration = started.elapsed();
                tracing::debug!(
                    program = %spec.program,
                    exit_code,
                    duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "Provider command finished"
                );
                Ok(ExecOutput {
                    stdout,
                    stderr,
                    exit_code,
                    duration,
                })
            }
            Outcome::Finished(Err(source)) => {
                reap(&mut child).await;
                Err(ExecError::Io {
                    program: spec.program.clone(),
                    source,
                })
            }
            Outcome::TimedOut => {
                reap(&mut child).await;
                tracing::warn!(
                    program = %spec.program,
                    timeout_secs = spec.timeout.as_secs(),
                    "Provider command timed out, killed"
                );
                Err(ExecError::Timeout {
                    program: spec.program.clone(),
                    after: spec.timeout,
                })
            }
            Outcome::Cancelled => {
                reap(&mut child).await;
                tracing::info!(program = %spec.program, "Provider command cancelled, killed");
                Err(ExecError::Cancelled(spec.program.clone()))
            }
        }
    }

    fn which(&self, binary: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        match &self.search_path {
            Some(path) => which::which_in(binary, Some(path), cwd).ok(),
            None => which::which(binary).ok(),
        }
    }
}

/// Kill the child and wait for it so no zombie is left behind.
async fn reap(child: &mut Child) {
    child.kill().await.ok();
    child.wait().await.ok();
}
