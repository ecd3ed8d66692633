//! Child process spawning and stdout capture.
//!
//! The child inherits stdin and stderr; only stdout is piped. A drain task
//! copies stdout into an [`OutputWriter`] and completes it at EOF, which may
//! happen before or after the child itself exits.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::OutputWriter;

const READ_CHUNK: usize = 8 * 1024;

/// Program plus its argument list, passed to the OS verbatim.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// A running child with its stdout drain.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    drain: JoinHandle<Result<u64, std::io::Error>>,
}

/// Spawn the child and start draining its stdout into `writer`.
///
/// Must be called from within a Tokio runtime.
pub fn spawn(
    command: &CommandSpec,
    writer: OutputWriter,
) -> Result<RunningProcess, SubprocessError> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    info!(
        program = %command.program.display(),
        args = command.args.len(),
        "Spawning child process"
    );
    let mut child = cmd.spawn().map_err(|source| SubprocessError::SpawnFailed {
        program: command.program.clone(),
        source,
    })?;

    let stdout = child.stdout.take().ok_or(SubprocessError::MissingStdout)?;
    let pid = child.id();
    debug!(?pid, "Child started");

    let drain = tokio::spawn(drain_stdout(stdout, writer));
    Ok(RunningProcess { child, drain })
}

async fn drain_stdout(
    mut stdout: ChildStdout,
    mut writer: OutputWriter,
) -> Result<u64, std::io::Error> {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => writer.append(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(
                    error = %e,
                    captured = writer.len(),
                    "stdout read failed, abandoning capture"
                );
                return Err(e);
            }
        }
    }
    let total = writer.complete().len() as u64;
    info!(bytes = total, "stdout capture complete");
    Ok(total)
}

impl RunningProcess {
    /// OS process id, if the child has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the child and reap it.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill child process");
        }
    }

    /// Wait for the child to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus, SubprocessError> {
        let status = self.child.wait().await.map_err(SubprocessError::Wait)?;
        info!(?status, "Child process exited");
        Ok(status)
    }

    /// Wait for the stdout drain to finish. Returns the captured byte count.
    pub async fn capture_finished(self) -> Result<u64, SubprocessError> {
        match self.drain.await {
            Ok(Ok(total)) => Ok(total),
            Ok(Err(e)) => Err(SubprocessError::Capture(e)),
            Err(e) => Err(SubprocessError::Capture(std::io::Error::other(e))),
        }
    }
}

/// Errors from subprocess operations.
#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("Failed to spawn {}: {source}", program.display())]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Child stdout was not captured")]
    MissingStdout,

    #[error("Failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Failed to capture child stdout: {0}")]
    Capture(#[source] std::io::Error),
}
