//! One psub run: announce, spawn, serve, wait.
//!
//! Sequencing:
//! 1. A [`ChannelName`] is generated and announced on stdout.
//! 2. The child is spawned and its stdout drained into the output buffer.
//! 3. The endpoint pool starts listening on the announced name.
//! 4. The child's exit and the end of capture are awaited.
//! 5. The pool is awaited until every endpoint is terminal.

use std::io::{self, Write};
use std::process::ExitStatus;

use psub_core::config::BroadcastConfig;
use tracing::{info, warn};

use crate::buffer::{OutputReader, output_buffer};
use crate::pool::{BroadcastPool, PoolError, PoolReport, RunningPool};
use crate::subprocess::{self, CommandSpec, SubprocessError};
use crate::transport::{self, ChannelError, ChannelName};

/// Everything that happened during a completed session.
#[derive(Debug)]
pub struct SessionReport {
    pub exit_status: ExitStatus,
    pub captured_bytes: u64,
    pub pool: PoolReport,
}

pub struct Session {
    name: ChannelName,
    command: CommandSpec,
    redundancy: usize,
}

impl Session {
    pub fn new(command: CommandSpec, broadcast: &BroadcastConfig) -> Self {
        Self {
            name: ChannelName::generate(broadcast.socket_dir.as_deref()),
            command,
            redundancy: broadcast.effective_redundancy(),
        }
    }

    pub const fn channel_name(&self) -> &ChannelName {
        &self.name
    }

    pub const fn redundancy(&self) -> usize {
        self.redundancy
    }

    /// Write the single line clients use to find the channel.
    pub fn announce<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.name)?;
        out.flush()
    }

    fn open_pool(
        &self,
        reader: &OutputReader,
    ) -> Result<RunningPool, SessionError> {
        let channel = transport::bind(&self.name, self.redundancy)?;
        Ok(BroadcastPool::new(channel, self.redundancy).start(reader)?)
    }

    pub async fn run(self) -> Result<SessionReport, SessionError> {
        let (writer, reader) = output_buffer();
        let mut process = subprocess::spawn(&self.command, writer)?;

        let running = match self.open_pool(&reader) {
            Ok(running) => running,
            Err(e) => {
                warn!(error = %e, "Could not open channel, stopping child");
                process.kill().await;
                return Err(e);
            }
        };
        info!(
            channel = %self.name,
            session_id = %self.name.session_id(),
            redundancy = self.redundancy,
            pid = ?process.id(),
            "Serving capture"
        );

        let exit = process.wait().await;
        let capture = process.capture_finished().await;
        release_if_abandoned(&running, &capture);
        let pool = running.join().await;

        Ok(SessionReport {
            exit_status: exit?,
            captured_bytes: capture?,
            pool,
        })
    }
}

/// Stop listening when the capture can never be served.
///
/// A failed `wait` alone does not qualify: the capture may still be whole.
fn release_if_abandoned(running: &RunningPool, capture: &Result<u64, SubprocessError>) {
    if let Err(e) = capture {
        warn!(error = %e, "Capture failed, releasing listeners");
        running.cancellation().cancel();
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}
