//! A single channel endpoint.
//!
//! Lifecycle: `Listening` until a client arrives or the pool cancels, then
//! `Connected` -> `Serving` -> `Served` | `Broken`. Once a client has been
//! accepted, cancellation no longer applies to this endpoint.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::OutputReader;
use crate::transport::{ChannelInstance, WriteFailure, classify_write_error};

/// Observable endpoint state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Listening,
    Connected,
    Serving,
    Served,
    Canceled,
    Broken,
    Abandoned,
}

impl EndpointState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Served | Self::Canceled | Self::Broken | Self::Abandoned
        )
    }

    /// A client has been accepted (whether or not it has been served yet).
    pub const fn has_client(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Serving | Self::Served | Self::Broken | Self::Abandoned
        )
    }
}

/// Terminal result of [`PipeEndpoint::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointOutcome {
    /// The whole capture reached the client.
    Served,
    /// Stopped listening because a sibling already served a client.
    Canceled,
    /// The accept failed or the client went away mid-transfer.
    Broken,
    /// A client was accepted but the capture never completed.
    Abandoned,
}

impl From<EndpointOutcome> for EndpointState {
    fn from(outcome: EndpointOutcome) -> Self {
        match outcome {
            EndpointOutcome::Served => Self::Served,
            EndpointOutcome::Canceled => Self::Canceled,
            EndpointOutcome::Broken => Self::Broken,
            EndpointOutcome::Abandoned => Self::Abandoned,
        }
    }
}

pub struct PipeEndpoint<I> {
    slot: usize,
    instance: I,
    output: OutputReader,
    cancel: CancellationToken,
    state: watch::Sender<EndpointState>,
}

impl<I: ChannelInstance> PipeEndpoint<I> {
    pub fn new(slot: usize, instance: I, output: OutputReader, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(EndpointState::Listening);
        Self {
            slot,
            instance,
            output,
            cancel,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EndpointState> {
        self.state.subscribe()
    }

    /// Drive the endpoint to a terminal state. Never fails: every outcome is
    /// local to this endpoint.
    pub async fn run(self) -> EndpointOutcome {
        let Self {
            slot,
            instance,
            output,
            cancel,
            state,
        } = self;
        let finish = |outcome: EndpointOutcome| {
            state.send_replace(outcome.into());
            outcome
        };

        debug!(slot, "Waiting for connection");
        let accepted = tokio::select! {
            biased;
            result = instance.accept() => result,
            () = cancel.cancelled() => {
                debug!(slot, "Stopped listening, output already delivered");
                return finish(EndpointOutcome::Canceled);
            }
        };
        let mut conn = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                debug!(slot, error = %e, "Accept failed");
                return finish(EndpointOutcome::Broken);
            }
        };
        state.send_replace(EndpointState::Connected);
        debug!(slot, "Received connection");

        let Ok(data) = output.wait().await else {
            warn!(slot, "Capture abandoned, closing connection without data");
            return finish(EndpointOutcome::Abandoned);
        };
        state.send_replace(EndpointState::Serving);
        debug!(slot, bytes = data.len(), "Serving output");

        if let Err(e) = conn.write_all(&data).await {
            match classify_write_error(e) {
                WriteFailure::PeerDisconnected(e) => {
                    debug!(slot, error = %e, "Client disconnected mid-transfer");
                }
                WriteFailure::Io(e) => warn!(slot, error = %e, "Write to client failed"),
            }
            return finish(EndpointOutcome::Broken);
        }
        close(slot, &mut conn, data.len()).await;

        let outcome = finish(EndpointOutcome::Served);
        cancel.cancel();
        info!(slot, bytes = data.len(), "Delivered full output, closing listeners");
        outcome
    }
}

/// Every byte is already with the transport, so a failing shutdown only
/// means the client hung up after the last write.
async fn close<C: AsyncWrite + Unpin>(slot: usize, conn: &mut C, bytes: usize) {
    if let Err(e) = conn.shutdown().await {
        debug!(slot, bytes, error = %e, "Shutdown after full write failed");
    }
}
