//! Redundant endpoint pool serving one capture.
//!
//! The [`BroadcastPool`] runs a fixed number of [`PipeEndpoint`]s under a
//! single channel name. They share one [`CancellationToken`]; the first
//! endpoint to deliver the whole capture raises it, which stops every
//! endpoint that is still listening and releases the channel so no new
//! client can connect. Endpoints that already hold a client finish their
//! transfer regardless.
//!
//! There is no timeout: if nobody ever connects, the pool waits forever.

mod endpoint;

pub use endpoint::{EndpointOutcome, EndpointState, PipeEndpoint};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info};

use crate::buffer::OutputReader;
use crate::transport::Channel;

/// Tally of endpoint outcomes once the pool has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub served: usize,
    pub canceled: usize,
    pub broken: usize,
    pub abandoned: usize,
}

impl PoolReport {
    fn record(&mut self, outcome: EndpointOutcome) {
        match outcome {
            EndpointOutcome::Served => self.served += 1,
            EndpointOutcome::Canceled => self.canceled += 1,
            EndpointOutcome::Broken => self.broken += 1,
            EndpointOutcome::Abandoned => self.abandoned += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.served + self.canceled + self.broken + self.abandoned
    }
}

/// Fixed-size set of endpoints over one channel.
pub struct BroadcastPool<C> {
    channel: C,
    redundancy: usize,
    cancel: CancellationToken,
}

impl<C: Channel> BroadcastPool<C> {
    /// Create a pool of `redundancy` endpoints, as resolved by the config.
    pub fn new(channel: C, redundancy: usize) -> Self {
        Self {
            channel,
            redundancy,
            cancel: CancellationToken::new(),
        }
    }

    pub const fn redundancy(&self) -> usize {
        self.redundancy
    }

    /// The shared signal that stops listening endpoints.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Create every instance, then spawn one task per endpoint.
    ///
    /// Instances are created up front so a failure leaves nothing running.
    pub fn start(self, output: &OutputReader) -> Result<RunningPool, PoolError> {
        let instances = (0..self.redundancy)
            .map(|slot| {
                self.channel
                    .instance(slot)
                    .map_err(|source| PoolError::Instance { slot, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut tasks = JoinSet::new();
        let mut states = Vec::with_capacity(instances.len());
        for (slot, instance) in instances.into_iter().enumerate() {
            let endpoint = PipeEndpoint::new(slot, instance, output.clone(), self.cancel.clone());
            states.push(endpoint.subscribe());
            tasks.spawn(endpoint.run());
        }
        info!(redundancy = self.redundancy, "Endpoint pool listening");

        // The pool's channel handle lives until cancellation. Canceled
        // endpoints drop their instances, so this is the last owner.
        let cancel = self.cancel.clone();
        let channel = self.channel;
        let release = AbortOnDropHandle::new(tokio::spawn(async move {
            cancel.cancelled().await;
            drop(channel);
            debug!("Channel released");
        }));

        Ok(RunningPool {
            release,
            tasks,
            states,
            cancel: self.cancel,
        })
    }

    /// Start the pool and wait for every endpoint to finish.
    pub async fn run(self, output: &OutputReader) -> Result<PoolReport, PoolError> {
        Ok(self.start(output)?.join().await)
    }
}

/// Handle to a started pool.
pub struct RunningPool {
    release: AbortOnDropHandle<()>,
    tasks: JoinSet<EndpointOutcome>,
    states: Vec<watch::Receiver<EndpointState>>,
    cancel: CancellationToken,
}

impl RunningPool {
    /// Per-slot state observers.
    pub fn states(&self) -> &[watch::Receiver<EndpointState>] {
        &self.states
    }

    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait until every endpoint reaches a terminal state.
    pub async fn join(mut self) -> PoolReport {
        let mut report = PoolReport::default();
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(error = %e, "Endpoint task failed");
                    report.broken += 1;
                }
            }
        }
        // Every endpoint may end without cancellation (all clients hung up).
        // Either way the channel is gone once this returns.
        self.release.abort();
        let _ = (&mut self.release).await;
        info!(
            served = report.served,
            canceled = report.canceled,
            broken = report.broken,
            abandoned = report.abandoned,
            "Endpoint pool finished"
        );
        report
    }
}

/// Errors from the endpoint pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to create endpoint {slot}: {source}")]
    Instance {
        slot: usize,
        #[source]
        source: std::io::Error,
    },
}
