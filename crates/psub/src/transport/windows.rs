//! Windows named pipe channel.
//!
//! Every instance is its own pipe server under the same name, created up
//! front with `max_instances` set to the pool size. The OS routes each
//! client open to an idle instance.

use std::io;

use tokio::net::windows::named_pipe::{NamedPipeServer, PipeMode, ServerOptions};
use tracing::debug;

use super::{Channel, ChannelError, ChannelInstance, ChannelName};

/// Upper bound on pipe instances accepted by the OS.
const MAX_PIPE_INSTANCES: usize = 254;

#[derive(Debug, Clone)]
pub struct NamedPipeChannel {
    address: String,
    redundancy: usize,
}

impl NamedPipeChannel {
    pub(super) fn bind(name: &ChannelName, redundancy: usize) -> Result<Self, ChannelError> {
        if redundancy > MAX_PIPE_INSTANCES {
            return Err(ChannelError::InvalidRedundancy(redundancy));
        }
        let address = name.address().display().to_string();
        debug!(%address, redundancy, "Named pipe channel prepared");
        Ok(Self {
            address,
            redundancy,
        })
    }

    fn options(&self, slot: usize) -> ServerOptions {
        let mut options = ServerOptions::new();
        options
            .first_pipe_instance(slot == 0)
            .access_inbound(false)
            .access_outbound(true)
            .pipe_mode(PipeMode::Byte)
            .max_instances(self.redundancy);
        options
    }
}

impl Channel for NamedPipeChannel {
    type Instance = NamedPipeInstance;

    fn instance(&self, slot: usize) -> io::Result<NamedPipeInstance> {
        let server = self.options(slot).create(&self.address)?;
        Ok(NamedPipeInstance { server })
    }
}

/// One pipe server waiting for its client.
#[derive(Debug)]
pub struct NamedPipeInstance {
    server: NamedPipeServer,
}

impl ChannelInstance for NamedPipeInstance {
    type Conn = NamedPipeServer;

    async fn accept(self) -> io::Result<NamedPipeServer> {
        self.server.connect().await?;
        Ok(self.server)
    }
}
