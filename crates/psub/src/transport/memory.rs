//! In-process channel over Tokio duplex streams, for tests.

use std::io;
use std::sync::Arc;

use tokio::io::DuplexStream;
use tokio::sync::{Mutex, mpsc};

use super::{Channel, ChannelInstance};

/// Pipe capacity of each simulated connection.
const DUPLEX_CAPACITY: usize = 64;

/// Test double for a platform channel. Clients come from [`MemoryConnector`].
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    incoming: Arc<Mutex<mpsc::UnboundedReceiver<DuplexStream>>>,
}

/// Client side of a [`MemoryChannel`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    tx: mpsc::UnboundedSender<DuplexStream>,
}

pub fn memory_channel() -> (MemoryChannel, MemoryConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryChannel {
            incoming: Arc::new(Mutex::new(rx)),
        },
        MemoryConnector { tx },
    )
}

impl MemoryConnector {
    /// Open a connection; some idle instance will accept it.
    pub fn connect(&self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
        // A closed channel just leaves the client with an immediate EOF.
        let _ = self.tx.send(server);
        client
    }
}

impl Channel for MemoryChannel {
    type Instance = MemoryInstance;

    fn instance(&self, _slot: usize) -> io::Result<MemoryInstance> {
        Ok(MemoryInstance {
            incoming: Arc::clone(&self.incoming),
        })
    }
}

#[derive(Debug)]
pub struct MemoryInstance {
    incoming: Arc<Mutex<mpsc::UnboundedReceiver<DuplexStream>>>,
}

impl ChannelInstance for MemoryInstance {
    type Conn = DuplexStream;

    async fn accept(self) -> io::Result<DuplexStream> {
        let mut incoming = self.incoming.lock().await;
        incoming
            .recv()
            .await
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionAborted))
    }
}
