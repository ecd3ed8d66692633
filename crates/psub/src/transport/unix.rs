//! Unix domain socket channel.
//!
//! All instances share one listener. Each instance performs a single
//! `accept`, so concurrent clients are spread over whichever instances are
//! idle. The socket file is removed when the last handle goes away.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use super::{Channel, ChannelError, ChannelInstance, ChannelName};

#[derive(Debug)]
struct BoundSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl Drop for BoundSocket {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove socket file");
            }
        }
    }
}

/// Listening socket shared by every endpoint of the pool.
#[derive(Debug, Clone)]
pub struct UnixChannel {
    socket: Arc<BoundSocket>,
}

impl UnixChannel {
    pub(super) fn bind(name: &ChannelName, _redundancy: usize) -> Result<Self, ChannelError> {
        let path = name.address().to_path_buf();
        let create_err = |source| ChannelError::Create {
            address: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(create_err)?;
        }
        let listener = UnixListener::bind(&path).map_err(create_err)?;
        debug!(path = %path.display(), "Unix channel bound");
        Ok(Self {
            socket: Arc::new(BoundSocket { listener, path }),
        })
    }
}

impl Channel for UnixChannel {
    type Instance = UnixInstance;

    fn instance(&self, _slot: usize) -> io::Result<UnixInstance> {
        Ok(UnixInstance {
            socket: Arc::clone(&self.socket),
        })
    }
}

/// One pending `accept` on the shared listener.
#[derive(Debug)]
pub struct UnixInstance {
    socket: Arc<BoundSocket>,
}

impl ChannelInstance for UnixInstance {
    type Conn = UnixStream;

    async fn accept(self) -> io::Result<UnixStream> {
        let (stream, _addr) = self.socket.listener.accept().await?;
        Ok(stream)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn instances_share_one_socket() {
        let dir = tempfile::tempdir().unwrap();
        let name = ChannelName::generate(Some(dir.path()));
        let channel = UnixChannel::bind(&name, 2).unwrap();
        assert!(name.address().exists());

        let first = channel.instance(0).unwrap();
        let second = channel.instance(1).unwrap();
        let a = tokio::spawn(first.accept());
        let b = tokio::spawn(second.accept());

        let mut c1 = UnixStream::connect(name.address()).await.unwrap();
        let mut c2 = UnixStream::connect(name.address()).await.unwrap();

        let mut s1 = a.await.unwrap().unwrap();
        let mut s2 = b.await.unwrap().unwrap();
        s1.write_all(b"x").await.unwrap();
        s2.write_all(b"x").await.unwrap();
        drop((s1, s2));

        let mut got = Vec::new();
        c1.read_to_end(&mut got).await.unwrap();
        c2.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"xx");
    }

    #[tokio::test]
    async fn socket_file_removed_with_last_handle() {
        let dir = tempfile::tempdir().unwrap();
        let name = ChannelName::generate(Some(dir.path()));
        let channel = UnixChannel::bind(&name, 1).unwrap();
        let instance = channel.instance(0).unwrap();

        drop(channel);
        assert!(name.address().exists(), "instance still holds the socket");
        drop(instance);
        assert!(!name.address().exists());
    }

    #[tokio::test]
    async fn bind_fails_when_address_taken() {
        let dir = tempfile::tempdir().unwrap();
        let name = ChannelName::generate(Some(dir.path()));
        let _channel = UnixChannel::bind(&name, 1).unwrap();

        let err = UnixChannel::bind(&name, 1).unwrap_err();
        assert!(matches!(err, ChannelError::Create { .. }));
    }
}
