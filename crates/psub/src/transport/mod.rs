//! Platform channel facility.
//!
//! A [`Channel`] is one externally visible name backed by several server-side
//! instances. Each [`ChannelInstance`] accepts exactly one client and hands
//! back a write-only connection. On Windows the instances are named pipe
//! servers sharing a pipe name; on unix they share one listening socket.

#[cfg(test)]
pub mod memory;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWrite;
use uuid::Uuid;

#[cfg(unix)]
pub use unix::{UnixChannel as PlatformChannel, UnixInstance};
#[cfg(windows)]
pub use windows::{NamedPipeChannel as PlatformChannel, NamedPipeInstance};

/// Creates the server-side instances behind one channel name.
pub trait Channel: Send + Sync + 'static {
    type Instance: ChannelInstance;

    /// Create the instance for `slot` (0-based).
    fn instance(&self, slot: usize) -> io::Result<Self::Instance>;
}

/// One server-side instance, consumed by accepting a single client.
///
/// Dropping the instance, or the future returned by `accept`, releases it.
pub trait ChannelInstance: Send + 'static {
    type Conn: AsyncWrite + Unpin + Send + 'static;

    fn accept(self) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

/// Session-scoped channel identity, generated once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName {
    session_id: Uuid,
    address: PathBuf,
}

impl ChannelName {
    /// Generate a fresh identity. `socket_dir` is only used on unix.
    pub fn generate(socket_dir: Option<&Path>) -> Self {
        Self::with_session_id(Uuid::new_v4(), socket_dir)
    }

    pub fn with_session_id(session_id: Uuid, socket_dir: Option<&Path>) -> Self {
        Self {
            session_id,
            address: platform_address(session_id, socket_dir),
        }
    }

    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Address clients connect to.
    pub fn address(&self) -> &Path {
        &self.address
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address.display())
    }
}

#[cfg(windows)]
fn platform_address(session_id: Uuid, _socket_dir: Option<&Path>) -> PathBuf {
    PathBuf::from(format!(r"\\.\pipe\psub-{session_id}"))
}

#[cfg(not(windows))]
fn platform_address(session_id: Uuid, socket_dir: Option<&Path>) -> PathBuf {
    let dir = socket_dir.map_or_else(default_socket_dir, Path::to_path_buf);
    dir.join(format!("psub-{session_id}.sock"))
}

#[cfg(not(windows))]
fn default_socket_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}

/// Create the platform channel for `name` with `redundancy` instances.
///
/// `redundancy` is expected to be resolved already (see
/// [`psub_core::config::BroadcastConfig::effective_redundancy`]).
pub fn bind(name: &ChannelName, redundancy: usize) -> Result<PlatformChannel, ChannelError> {
    PlatformChannel::bind(name, redundancy)
}

/// Why a write to a client failed.
#[derive(Debug, thiserror::Error)]
pub enum WriteFailure {
    /// The client closed its end. Expected; clients may open speculatively.
    #[error("peer disconnected: {0}")]
    PeerDisconnected(#[source] io::Error),

    #[error("write failed: {0}")]
    Io(#[source] io::Error),
}

/// Classify a write error by its kind, never by its message.
pub fn classify_write_error(err: io::Error) -> WriteFailure {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::WriteZero
        | io::ErrorKind::UnexpectedEof => WriteFailure::PeerDisconnected(err),
        _ => WriteFailure::Io(err),
    }
}

/// Errors creating a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("redundancy {0} is out of range for this platform")]
    InvalidRedundancy(usize),

    #[error("Failed to create channel {address}: {source}")]
    Create {
        address: String,
        #[source]
        source: io::Error,
    },
}
