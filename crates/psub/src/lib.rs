//! psub Library
//!
//! Runs a child process, captures its stdout in memory and serves the
//! complete capture to any client that connects to an announced local
//! channel:
//! - Write-once output buffer with a completion latch
//! - Child spawning and stdout draining
//! - Named pipe / unix socket channel facility
//! - Redundant endpoint pool with shared cancellation
//! - Session orchestration

pub mod buffer;
pub mod pool;
pub mod session;
pub mod subprocess;
pub mod transport;

pub use buffer::{CaptureAbandoned, OutputReader, OutputWriter, output_buffer};
pub use pool::{BroadcastPool, EndpointOutcome, EndpointState, PoolReport};
pub use session::{Session, SessionError, SessionReport};
pub use subprocess::{CommandSpec, SubprocessError};
pub use transport::ChannelName;
