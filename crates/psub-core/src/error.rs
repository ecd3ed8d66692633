//! Error types for `psub` core library.

use thiserror::Error;

/// Result type alias using `psub` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `psub` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
