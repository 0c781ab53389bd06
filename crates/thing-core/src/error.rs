//! Common error types for the thing-agent crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing or converting core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A channel name did not match any known channel.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// A command identifier was empty.
    #[error("command identifier must not be empty")]
    EmptyCommandId,
}
