//! Error types for action dispatch and the agent channels.

use thing_store::StoreError;
use thing_transport::TransportError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur while handling actions or running channels.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The action addressed an alias this device does not expose.
    #[error("invalid alias: {0}")]
    InvalidAlias(String),

    /// The action value has the wrong type.
    #[error("invalid value for {action}: expected boolean, got {found}")]
    InvalidValue {
        /// The action name.
        action: String,
        /// Type of the value that was received.
        found: &'static str,
    },

    /// Device state could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A command document could not be decoded or a result encoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A channel task could not be started.
    #[error("failed to spawn {0}")]
    Spawn(String),

    /// The agent configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ControlError {
    /// The message reported back to the cloud for a rejected action.
    #[must_use]
    pub fn report_message(&self) -> String {
        match self {
            Self::InvalidAlias(_) => "invalid alias".to_string(),
            Self::InvalidValue { .. } => "invalid value".to_string(),
            Self::Store(StoreError::Lock) => "fail to lock.".to_string(),
            Self::Store(StoreError::Sensor { code }) => {
                format!("fail to read temperature ({code}).")
            }
            other => other.to_string(),
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retriable(),
            Self::Transport(e) => e.is_retriable(),
            _ => false,
        }
    }
}
