//! Error types for the socket transport.

use std::io;

use thiserror::Error;

/// A result type using `TransportError`.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Hostname resolution failed.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// The host being resolved.
        host: String,
        /// The resolver error.
        #[source]
        source: io::Error,
    },

    /// Resolution succeeded but yielded no address.
    #[error("no address found for {0}")]
    NoAddress(String),

    /// The TCP connection could not be opened or configured.
    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    /// The host is not a valid TLS server name.
    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    /// TLS client setup failed before the handshake.
    #[error("tls setup failed: {0}")]
    Tls(#[from] rustls::Error),

    /// The TLS handshake failed.
    #[error("tls handshake failed: {0}")]
    Handshake(#[source] io::Error),
}

/// Errors reported by the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting failed; nothing is left attached to the caller.
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    /// Sending failed.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// Receiving failed for a reason other than timeout or peer close.
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),

    /// The TLS session could not be shut down cleanly.
    #[error("close failed: {0}")]
    Close(#[source] io::Error),
}

impl TransportError {
    /// Returns true if reconnecting may succeed.
    ///
    /// Every transport error only aborts the current connection; an invalid
    /// server name will fail the same way on every attempt.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        !matches!(self, Self::Connect(ConnectError::InvalidServerName(_)))
    }
}
