//! TLS socket transport for thing-agent.
//!
//! Both agent channels talk to the cloud through the same primitive: a TLS
//! session over a TCP socket whose receive and send calls are bounded by
//! per-endpoint timeouts. The bound is what lets a channel notice a shutdown
//! request while it waits for data.
//!
//! # Receive outcomes
//!
//! [`Connection::receive`] separates the three outcomes a caller must handle
//! differently:
//!
//! - [`Received::Data`]: bytes to process
//! - [`Received::WouldBlock`]: nothing yet (timeout); retry after the next
//!   continuation check
//! - [`Received::Closed`]: the peer closed the connection; not an error
//!
//! Anything else is a [`TransportError::Recv`] and the connection must be
//! abandoned.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use thing_transport::{Connector, EndpointConfig, Received, TlsConnector};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = TlsConnector::with_webpki_roots()?;
//! let endpoint = EndpointConfig::new("example.com", 443)
//!     .with_timeouts(Duration::from_secs(15), Duration::from_secs(15));
//!
//! let mut conn = connector.connect(&endpoint)?;
//! conn.send(b"ping\n")?;
//! let mut buf = [0u8; 1024];
//! match conn.receive(&mut buf)? {
//!     Received::Data(n) => println!("{n} bytes"),
//!     Received::WouldBlock => println!("nothing yet"),
//!     Received::Closed => println!("peer closed"),
//! }
//! conn.close()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod tls;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::{ConnectError, Result, TransportError};
pub use tls::{classify_read, TlsConnection, TlsConnector};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{ScriptStep, ScriptedConnector, ScriptedSession};

use std::fmt;
use std::time::Duration;

/// Where and how one channel connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Host name (also used as the TLS server name).
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Receive timeout; zero disables it.
    pub recv_timeout: Duration,
    /// Send timeout; zero disables it.
    pub send_timeout: Duration,
}

impl EndpointConfig {
    /// Default receive and send timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Create an endpoint with the default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            recv_timeout: Self::DEFAULT_TIMEOUT,
            send_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Replace both timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, recv_timeout: Duration, send_timeout: Duration) -> Self {
        self.recv_timeout = recv_timeout;
        self.send_timeout = send_timeout;
        self
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Outcome of a successful receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// This many bytes were written to the start of the buffer.
    Data(usize),
    /// No data arrived before the receive timeout; retry.
    WouldBlock,
    /// The peer closed the connection.
    Closed,
}

/// Opens connections to an endpoint.
pub trait Connector: Send + Sync {
    /// Resolve, connect, apply timeouts, and complete the TLS handshake.
    ///
    /// On failure nothing stays attached to the caller.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connect` describing the step that failed.
    fn connect(&self, endpoint: &EndpointConfig) -> Result<Box<dyn Connection>>;
}

/// A live connection. Owned by exactly one channel.
pub trait Connection: Send {
    /// Send some of `buf`, returning how many bytes were accepted.
    ///
    /// Bytes counted as accepted have been handed to the socket.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Send` if the socket rejected the write.
    fn send(&mut self, buf: &[u8]) -> Result<usize>;

    /// Receive into `buf`, which must not be empty.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Recv` on any failure other than a timeout or a
    /// peer close, including an empty `buf`.
    fn receive(&mut self, buf: &mut [u8]) -> Result<Received>;

    /// Shut the session down and release the socket.
    ///
    /// Consumes the connection, so it runs at most once per connect. Resources
    /// are released whether or not the shutdown was clean.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Close` on a protocol-level shutdown failure.
    fn close(self: Box<Self>) -> Result<()>;

    /// Send all of `buf`, looping over partial sends.
    ///
    /// # Errors
    ///
    /// Returns the first send error.
    fn send_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.send(buf)?;
            if n == 0 {
                return Err(TransportError::Send(std::io::ErrorKind::WriteZero.into()));
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}
