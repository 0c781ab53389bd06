//! Scripted in-memory transport for tests.
//!
//! A [`ScriptedConnector`] hands out queued [`ScriptedSession`]s in order and
//! records everything the caller sends on each of them.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{ConnectError, Result, TransportError};
use crate::tls::{classify_read, empty_receive_buffer};
use crate::{Connection, Connector, EndpointConfig, Received};

/// How long an exhausted session waits before reporting a timeout.
const IDLE_RECEIVE_DELAY: Duration = Duration::from_millis(5);

/// One scripted receive outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Deliver these bytes, split across receives if the buffer is small.
    Data(Vec<u8>),
    /// Report a receive timeout.
    WouldBlock,
    /// Report a peer close.
    Closed,
    /// Fail the receive with this I/O error kind.
    Fail(io::ErrorKind),
}

/// The script for one connection.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSession {
    steps: VecDeque<ScriptStep>,
    max_send: Option<usize>,
    fail_send: Option<io::ErrorKind>,
    fail_close: bool,
}

impl ScriptedSession {
    /// Create a session that only ever times out on receive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a receive step.
    #[must_use]
    pub fn then(mut self, step: ScriptStep) -> Self {
        self.steps.push_back(step);
        self
    }

    /// Append a data step.
    #[must_use]
    pub fn then_data(self, data: impl Into<Vec<u8>>) -> Self {
        self.then(ScriptStep::Data(data.into()))
    }

    /// Accept at most `n` bytes per send call.
    #[must_use]
    pub fn with_max_send(mut self, n: usize) -> Self {
        self.max_send = Some(n);
        self
    }

    /// Fail every send with this error kind.
    #[must_use]
    pub fn fail_send(mut self, kind: io::ErrorKind) -> Self {
        self.fail_send = Some(kind);
        self
    }

    /// Fail the TLS shutdown on close.
    #[must_use]
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

enum Planned {
    Session(ScriptedSession),
    Refuse,
}

#[derive(Default)]
struct Inner {
    planned: VecDeque<Planned>,
    sent: Vec<Vec<u8>>,
    connects: usize,
    closes: usize,
    endpoints: Vec<EndpointConfig>,
}

/// A connector replaying queued sessions.
///
/// Cloning shares the queue and the recordings.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedConnector {
    /// Create a connector with nothing queued; every connect is refused.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session for the next connect.
    pub fn push_session(&self, session: ScriptedSession) {
        self.inner.lock().planned.push_back(Planned::Session(session));
    }

    /// Queue a refused connect.
    pub fn push_connect_failure(&self) {
        self.inner.lock().planned.push_back(Planned::Refuse);
    }

    /// Bytes sent on each connection, in connect order.
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.lock().sent.clone()
    }

    /// Number of connect attempts, successful or not.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.inner.lock().connects
    }

    /// Number of connections closed.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.inner.lock().closes
    }

    /// Endpoints passed to each connect attempt.
    #[must_use]
    pub fn endpoints(&self) -> Vec<EndpointConfig> {
        self.inner.lock().endpoints.clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, endpoint: &EndpointConfig) -> Result<Box<dyn Connection>> {
        let mut inner = self.inner.lock();
        inner.connects += 1;
        inner.endpoints.push(endpoint.clone());

        match inner.planned.pop_front() {
            Some(Planned::Session(script)) => {
                let index = inner.sent.len();
                inner.sent.push(Vec::new());
                Ok(Box::new(ScriptedConnection {
                    script,
                    pending: Vec::new(),
                    index,
                    inner: Arc::clone(&self.inner),
                }))
            }
            Some(Planned::Refuse) | None => Err(TransportError::Connect(ConnectError::Socket(
                io::ErrorKind::ConnectionRefused.into(),
            ))),
        }
    }
}

struct ScriptedConnection {
    script: ScriptedSession,
    pending: Vec<u8>,
    index: usize,
    inner: Arc<Mutex<Inner>>,
}

impl Connection for ScriptedConnection {
    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        if let Some(kind) = self.script.fail_send {
            return Err(TransportError::Send(kind.into()));
        }
        let n = self.script.max_send.map_or(buf.len(), |max| max.min(buf.len()));
        self.inner.lock().sent[self.index].extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Received> {
        if buf.is_empty() {
            return Err(TransportError::Recv(empty_receive_buffer()));
        }
        if self.pending.is_empty() {
            match self.script.steps.pop_front() {
                Some(ScriptStep::Data(data)) => self.pending = data,
                Some(ScriptStep::WouldBlock) => return Ok(Received::WouldBlock),
                Some(ScriptStep::Closed) => return Ok(Received::Closed),
                Some(ScriptStep::Fail(kind)) => return classify_read(Err(kind.into())),
                None => {
                    std::thread::sleep(IDLE_RECEIVE_DELAY);
                    return Ok(Received::WouldBlock);
                }
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(Received::Data(n))
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.inner.lock().closes += 1;
        if self.script.fail_close {
            return Err(TransportError::Close(io::ErrorKind::InvalidData.into()));
        }
        Ok(())
    }
}
