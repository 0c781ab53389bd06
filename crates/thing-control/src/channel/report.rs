use std::sync::Arc;
use std::time::Duration;

use thing_core::Channel;
use thing_store::{ChunkedStateSerializer, StateStore};
use thing_transport::{Connection, EndpointConfig};

use super::ChannelContext;
use crate::error::{ControlError, Result};
use crate::lifecycle::ExitGuard;

const CHANNEL: Channel = Channel::StateUpdater;

/// Publishes the device state once per period.
pub struct StateUpdater {
    ctx: ChannelContext,
    endpoint: EndpointConfig,
    store: Arc<dyn StateStore>,
    buffer_size: usize,
    period: Duration,
}

impl StateUpdater {
    /// Create an updater sending through a buffer of `buffer_size` bytes.
    #[must_use]
    pub fn new(
        ctx: ChannelContext,
        endpoint: EndpointConfig,
        store: Arc<dyn StateStore>,
        buffer_size: usize,
        period: Duration,
    ) -> Self {
        Self {
            ctx,
            endpoint,
            store,
            buffer_size,
            period,
        }
    }

    /// Report now and then every period until shutdown is requested.
    pub fn run(self) {
        let _guard = ExitGuard::new(Arc::clone(&self.ctx.coordinator), CHANNEL);
        let mut buf = vec![0u8; self.buffer_size.max(1)];
        tracing::info!(endpoint = %self.endpoint, period_s = self.period.as_secs(), "State updater started");

        while self.ctx.running(CHANNEL) {
            match self.report_once(&mut buf) {
                Ok(sent) => tracing::debug!(bytes = sent, "State reported"),
                Err(ControlError::Store(e)) => {
                    tracing::warn!(error = %e, "Skipping state report");
                }
                Err(e) => tracing::warn!(error = %e, "State report failed"),
            }
            if !self.ctx.pause(CHANNEL, self.period) {
                break;
            }
        }

        tracing::info!("State updater stopping");
    }

    /// Run one report cycle: connect, send the rendered state, close.
    ///
    /// Returns the number of bytes sent, including the terminating newline.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Transport` if the connection fails, or
    /// `ControlError::Store` if the state could not be read. The connection is
    /// closed in every case. An empty `buf` is rejected with
    /// `ControlError::Config` before connecting.
    pub fn report_once(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(ControlError::Config("report buffer is empty".into()));
        }
        let mut conn = self.ctx.connector.connect(&self.endpoint)?;
        let sent = self.send_report(conn.as_mut(), buf);
        let closed = conn.close();

        let sent = sent?;
        if let Err(e) = closed {
            tracing::warn!(error = %e, "Failed to close report channel");
        }
        Ok(sent)
    }

    fn send_report(&self, conn: &mut dyn Connection, buf: &mut [u8]) -> Result<usize> {
        let mut serializer = ChunkedStateSerializer::new(self.store.as_ref());
        let mut sent = 0;
        loop {
            let n = serializer.read_chunk(buf)?;
            if n == 0 {
                break;
            }
            conn.send_all(&buf[..n])?;
            sent += n;
        }
        conn.send_all(b"\n")?;
        Ok(sent + 1)
    }
}
