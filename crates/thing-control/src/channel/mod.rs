//! The two long-running agent channels.
//!
//! - [`CommandHandler`] receives commands, dispatches their actions and sends
//!   the results back.
//! - [`StateUpdater`] periodically publishes the device state.
//!
//! Both run blocking I/O bounded by the socket timeouts and check the shared
//! shutdown signal between steps.

mod command;
mod report;

pub use command::CommandHandler;
pub use report::StateUpdater;

use std::sync::Arc;
use std::time::Duration;

use thing_core::Channel;
use thing_transport::Connector;

use crate::lifecycle::ShutdownCoordinator;
use crate::scheduler::{self, Scheduler};

/// Collaborators shared by both channels.
#[derive(Clone)]
pub struct ChannelContext {
    /// Opens connections to the cloud.
    pub connector: Arc<dyn Connector>,
    /// Shutdown signal and exit flags.
    pub coordinator: Arc<ShutdownCoordinator>,
    /// Pauses between iterations.
    pub scheduler: Arc<dyn Scheduler>,
    /// Longest single pause before re-checking for shutdown.
    pub poll_interval: Duration,
}

impl ChannelContext {
    /// Returns false once shutdown has been requested.
    #[must_use]
    pub fn running(&self, channel: Channel) -> bool {
        self.coordinator.should_continue(channel)
    }

    /// Pause `channel` for `total`, returning early on shutdown.
    ///
    /// Returns whether the channel should keep going.
    pub fn pause(&self, channel: Channel, total: Duration) -> bool {
        scheduler::pause(
            self.scheduler.as_ref(),
            &self.coordinator,
            channel,
            total,
            self.poll_interval,
        )
    }
}
