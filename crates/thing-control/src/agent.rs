//! Wiring of the two channels.

use std::sync::Arc;

use thing_core::Channel;
use thing_store::StateStore;

use crate::backoff::Backoff;
use crate::channel::{ChannelContext, CommandHandler, StateUpdater};
use crate::codec::JsonLinesCodec;
use crate::config::AgentConfig;
use crate::dispatch::ActionDispatcher;
use crate::error::Result;
use crate::indicator::Indicator;
use crate::scheduler::Task;

/// The assembled agent: shared collaborators plus configuration.
pub struct Agent {
    config: AgentConfig,
    ctx: ChannelContext,
    store: Arc<dyn StateStore>,
    indicator: Arc<dyn Indicator>,
}

impl Agent {
    /// Assemble an agent.
    #[must_use]
    pub fn new(
        config: AgentConfig,
        ctx: ChannelContext,
        store: Arc<dyn StateStore>,
        indicator: Arc<dyn Indicator>,
    ) -> Self {
        Self {
            config,
            ctx,
            store,
            indicator,
        }
    }

    /// The channel context shared by both channels.
    #[must_use]
    pub const fn context(&self) -> &ChannelContext {
        &self.ctx
    }

    /// Build the command channel.
    #[must_use]
    pub fn command_handler(&self) -> CommandHandler {
        CommandHandler::new(
            self.ctx.clone(),
            self.config.command_endpoint(),
            ActionDispatcher::new(Arc::clone(&self.store), Arc::clone(&self.indicator)),
            Box::new(JsonLinesCodec::new(self.config.command_buffer_size)),
            self.config.command_buffer_size,
            Backoff::new(self.config.reconnect_delay(), self.config.max_reconnect_delay()),
        )
    }

    /// Build the state report channel.
    #[must_use]
    pub fn state_updater(&self) -> StateUpdater {
        StateUpdater::new(
            self.ctx.clone(),
            self.config.report_endpoint(),
            Arc::clone(&self.store),
            self.config.report_buffer_size,
            self.config.update_period(),
        )
    }

    /// Start both channels on the scheduler.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Spawn` if a channel could not be started. A
    /// channel that never started is marked as exited, so waiting for exit
    /// still terminates.
    pub fn start(&self) -> Result<()> {
        let handler = self.command_handler();
        let updater = self.state_updater();

        let started = self.spawn(Channel::CommandHandler, Box::new(move || handler.run()));
        started.and(self.spawn(Channel::StateUpdater, Box::new(move || updater.run())))
    }

    fn spawn(&self, channel: Channel, task: Task) -> Result<()> {
        self.ctx
            .scheduler
            .spawn(channel.as_str(), task)
            .inspect_err(|e| {
                tracing::error!(channel = %channel, error = %e, "Failed to start channel");
                self.ctx.coordinator.request_shutdown();
                self.ctx.coordinator.on_exit(channel);
            })
    }
}
