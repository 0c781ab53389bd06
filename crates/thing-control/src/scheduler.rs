//! Task scheduling capability for the channels.

use std::time::Duration;

use thing_core::Channel;
use tokio::runtime::Handle;

use crate::error::{ControlError, Result};
use crate::lifecycle::ShutdownCoordinator;

/// A unit of long-running work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Starts channel tasks and pauses them.
pub trait Scheduler: Send + Sync {
    /// Start `task` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Spawn` if the task could not be started.
    fn spawn(&self, name: &str, task: Task) -> Result<()>;

    /// Block the calling task for `duration`.
    fn delay(&self, duration: Duration);
}

/// Runs tasks on the tokio blocking pool.
///
/// Channel I/O blocks on socket timeouts, so each channel gets a blocking
/// thread rather than an async task.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Create a scheduler on an explicit runtime.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a scheduler on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Spawn` if called outside a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ControlError::Spawn(format!("scheduler: {e}")))
    }
}

impl Scheduler for TokioScheduler {
    fn spawn(&self, name: &str, task: Task) -> Result<()> {
        let name = name.to_string();
        tracing::debug!(task = %name, "Starting task");
        // The join handle is dropped; completion is reported through the
        // coordinator instead.
        drop(self.handle.spawn_blocking(move || {
            let _span = tracing::info_span!("task", name = %name).entered();
            task();
        }));
        Ok(())
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Pause `channel` for `total`, waking every `slice` to check for shutdown.
///
/// Returns the continuation predicate after the pause.
pub fn pause(
    scheduler: &dyn Scheduler,
    coordinator: &ShutdownCoordinator,
    channel: Channel,
    total: Duration,
    slice: Duration,
) -> bool {
    let slice = if slice.is_zero() { total } else { slice };
    let mut remaining = total;
    while !remaining.is_zero() {
        if !coordinator.should_continue(channel) {
            return false;
        }
        let step = remaining.min(slice);
        scheduler.delay(step);
        remaining = remaining.saturating_sub(step);
    }
    coordinator.should_continue(channel)
}
