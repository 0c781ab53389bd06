//! Cooperative channel lifecycle.
//!
//! One shared shutdown signal, one termination flag per channel:
//!
//! ```text
//!   running ──request_shutdown()──▶ draining ──all flags set──▶ exited
//! ```
//!
//! Channels poll [`ShutdownCoordinator::should_continue`] between blocking
//! steps and report completion through an [`ExitGuard`]. The process waits in
//! [`ShutdownCoordinator::wait_for_exit`] until every channel has reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thing_core::Channel;

/// Shared shutdown signal and per-channel termination flags.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    shutdown: AtomicBool,
    exited: [AtomicBool; Channel::ALL.len()],
}

impl ShutdownCoordinator {
    /// Create a coordinator with nothing requested and nothing exited.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false once shutdown has been requested. Never blocks.
    #[must_use]
    pub fn should_continue(&self, channel: Channel) -> bool {
        let keep_going = !self.shutdown.load(Ordering::Acquire);
        if !keep_going {
            tracing::trace!(channel = %channel, "Shutdown observed");
        }
        keep_going
    }

    /// Request shutdown of every channel.
    ///
    /// Returns true if this call flipped the signal. Safe to call from a
    /// signal context: a single atomic swap.
    pub fn request_shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::AcqRel)
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Record that `channel` has finished.
    pub fn on_exit(&self, channel: Channel) {
        if self.exited[channel.index()].swap(true, Ordering::AcqRel) {
            tracing::debug!(channel = %channel, "Channel already reported exit");
        } else {
            tracing::info!(channel = %channel, "Channel exited");
        }
    }

    /// Returns true if `channel` has reported exit.
    #[must_use]
    pub fn has_exited(&self, channel: Channel) -> bool {
        self.exited[channel.index()].load(Ordering::Acquire)
    }

    /// Returns true once every channel has reported exit.
    #[must_use]
    pub fn all_exited(&self) -> bool {
        Channel::ALL.iter().all(|&channel| self.has_exited(channel))
    }

    /// Wait until every channel has exited, checking every `poll_interval`.
    pub async fn wait_for_exit(&self, poll_interval: Duration) {
        let mut announced = false;
        while !self.all_exited() {
            if !announced && self.is_shutdown_requested() {
                tracing::info!("Waiting for channels to exit");
                announced = true;
            }
            tokio::time::sleep(poll_interval).await;
        }
        tracing::info!("All channels exited");
    }
}

/// Reports a channel's exit when dropped, including during a panic unwind.
#[must_use = "the exit is reported when the guard is dropped"]
pub struct ExitGuard {
    coordinator: Arc<ShutdownCoordinator>,
    channel: Channel,
}

impl ExitGuard {
    /// Arm a guard for `channel`.
    pub const fn new(coordinator: Arc<ShutdownCoordinator>, channel: Channel) -> Self {
        Self {
            coordinator,
            channel,
        }
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.coordinator.on_exit(self.channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn continue_until_requested() {
        let coordinator = ShutdownCoordinator::new();
        assert!(coordinator.should_continue(Channel::CommandHandler));
        assert!(coordinator.should_continue(Channel::StateUpdater));

        assert!(coordinator.request_shutdown());
        assert!(!coordinator.request_shutdown());

        assert!(!coordinator.should_continue(Channel::CommandHandler));
        assert!(!coordinator.should_continue(Channel::StateUpdater));
    }

    #[test]
    fn exit_flags_are_per_channel() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.on_exit(Channel::CommandHandler);
        assert!(coordinator.has_exited(Channel::CommandHandler));
        assert!(!coordinator.has_exited(Channel::StateUpdater));
        assert!(!coordinator.all_exited());

        coordinator.on_exit(Channel::CommandHandler);
        coordinator.on_exit(Channel::StateUpdater);
        assert!(coordinator.all_exited());
    }

    #[test]
    fn guard_reports_on_panic() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let shared = Arc::clone(&coordinator);
        let result = thread::spawn(move || {
            let _guard = ExitGuard::new(shared, Channel::StateUpdater);
            panic!("channel failed");
        })
        .join();

        assert!(result.is_err());
        assert!(coordinator.has_exited(Channel::StateUpdater));
    }

    #[tokio::test]
    async fn wait_returns_after_all_exit() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        coordinator.request_shutdown();

        let shared = Arc::clone(&coordinator);
        let worker = thread::spawn(move || {
            for channel in Channel::ALL {
                let _guard = ExitGuard::new(Arc::clone(&shared), channel);
                thread::sleep(Duration::from_millis(20));
            }
        });

        let poll = Duration::from_millis(10);
        let started = Instant::now();
        coordinator.wait_for_exit(poll).await;
        assert!(coordinator.all_exited());
        assert!(started.elapsed() < Duration::from_secs(2));
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_exited() {
        let coordinator = ShutdownCoordinator::new();
        for channel in Channel::ALL {
            coordinator.on_exit(channel);
        }
        tokio::time::timeout(Duration::from_millis(100), coordinator.wait_for_exit(Duration::from_secs(5)))
            .await
            .unwrap();
    }
}
