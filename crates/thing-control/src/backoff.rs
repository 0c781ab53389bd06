//! Reconnect pacing.

use std::time::Duration;

/// Exponential reconnect delay: `base * 2^(attempt - 1)`, capped at `max`.
///
/// Attempt 0 (the first connect) is not delayed.
#[must_use]
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let shift = attempt.saturating_sub(1).min(30);
    base.saturating_mul(1 << shift).min(max)
}

/// Tracks consecutive failures of one channel.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    /// Create a backoff starting at `base` and never exceeding `max`.
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        reconnect_delay(self.failures, self.base, self.max)
    }

    /// Forget past failures once a session delivered data.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(1000);
    const MAX: Duration = Duration::from_millis(30_000);

    #[test]
    fn first_attempt_is_immediate() {
        assert_eq!(reconnect_delay(0, BASE, MAX), Duration::ZERO);
    }

    #[test]
    fn doubles_until_cap() {
        assert_eq!(reconnect_delay(1, BASE, MAX), Duration::from_secs(1));
        assert_eq!(reconnect_delay(2, BASE, MAX), Duration::from_secs(2));
        assert_eq!(reconnect_delay(5, BASE, MAX), Duration::from_secs(16));
        assert_eq!(reconnect_delay(6, BASE, MAX), MAX);
        assert_eq!(reconnect_delay(u32::MAX, BASE, MAX), MAX);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::new(BASE, MAX);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.failures(), 2);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
