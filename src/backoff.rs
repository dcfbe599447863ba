//! Reconnect delays.
//!
//! Delays start at one second and double with every attempt up to a minute,
//! with random jitter so that many clients losing the same node do not
//! reconnect in lockstep. Attempts are unbounded.

use std::time::Duration;

use exponential_backoff::Backoff;

/// Exponentially growing delays between reconnect attempts.
#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    backoff: Backoff,
    attempt: usize,
}

impl ReconnectBackoff {
    pub const MIN_DELAY: Duration = Duration::from_secs(1);
    pub const MAX_DELAY: Duration = Duration::from_secs(60);

    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            backoff: Backoff::new(u32::MAX, min, max),
            attempt: 0,
        }
    }

    /// Returns the delay before the next attempt and counts the attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = (&self.backoff)
            .into_iter()
            .nth(self.attempt)
            .flatten()
            .unwrap_or(Self::MAX_DELAY);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempt
    }

    /// Starts over at the minimum delay, after a successful attempt.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Self::MIN_DELAY, Self::MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_stay_capped() {
        let max = Duration::from_millis(800);
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(100), max);

        let delays: Vec<_> = (0..10).map(|_| backoff.next_delay()).collect();
        assert_eq!(backoff.attempts(), 10);
        assert!(delays.iter().all(|delay| *delay <= max * 2));
        assert!(delays[9] > delays[0]);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = ReconnectBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert!(backoff.next_delay() < Duration::from_secs(10));
    }
}
