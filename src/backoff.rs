//! Reconnection backoff policy.

use std::time::Duration;

/// Exponential backoff with a cap.
///
/// The delay is slept after a failed connect attempt and then doubled;
/// a successful connection resets it to the initial value.
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    /// Create a policy with the given initial and maximum delays.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            current: initial,
            initial,
            max,
        }
    }

    /// The delay to sleep after the failure just observed.
    ///
    /// Doubles the stored delay (capped at the maximum) for the next
    /// failure and returns the delay for this one.
    pub fn failure_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Reset to the initial delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
