//! Reconnect backoff: exponential growth from an initial delay up to a cap.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
    cap: Duration,
    multiplier: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 2)
    }
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration, multiplier: u32) -> Self {
        Self {
            initial,
            current: initial,
            cap: cap.max(initial),
            multiplier: multiplier.max(1),
        }
    }

    /// The delay to wait now; advances the schedule for the next call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(self.multiplier)
            .unwrap_or(self.cap)
            .min(self.cap);
        delay
    }

    /// Back to the initial delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}
