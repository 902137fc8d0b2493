use std::time::Duration;

use tokio::time::Instant;

/// First wait after a failed pass.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(30);

/// Longest wait between timer-driven retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// Exponential backoff window for one collection.
#[derive(Debug, Default, Clone)]
pub struct Backoff {
    failures: u32,
    until: Option<Instant>,
}

impl Backoff {
    /// Delay that follows `failures` consecutive failures.
    pub fn delay_for(failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        INITIAL_BACKOFF
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }

    /// Open (or widen) the window. Returns its length.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = Self::delay_for(self.failures);
        self.until = Some(now + delay);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.until = None;
    }

    pub fn is_waiting(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
