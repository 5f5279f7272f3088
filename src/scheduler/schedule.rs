//! Anchored tick timing
//!
//! Tick `n` is due at `start + n * interval` regardless of when tick `n - 1`
//! finished, so slow calls never push the cadence back cumulatively.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSchedule {
    start: Instant,
    interval: Duration,
}

impl TickSchedule {
    /// `interval` must be non-zero
    pub fn new(start: Instant, interval: Duration) -> Self {
        Self { start, interval }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When tick `n` is due
    pub fn expected(&self, n: u64) -> Instant {
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        self.start + self.interval.saturating_mul(n)
    }

    /// How late `now` is for tick `n`; zero if early
    pub fn lateness(&self, n: u64, now: Instant) -> Duration {
        now.saturating_duration_since(self.expected(n))
    }
}
