//! Counters for monitoring the round automation loop

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time copy of the automation counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Successful executeRound transactions
    pub rounds_executed: u64,
    /// executeRound attempts that failed without triggering recovery
    pub rounds_failed: u64,
    /// Ticks skipped because the contract was paused
    pub rounds_skipped_paused: u64,
    /// Missed-window recoveries
    pub recoveries: u64,
    /// Completed genesis sequences
    pub genesis_completed: u64,
    /// Pause/unpause resets issued during genesis
    pub genesis_resets: u64,
    /// Ticks that started later than the drift tolerance
    pub drift_warnings: u64,
}

/// Shared automation counters
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    rounds_executed: AtomicU64,
    rounds_failed: AtomicU64,
    rounds_skipped_paused: AtomicU64,
    recoveries: AtomicU64,
    genesis_completed: AtomicU64,
    genesis_resets: AtomicU64,
    drift_warnings: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_rounds_executed(&self) {
        self.inner.rounds_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rounds_failed(&self) {
        self.inner.rounds_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rounds_skipped_paused(&self) {
        self.inner.rounds_skipped_paused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_recoveries(&self) {
        self.inner.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_genesis_completed(&self) {
        self.inner.genesis_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_genesis_resets(&self) {
        self.inner.genesis_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_drift_warnings(&self) {
        self.inner.drift_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rounds_executed: self.inner.rounds_executed.load(Ordering::Relaxed),
            rounds_failed: self.inner.rounds_failed.load(Ordering::Relaxed),
            rounds_skipped_paused: self.inner.rounds_skipped_paused.load(Ordering::Relaxed),
            recoveries: self.inner.recoveries.load(Ordering::Relaxed),
            genesis_completed: self.inner.genesis_completed.load(Ordering::Relaxed),
            genesis_resets: self.inner.genesis_resets.load(Ordering::Relaxed),
            drift_warnings: self.inner.drift_warnings.load(Ordering::Relaxed),
        }
    }
}
