//! Round phase status reporter
//!
//! Runs beside the round loop on a faster cadence. It only reads the latest
//! [`RoundProgress`] published by the scheduler and owns its own price cache.

use super::RoundProgress;
use crate::oracle::PriceFetcher;
use colored::Colorize;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Where the current round is within its interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Bets accepted; `lock_at` is seconds from round start
    Betting { elapsed: u64, lock_at: u64 },
    /// Price locked, waiting for the next execution
    Locked { elapsed: u64, close_at: u64 },
}

impl RoundPhase {
    /// `None` once the interval has fully elapsed
    pub fn at(elapsed: Duration, interval: Duration, buffer: Duration) -> Option<Self> {
        if elapsed >= interval {
            return None;
        }

        let secs = elapsed.as_secs();
        let lock_at = interval.saturating_sub(buffer);
        if elapsed < lock_at {
            Some(RoundPhase::Betting { elapsed: secs, lock_at: lock_at.as_secs() })
        } else {
            Some(RoundPhase::Locked { elapsed: secs, close_at: interval.as_secs() })
        }
    }
}

pub struct StatusReporter {
    progress: watch::Receiver<RoundProgress>,
    every: Duration,
    round_interval: Duration,
    buffer: Duration,
    prices: Option<PriceFetcher>,
}

impl StatusReporter {
    pub fn new(
        progress: watch::Receiver<RoundProgress>,
        every: Duration,
        round_interval: Duration,
        buffer: Duration,
        prices: Option<PriceFetcher>,
    ) -> Self {
        Self {
            progress,
            every,
            round_interval,
            buffer,
            prices,
        }
    }

    /// Print a status line every `every` until the task is aborted
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Some(line) = self.report().await {
                println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line);
            }
        }
    }

    /// Status line for the current instant, `None` between rounds
    pub async fn report(&mut self) -> Option<String> {
        let progress = *self.progress.borrow();
        let elapsed = Instant::now().saturating_duration_since(progress.round_started);
        let phase = RoundPhase::at(elapsed, self.round_interval, self.buffer)?;

        let price = match self.prices.as_mut() {
            Some(fetcher) => {
                let price = fetcher.fetch().await;
                if price > Decimal::ZERO {
                    format!(" | Price: ${:.2}", price)
                } else {
                    String::new()
                }
            }
            None => String::new(),
        };

        let line = match phase {
            RoundPhase::Betting { elapsed, lock_at } => format!(
                "{} Round {} ({}/{}s until lock){}",
                "Betting active".green(),
                progress.current_round.saturating_sub(1),
                elapsed,
                lock_at,
                price
            ),
            RoundPhase::Locked { elapsed, close_at } => format!(
                "{} Round {} ({}/{}s until resolution){}",
                "Price locked".yellow(),
                progress.current_round.saturating_sub(1),
                elapsed,
                close_at,
                price
            ),
        };
        Some(line)
    }
}
