//! Round scheduler
//!
//! Steady-state driver: once genesis has locked, `executeRound()` is sent on a
//! fixed cadence forever. Each tick is awaited to completion (including any
//! nested recovery) before the next one is scheduled.

pub mod schedule;
pub mod status;

pub use schedule::TickSchedule;
pub use status::{RoundPhase, StatusReporter};

use crate::chain::{ChainClient, FailureKind};
use crate::config::TimingConfig;
use crate::contract::{methods, ContractReader};
use crate::genesis::{next_epoch_after, GenesisError, GenesisInitializer, GENESIS_COMPLETE_EPOCH};
use crate::metrics::Metrics;
use crate::recovery::RecoveryHandler;
use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// What the status reporter is allowed to see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundProgress {
    /// Epoch the next `executeRound()` opens
    pub current_round: u64,
    /// When the live round started, as observed locally
    pub round_started: Instant,
}

/// Process-local loop state. Advanced locally on success and reconciled with
/// the chain at bootstrap and after every recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub current_round: u64,
    pub round_started: Instant,
    /// Rounds executed since genesis last locked
    pub rounds_since_genesis: u64,
}

impl SchedulerState {
    fn new(now: Instant) -> Self {
        Self {
            current_round: GENESIS_COMPLETE_EPOCH + 1,
            round_started: now,
            rounds_since_genesis: 0,
        }
    }

    fn advance(&mut self, now: Instant) {
        self.current_round += 1;
        self.round_started = now;
        self.rounds_since_genesis += 1;
    }

    fn reset(&mut self, next_epoch: u64, anchor: Instant) {
        self.current_round = next_epoch;
        self.round_started = anchor;
        self.rounds_since_genesis = 0;
    }

    pub fn progress(&self) -> RoundProgress {
        RoundProgress {
            current_round: self.current_round,
            round_started: self.round_started,
        }
    }
}

/// Result of one round-execution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Executed { epoch: u64, tx_hash: Option<String> },
    /// Contract paused; no write was issued
    SkippedPaused,
    /// Missed the buffer window; contract reset and genesis re-run
    Recovered { next_epoch: u64, completed_at: Instant },
    /// Any other failure; nothing changed, wait for the next tick
    Failed(FailureKind),
}

pub struct RoundScheduler {
    chain: Arc<dyn ChainClient>,
    reader: ContractReader,
    recovery: RecoveryHandler,
    timing: TimingConfig,
    check_paused: bool,
    metrics: Metrics,
    state: SchedulerState,
    progress_tx: watch::Sender<RoundProgress>,
}

impl RoundScheduler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contract: Address,
        timing: TimingConfig,
        check_paused: bool,
        genesis_max_attempts: u32,
        metrics: Metrics,
    ) -> Self {
        let reader = ContractReader::new(chain.clone(), contract);
        let genesis = GenesisInitializer::new(
            chain.clone(),
            contract,
            timing,
            genesis_max_attempts,
            metrics.clone(),
        );
        let recovery = RecoveryHandler::new(genesis, reader.clone(), metrics.clone());

        let state = SchedulerState::new(Instant::now());
        let (progress_tx, _) = watch::channel(state.progress());

        Self {
            chain,
            reader,
            recovery,
            timing,
            check_paused,
            metrics,
            state,
            progress_tx,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Read-only view of the round anchor for the status reporter
    pub fn subscribe(&self) -> watch::Receiver<RoundProgress> {
        self.progress_tx.subscribe()
    }

    fn publish(&self) {
        self.progress_tx.send_replace(self.state.progress());
    }

    /// Bring the contract to a state where rounds can execute and return the
    /// tick schedule. Tick 0 is due one alignment delay after genesis.
    pub async fn bootstrap(&mut self) -> Result<TickSchedule, GenesisError> {
        info!("Checking contract state...");
        let status = self.reader.genesis_status().await;
        info!(
            "Contract status: genesis started {} | genesis locked {}",
            if status.start_once { "yes" } else { "no" },
            if status.lock_once { "yes" } else { "no" }
        );

        let anchor = match status.entry() {
            Some(entry) => self.recovery.genesis().run(entry).await?.completed_at,
            None => {
                info!("Contract already initialized, starting round execution");
                Instant::now()
            }
        };

        let next_epoch = next_epoch_after(self.reader.current_epoch().await);
        self.state.reset(next_epoch, anchor);
        self.publish();

        info!(
            "Waiting {}s to align with blockchain timing (next round {})",
            self.timing.alignment_delay.as_secs(),
            next_epoch
        );
        Ok(TickSchedule::new(anchor + self.timing.alignment_delay, self.timing.round_interval))
    }

    /// One round-execution attempt. Only a fatal genesis failure during
    /// recovery is returned as an error.
    pub async fn tick(&mut self) -> Result<TickOutcome, GenesisError> {
        if self.check_paused && self.reader.is_paused().await {
            info!("[Round] Contract is paused. Skipping execution.");
            self.metrics.inc_rounds_skipped_paused();
            return Ok(TickOutcome::SkippedPaused);
        }

        let epoch = self.state.current_round;
        info!(
            "[Round] EXECUTING ROUND {} (locks {}, ends and settles {}, starts {})",
            epoch,
            epoch.saturating_sub(1),
            epoch.saturating_sub(2),
            epoch
        );

        match self.chain.send(self.reader.contract(), methods::EXECUTE_ROUND, &[]).await {
            Ok(receipt) => {
                info!("[Round] Round {} executed successfully", epoch);
                if let Some(hash) = &receipt.tx_hash {
                    info!("[Round]    TX: {}", hash);
                }
                self.metrics.inc_rounds_executed();
                self.state.advance(Instant::now());
                self.publish();
                Ok(TickOutcome::Executed {
                    epoch,
                    tx_hash: receipt.tx_hash,
                })
            }
            Err(e) if e.is_missed_window() => {
                error!("[Round] MISSED BUFFER WINDOW - recovering: {}", e.summary);
                let outcome = self.recovery.recover().await?;
                info!(
                    "[Round] Recovered after {} genesis attempt(s), resuming at round {}",
                    outcome.genesis_attempts, outcome.next_epoch
                );
                self.state.reset(outcome.next_epoch, outcome.completed_at);
                self.publish();
                Ok(TickOutcome::Recovered {
                    next_epoch: outcome.next_epoch,
                    completed_at: outcome.completed_at,
                })
            }
            Err(e) => {
                warn!("[Round] Execution failed ({}), waiting for next interval: {}", e.kind, e.summary);
                self.metrics.inc_rounds_failed();
                Ok(TickOutcome::Failed(e.kind))
            }
        }
    }

    /// Bootstrap, then execute rounds until a fatal genesis failure
    pub async fn run(&mut self) -> Result<(), GenesisError> {
        let mut schedule = self.bootstrap().await?;
        info!(
            "Continuous round execution every {}s",
            schedule.interval().as_secs()
        );

        let mut n: u64 = 0;
        loop {
            sleep_until(schedule.expected(n)).await;

            let late = schedule.lateness(n, Instant::now());
            if late > self.timing.drift_tolerance {
                warn!(
                    "[Round] Timing drift detected: tick {} started {}ms late",
                    n,
                    late.as_millis()
                );
                self.metrics.inc_drift_warnings();
            }

            if let TickOutcome::Recovered { completed_at, .. } = self.tick().await? {
                schedule = TickSchedule::new(
                    completed_at + self.timing.alignment_delay,
                    self.timing.round_interval,
                );
                n = 0;
                info!("[Round] Schedule re-anchored after recovery");
                continue;
            }

            // an overdue tick runs at once; the grid itself never moves
            n += 1;
            let now = Instant::now();
            if schedule.expected(n) < now {
                debug!(
                    "[Round] Tick {} already due, {}ms behind schedule",
                    n,
                    schedule.lateness(n, now).as_millis()
                );
            }

            debug!(
                "[Round] Next execution at {}",
                wall_clock_in(schedule.expected(n).saturating_duration_since(now))
            );
        }
    }
}

fn wall_clock_in(wait: Duration) -> String {
    let now = chrono::Local::now();
    chrono::Duration::from_std(wait)
        .map(|d| now + d)
        .unwrap_or(now)
        .format("%H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::FakeChain;

    const MISSED: &str = "Error: server returned an error response: error code 3: execution reverted: Can only lock round within bufferSeconds";

    fn scheduler(fake: &Arc<FakeChain>, check_paused: bool) -> RoundScheduler {
        RoundScheduler::new(
            fake.clone(),
            Address::ZERO,
            TimingConfig::default(),
            check_paused,
            5,
            Metrics::new(),
        )
    }

    fn ready_chain() -> Arc<FakeChain> {
        let fake = Arc::new(FakeChain::new());
        fake.set_read(methods::GENESIS_START_ONCE, "true\n");
        fake.set_read(methods::GENESIS_LOCK_ONCE, "true\n");
        fake.set_read(methods::PAUSED, "false\n");
        fake
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_tick_issues_no_write() {
        let fake = ready_chain();
        fake.set_read(methods::PAUSED, "true\n");
        let mut scheduler = scheduler(&fake, true);

        let outcome = scheduler.tick().await.unwrap();

        assert_eq!(outcome, TickOutcome::SkippedPaused);
        assert!(fake.sent().is_empty());
        assert_eq!(scheduler.state().current_round, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_check_disabled() {
        let fake = ready_chain();
        fake.set_read(methods::PAUSED, "true\n");
        let mut scheduler = scheduler(&fake, false);

        let outcome = scheduler.tick().await.unwrap();

        assert!(matches!(outcome, TickOutcome::Executed { epoch: 3, .. }));
        assert!(!fake.called().iter().any(|s| s == methods::PAUSED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_tick_advances_round() {
        let fake = ready_chain();
        let mut scheduler = scheduler(&fake, true);
        let progress = scheduler.subscribe();

        tokio::time::advance(Duration::from_secs(7)).await;
        let outcome = scheduler.tick().await.unwrap();

        match outcome {
            TickOutcome::Executed { epoch, tx_hash } => {
                assert_eq!(epoch, 3);
                assert!(tx_hash.is_some());
            }
            other => panic!("expected execution, got {:?}", other),
        }
        assert_eq!(scheduler.state().current_round, 4);
        assert_eq!(scheduler.state().rounds_since_genesis, 1);
        assert_eq!(progress.borrow().current_round, 4);
        assert_eq!(progress.borrow().round_started, Instant::now());
        assert_eq!(fake.sent(), vec![methods::EXECUTE_ROUND]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_window_triggers_recovery() {
        let fake = ready_chain();
        let mut scheduler = scheduler(&fake, true);

        scheduler.tick().await.unwrap();
        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.state().current_round, 5);

        fake.fail_send(methods::EXECUTE_ROUND, MISSED);
        let outcome = scheduler.tick().await.unwrap();

        assert!(matches!(outcome, TickOutcome::Recovered { next_epoch: 3, .. }));
        assert_eq!(scheduler.state().current_round, GENESIS_COMPLETE_EPOCH + 1);
        assert_eq!(scheduler.state().rounds_since_genesis, 0);
        assert_eq!(
            fake.sent()[2..].to_vec(),
            vec![
                methods::EXECUTE_ROUND,
                methods::PAUSE,
                methods::UNPAUSE,
                methods::GENESIS_START_ROUND,
                methods::GENESIS_LOCK_ROUND,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_reconciles_with_chain_epoch() {
        let fake = ready_chain();
        fake.set_read(methods::CURRENT_EPOCH, "2\n");
        fake.fail_send(methods::EXECUTE_ROUND, MISSED);
        let mut scheduler = scheduler(&fake, true);

        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.state().current_round, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failure_waits() {
        let fake = ready_chain();
        fake.fail_send(methods::EXECUTE_ROUND, "Error: nonce too low");
        let mut scheduler = scheduler(&fake, true);

        let outcome = scheduler.tick().await.unwrap();

        assert_eq!(outcome, TickOutcome::Failed(FailureKind::Transient));
        assert_eq!(scheduler.state().current_round, 3);
        assert_eq!(fake.sent(), vec![methods::EXECUTE_ROUND]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_runs_genesis_when_fresh() {
        let fake = Arc::new(FakeChain::new());
        fake.set_read(methods::GENESIS_START_ONCE, "false\n");
        fake.set_read(methods::GENESIS_LOCK_ONCE, "false\n");
        let mut scheduler = scheduler(&fake, true);
        let start = Instant::now();

        let schedule = scheduler.bootstrap().await.unwrap();

        assert_eq!(
            fake.sent(),
            vec![methods::GENESIS_START_ROUND, methods::GENESIS_LOCK_ROUND]
        );
        assert_eq!(scheduler.state().current_round, 3);
        assert_eq!(schedule.start(), start + Duration::from_secs(65));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_resumes_lock() {
        let fake = Arc::new(FakeChain::new());
        fake.set_read(methods::GENESIS_START_ONCE, "true\n");
        fake.set_read(methods::GENESIS_LOCK_ONCE, "false\n");
        let mut scheduler = scheduler(&fake, true);

        scheduler.bootstrap().await.unwrap();

        assert_eq!(fake.sent(), vec![methods::GENESIS_LOCK_ROUND]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_skips_genesis_when_ready() {
        let fake = ready_chain();
        fake.set_read(methods::CURRENT_EPOCH, "41\n");
        let mut scheduler = scheduler(&fake, true);
        let start = Instant::now();

        let schedule = scheduler.bootstrap().await.unwrap();

        assert!(fake.sent().is_empty());
        assert_eq!(scheduler.state().current_round, 42);
        assert_eq!(schedule.start(), start + Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_executes_on_fixed_cadence() {
        let fake = ready_chain();
        fake.set_read(methods::CURRENT_EPOCH, "7\n");
        let mut scheduler = scheduler(&fake, true);

        // ticks due at 5s, 35s, 65s, 95s
        let result = tokio::time::timeout(Duration::from_secs(100), scheduler.run()).await;

        assert!(result.is_err(), "run loop should still be going");
        assert_eq!(fake.sent_count(methods::EXECUTE_ROUND), 4);
        assert_eq!(scheduler.state().current_round, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_on_time_reports_no_drift() {
        let fake = ready_chain();
        let metrics = Metrics::new();
        let mut scheduler =
            RoundScheduler::new(fake.clone(), Address::ZERO, TimingConfig::default(), true, 5, metrics.clone());

        let _ = tokio::time::timeout(Duration::from_secs(100), scheduler.run()).await;

        assert_eq!(metrics.snapshot().rounds_executed, 4);
        assert_eq!(metrics.snapshot().drift_warnings, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sends_run_overdue_ticks_and_count_drift() {
        let fake = ready_chain();
        fake.set_send_delay(Duration::from_secs(40));
        let metrics = Metrics::new();
        let mut scheduler =
            RoundScheduler::new(fake.clone(), Address::ZERO, TimingConfig::default(), true, 5, metrics.clone());

        // tick 0 due at 5s; each 40s send makes the next tick start late:
        // tick 1 at 45s (10s late), tick 2 at 85s, tick 3 at 125s, tick 4 at 165s, tick 5 at 205s
        let result = tokio::time::timeout(Duration::from_secs(210), scheduler.run()).await;

        assert!(result.is_err());
        assert_eq!(fake.sent_count(methods::EXECUTE_ROUND), 5);
        assert_eq!(metrics.snapshot().rounds_executed, 5);
        assert_eq!(metrics.snapshot().drift_warnings, 5);
        assert_eq!(scheduler.state().current_round, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_resumes_after_recovery() {
        let fake = ready_chain();
        fake.fail_send(methods::EXECUTE_ROUND, MISSED);
        let mut scheduler = scheduler(&fake, true);

        // failed tick at 5s, recovery locks at 69s, ticks resume at 74s and 104s
        let result = tokio::time::timeout(Duration::from_secs(110), scheduler.run()).await;

        assert!(result.is_err());
        assert_eq!(fake.sent_count(methods::EXECUTE_ROUND), 3);
        assert_eq!(fake.sent_count(methods::GENESIS_START_ROUND), 1);
        assert_eq!(scheduler.state().current_round, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_fatal_genesis() {
        let fake = Arc::new(FakeChain::new());
        fake.fail_send(methods::GENESIS_START_ROUND, "Error: insufficient funds for gas * price + value");
        let mut scheduler = scheduler(&fake, true);

        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, GenesisError::StartFailed(_)));
        assert_eq!(fake.sent_count(methods::EXECUTE_ROUND), 0);
    }
}
