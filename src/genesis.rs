//! Genesis initializer
//!
//! The prediction contract needs `genesisStartRound()` (opens round 1) and,
//! one interval later, `genesisLockRound()` (locks round 1, opens round 2)
//! before `executeRound()` is valid. A lock that misses the buffer window
//! leaves the contract stuck; the only way out is pause/unpause, which clears
//! the genesis flags, followed by a fresh start.
//!
//! ```text
//! NotStarted --start ok--> Started --lock ok--> Locked
//!      ^                      |
//!      |                  lock failed
//!      |                      v
//!      +----pause/unpause-- LockFailed
//! ```

use crate::chain::{ChainClient, ChainError, TxReceipt};
use crate::config::TimingConfig;
use crate::contract::methods;
use crate::metrics::Metrics;
use alloy::primitives::Address;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

/// Epoch the contract is on once genesis has locked
pub const GENESIS_COMPLETE_EPOCH: u64 = 2;

/// Next epoch `executeRound()` will open, given the on-chain epoch if known
pub fn next_epoch_after(on_chain_epoch: Option<u64>) -> u64 {
    on_chain_epoch.unwrap_or(GENESIS_COMPLETE_EPOCH) + 1
}

/// How the sequence is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenesisEntry {
    /// Nothing started yet (or flags were reset)
    Fresh,
    /// Contract reports started but not locked, e.g. after a process restart
    ResumeLock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenesisState {
    NotStarted,
    Started,
    LockFailed,
    Locked,
}

#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error("genesisStartRound failed: {0}")]
    StartFailed(#[source] ChainError),

    #[error("genesis did not lock after {attempts} attempts")]
    GaveUp { attempts: u32 },
}

/// Result of a completed genesis sequence
#[derive(Debug, Clone, Copy)]
pub struct GenesisOutcome {
    /// Full start/lock attempts used, including the successful one
    pub attempts: u32,
    /// When the sequence reached `Locked`
    pub completed_at: Instant,
}

pub struct GenesisInitializer {
    chain: Arc<dyn ChainClient>,
    contract: Address,
    timing: TimingConfig,
    max_attempts: u32,
    metrics: Metrics,
}

impl GenesisInitializer {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contract: Address,
        timing: TimingConfig,
        max_attempts: u32,
        metrics: Metrics,
    ) -> Self {
        Self {
            chain,
            contract,
            timing,
            max_attempts: max_attempts.max(1),
            metrics,
        }
    }

    /// Drive the sequence to `Locked`.
    ///
    /// A failed start is fatal. A failed lock resets the contract and starts
    /// over, at most `max_attempts` times in total.
    pub async fn run(&self, entry: GenesisEntry) -> Result<GenesisOutcome, GenesisError> {
        info!("[Genesis] Initializing ({:?})", entry);

        let mut attempts: u32 = 1;
        let mut state = match entry {
            GenesisEntry::Fresh => GenesisState::NotStarted,
            GenesisEntry::ResumeLock => {
                info!(
                    "[Genesis] Already started, waiting {}s before locking",
                    self.timing.resume_delay.as_secs()
                );
                sleep(self.timing.resume_delay).await;
                GenesisState::Started
            }
        };

        loop {
            state = match state {
                GenesisState::NotStarted => {
                    self.send(methods::GENESIS_START_ROUND, "Starting Round 1")
                        .await
                        .map_err(|e| {
                            error!("[Genesis] Failed to start genesis: {}", e);
                            GenesisError::StartFailed(e)
                        })?;

                    info!(
                        "[Genesis] Waiting {}s for Round 1 to reach lockTimestamp",
                        self.timing.round_interval.as_secs()
                    );
                    sleep(self.timing.round_interval).await;
                    GenesisState::Started
                }
                GenesisState::Started => {
                    match self.send(methods::GENESIS_LOCK_ROUND, "Locking Round 1, starting Round 2").await {
                        Ok(_) => {
                            info!(
                                "[Genesis] Waiting {}s for Round 2 to reach lockTimestamp",
                                self.timing.round_interval.as_secs()
                            );
                            sleep(self.timing.round_interval).await;
                            GenesisState::Locked
                        }
                        Err(e) => {
                            warn!("[Genesis] Lock failed ({}): {}", e.kind, e.summary);
                            GenesisState::LockFailed
                        }
                    }
                }
                GenesisState::LockFailed => {
                    if attempts >= self.max_attempts {
                        error!("[Genesis] Giving up after {} attempts", attempts);
                        return Err(GenesisError::GaveUp { attempts });
                    }

                    info!("[Genesis] Round 1 likely exceeded the buffer window, resetting contract");
                    self.metrics.inc_genesis_resets();
                    self.reset_contract().await;
                    attempts += 1;
                    info!("[Genesis] Restarting (attempt {}/{})", attempts, self.max_attempts);
                    GenesisState::NotStarted
                }
                GenesisState::Locked => {
                    info!("[Genesis] Initialization complete after {} attempt(s)", attempts);
                    self.metrics.inc_genesis_completed();
                    return Ok(GenesisOutcome {
                        attempts,
                        completed_at: Instant::now(),
                    });
                }
            };
        }
    }

    /// Pause then unpause, which clears the genesis flags. Failures are logged
    /// and do not stop the sequence.
    pub async fn reset_contract(&self) {
        match self.chain.send(self.contract, methods::PAUSE, &[]).await {
            Ok(_) => info!("[Reset] Contract paused"),
            Err(e) => warn!("[Reset] Pause failed: {}", e),
        }
        sleep(self.timing.reset_delay).await;

        match self.chain.send(self.contract, methods::UNPAUSE, &[]).await {
            Ok(_) => info!("[Reset] Contract unpaused (genesis reset)"),
            Err(e) => warn!("[Reset] Unpause failed: {}", e),
        }
        sleep(self.timing.reset_delay).await;
    }

    async fn send(&self, signature: &str, description: &str) -> Result<TxReceipt, ChainError> {
        info!("[Genesis] {} ({})...", description, signature);
        let receipt = self.chain.send(self.contract, signature, &[]).await?;
        match &receipt.tx_hash {
            Some(hash) => info!("[Genesis] {} successful, tx {}", description, hash),
            None => info!("[Genesis] {} successful", description),
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::FakeChain;
    use crate::chain::FailureKind;
    use std::time::Duration;

    const LOCK_MISSED: &str = "Error: execution reverted: Can only lock round within bufferSeconds";

    fn initializer(fake: &Arc<FakeChain>, max_attempts: u32) -> GenesisInitializer {
        GenesisInitializer::new(
            fake.clone(),
            Address::ZERO,
            TimingConfig::default(),
            max_attempts,
            Metrics::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_genesis_locks() {
        let fake = Arc::new(FakeChain::new());
        let start = Instant::now();

        let outcome = initializer(&fake, 5).run(GenesisEntry::Fresh).await.unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            fake.sent(),
            vec![methods::GENESIS_START_ROUND, methods::GENESIS_LOCK_ROUND]
        );
        // one interval after start, one after lock
        assert_eq!(outcome.completed_at - start, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_start() {
        let fake = Arc::new(FakeChain::new());
        let start = Instant::now();

        let outcome = initializer(&fake, 5).run(GenesisEntry::ResumeLock).await.unwrap();

        assert_eq!(fake.sent(), vec![methods::GENESIS_LOCK_ROUND]);
        assert_eq!(outcome.completed_at - start, Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_is_fatal() {
        let fake = Arc::new(FakeChain::new());
        fake.fail_send(methods::GENESIS_START_ROUND, "Error: execution reverted: Ownable: caller is not the operator");

        let err = initializer(&fake, 5).run(GenesisEntry::Fresh).await.unwrap_err();

        match err {
            GenesisError::StartFailed(e) => assert_eq!(e.kind, FailureKind::Reverted),
            other => panic!("expected StartFailed, got {:?}", other),
        }
        assert_eq!(fake.sent(), vec![methods::GENESIS_START_ROUND]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_failure_resets_and_restarts() {
        let fake = Arc::new(FakeChain::new());
        fake.fail_send(methods::GENESIS_LOCK_ROUND, LOCK_MISSED);
        let metrics = Metrics::new();
        let genesis = GenesisInitializer::new(
            fake.clone(),
            Address::ZERO,
            TimingConfig::default(),
            5,
            metrics.clone(),
        );

        let outcome = genesis.run(GenesisEntry::Fresh).await.unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(
            fake.sent(),
            vec![
                methods::GENESIS_START_ROUND,
                methods::GENESIS_LOCK_ROUND,
                methods::PAUSE,
                methods::UNPAUSE,
                methods::GENESIS_START_ROUND,
                methods::GENESIS_LOCK_ROUND,
            ]
        );
        assert_eq!(metrics.snapshot().genesis_resets, 1);
        assert_eq!(metrics.snapshot().genesis_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_lock_failure_restarts_from_scratch() {
        let fake = Arc::new(FakeChain::new());
        fake.fail_send(methods::GENESIS_LOCK_ROUND, LOCK_MISSED);

        initializer(&fake, 5).run(GenesisEntry::ResumeLock).await.unwrap();

        assert_eq!(
            fake.sent(),
            vec![
                methods::GENESIS_LOCK_ROUND,
                methods::PAUSE,
                methods::UNPAUSE,
                methods::GENESIS_START_ROUND,
                methods::GENESIS_LOCK_ROUND,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_lock_failures_eventually_lock() {
        let fake = Arc::new(FakeChain::new());
        for _ in 0..3 {
            fake.fail_send(methods::GENESIS_LOCK_ROUND, LOCK_MISSED);
        }

        let outcome = initializer(&fake, 5).run(GenesisEntry::Fresh).await.unwrap();

        assert_eq!(outcome.attempts, 4);
        assert_eq!(fake.sent_count(methods::GENESIS_START_ROUND), 4);
        assert_eq!(fake.sent_count(methods::PAUSE), 3);
        assert_eq!(fake.sent_count(methods::UNPAUSE), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let fake = Arc::new(FakeChain::new());
        for _ in 0..3 {
            fake.fail_send(methods::GENESIS_LOCK_ROUND, LOCK_MISSED);
        }

        let err = initializer(&fake, 3).run(GenesisEntry::Fresh).await.unwrap_err();

        assert!(matches!(err, GenesisError::GaveUp { attempts: 3 }));
        assert_eq!(fake.sent_count(methods::GENESIS_LOCK_ROUND), 3);
        // no reset after the final failure
        assert_eq!(fake.sent_count(methods::PAUSE), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_continues_past_pause_failure() {
        let fake = Arc::new(FakeChain::new());
        fake.fail_send(methods::PAUSE, "Error: execution reverted: Pausable: paused");

        initializer(&fake, 5).reset_contract().await;

        assert_eq!(fake.sent(), vec![methods::PAUSE, methods::UNPAUSE]);
    }

    #[test]
    fn test_next_epoch_after() {
        assert_eq!(next_epoch_after(None), GENESIS_COMPLETE_EPOCH + 1);
        assert_eq!(next_epoch_after(Some(2)), 3);
        assert_eq!(next_epoch_after(Some(41)), 42);
    }
}
