//! Missed-window recovery
//!
//! When `executeRound()` lands outside the buffer window the contract cannot
//! advance on its own. Recovery pauses and unpauses it (clearing the genesis
//! flags), runs genesis again from scratch and works out the next epoch.

use crate::contract::ContractReader;
use crate::genesis::{next_epoch_after, GenesisEntry, GenesisError, GenesisInitializer};
use crate::metrics::Metrics;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RecoveryOutcome {
    /// Epoch the next `executeRound()` is expected to open
    pub next_epoch: u64,
    /// When genesis locked again
    pub completed_at: Instant,
    pub genesis_attempts: u32,
}

pub struct RecoveryHandler {
    genesis: GenesisInitializer,
    reader: ContractReader,
    metrics: Metrics,
}

impl RecoveryHandler {
    pub fn new(genesis: GenesisInitializer, reader: ContractReader, metrics: Metrics) -> Self {
        Self { genesis, reader, metrics }
    }

    pub fn genesis(&self) -> &GenesisInitializer {
        &self.genesis
    }

    /// Reset the contract and rebuild round state from genesis.
    ///
    /// The next epoch is re-read from the chain; if that read fails it is
    /// assumed to be the first round after genesis.
    pub async fn recover(&self) -> Result<RecoveryOutcome, GenesisError> {
        warn!("[Recovery] Missed buffer window, resetting contract");
        self.metrics.inc_recoveries();

        self.genesis.reset_contract().await;

        info!("[Recovery] Re-initializing from genesis");
        let outcome = self.genesis.run(GenesisEntry::Fresh).await?;

        let on_chain = self.reader.current_epoch().await;
        let next_epoch = next_epoch_after(on_chain);
        match on_chain {
            Some(epoch) => info!("[Recovery] Complete. On-chain epoch {}, next round {}", epoch, next_epoch),
            None => warn!("[Recovery] Complete. Epoch unreadable, assuming next round {}", next_epoch),
        }

        Ok(RecoveryOutcome {
            next_epoch,
            completed_at: outcome.completed_at,
            genesis_attempts: outcome.attempts,
        })
    }
}
