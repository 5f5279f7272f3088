//! Prediction contract state reader
//!
//! Best-effort probes over [`ChainClient`]. None of them return an error:
//! a failed or undecodable read is logged and degrades to a safe default so
//! probing can never take the scheduler down.

pub mod decode;
pub mod types;

pub use decode::{parse_bool, parse_price_output, parse_round_output, parse_u64};
pub use types::{format_native, GenesisStatus, PriceQuote, RoundConfig, RoundData, RoundSnapshot};

use crate::chain::ChainClient;
use alloy::primitives::Address;
use std::sync::Arc;
use tracing::warn;

/// Function signatures on the prediction contract
pub mod methods {
    pub const GENESIS_START_ROUND: &str = "genesisStartRound()";
    pub const GENESIS_LOCK_ROUND: &str = "genesisLockRound()";
    pub const EXECUTE_ROUND: &str = "executeRound()";
    pub const PAUSE: &str = "pause()";
    pub const UNPAUSE: &str = "unpause()";

    pub const GENESIS_START_ONCE: &str = "genesisStartOnce()(bool)";
    pub const GENESIS_LOCK_ONCE: &str = "genesisLockOnce()(bool)";
    pub const PAUSED: &str = "paused()(bool)";
    pub const CURRENT_EPOCH: &str = "currentEpoch()(uint256)";
    pub const INTERVAL_SECONDS: &str = "intervalSeconds()(uint256)";
    pub const BUFFER_SECONDS: &str = "bufferSeconds()(uint256)";
    pub const ROUNDS: &str = "rounds(uint256)(uint256,uint256,uint256,uint256,int256,int256,uint256,uint256,uint256,uint256,uint256,uint256,uint256,bool)";
}

/// Reads lifecycle flags and round data from the prediction contract
#[derive(Clone)]
pub struct ContractReader {
    chain: Arc<dyn ChainClient>,
    contract: Address,
}

impl ContractReader {
    pub fn new(chain: Arc<dyn ChainClient>, contract: Address) -> Self {
        Self { chain, contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    async fn probe(&self, signature: &str, args: &[String]) -> Option<String> {
        match self.chain.call(self.contract, signature, args).await {
            Ok(output) => Some(output),
            Err(e) => {
                warn!("[Reader] {} failed: {}", signature, e);
                None
            }
        }
    }

    /// Both genesis flags; reported as not started if either read fails
    pub async fn genesis_status(&self) -> GenesisStatus {
        let Some(start) = self.probe(methods::GENESIS_START_ONCE, &[]).await else {
            return GenesisStatus::default();
        };
        let Some(lock) = self.probe(methods::GENESIS_LOCK_ONCE, &[]).await else {
            return GenesisStatus::default();
        };

        GenesisStatus {
            start_once: parse_bool(&start),
            lock_once: parse_bool(&lock),
        }
    }

    /// Treated as not paused if the read fails
    pub async fn is_paused(&self) -> bool {
        self.probe(methods::PAUSED, &[])
            .await
            .map(|out| parse_bool(&out))
            .unwrap_or(false)
    }

    pub async fn current_epoch(&self) -> Option<u64> {
        let output = self.probe(methods::CURRENT_EPOCH, &[]).await?;
        let epoch = parse_u64(&output);
        if epoch.is_none() {
            warn!("[Reader] Could not decode currentEpoch output: {:?}", output.trim());
        }
        epoch
    }

    pub async fn round(&self, epoch: u64) -> Option<RoundData> {
        let output = self.probe(methods::ROUNDS, &[epoch.to_string()]).await?;
        let round = parse_round_output(&output);
        if round.is_none() {
            warn!("[Reader] Could not decode rounds({}) output", epoch);
        }
        round
    }

    /// The round at `currentEpoch()`. Epoch 0 means nothing has started and
    /// the rounds mapping is not queried.
    pub async fn current_round(&self) -> RoundSnapshot {
        match self.current_epoch().await {
            None => RoundSnapshot::Unavailable,
            Some(0) => RoundSnapshot::NotStarted,
            Some(epoch) => match self.round(epoch).await {
                Some(round) => RoundSnapshot::Active(round),
                None => RoundSnapshot::Unavailable,
            },
        }
    }

    pub async fn round_config(&self) -> Option<RoundConfig> {
        let interval = self.probe(methods::INTERVAL_SECONDS, &[]).await?;
        let buffer = self.probe(methods::BUFFER_SECONDS, &[]).await?;

        Some(RoundConfig {
            interval_seconds: parse_u64(&interval)?,
            buffer_seconds: parse_u64(&buffer)?,
        })
    }
}
