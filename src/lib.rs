//! Round Keeper Library
//!
//! Operator automation for an up/down price prediction contract. All chain
//! access goes through the `cast` CLI:
//!
//! 1. **Genesis**: `genesisStartRound()` then, one interval later,
//!    `genesisLockRound()`, resetting via pause/unpause when the lock misses
//!    its buffer window.
//!
//! 2. **Rounds**: `executeRound()` on a fixed cadence, with recovery back
//!    through genesis whenever a round lands outside the buffer window.

pub mod chain;
pub mod config;
pub mod contract;
pub mod genesis;
pub mod metrics;
pub mod oracle;
pub mod recovery;
pub mod scheduler;

pub use chain::{cast::CastClient, ChainClient, ChainError, FailureKind, TxReceipt};
pub use config::{Config, TimingConfig};
pub use contract::{ContractReader, GenesisStatus, RoundConfig, RoundData, RoundSnapshot};
pub use genesis::{GenesisEntry, GenesisError, GenesisInitializer};
pub use metrics::{Metrics, MetricsSnapshot};
pub use oracle::{PriceFetcher, PriceSource};
pub use recovery::RecoveryHandler;
pub use scheduler::{RoundScheduler, StatusReporter, TickOutcome};
