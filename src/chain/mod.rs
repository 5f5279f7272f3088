//! Chain command execution
//!
//! Contract reads and writes go through [`ChainClient`]. The production
//! implementation shells out to Foundry's `cast`; tests swap in a scripted
//! client.

pub mod cast;
pub mod errors;

#[cfg(test)]
pub(crate) mod fake;

pub use cast::CastClient;
pub use errors::{ChainError, FailureKind};

use alloy::primitives::Address;
use async_trait::async_trait;

/// Parsed result of a successful `send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: Option<String>,
    pub status: u64,
}

/// Read/write access to contracts on the configured network.
///
/// Calls are issued and awaited one at a time by the callers; implementations
/// do not retry.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Read-only call, returns the raw decoded output text
    async fn call(&self, to: Address, signature: &str, args: &[String]) -> Result<String, ChainError>;

    /// Signed state-changing transaction, waits for the receipt
    async fn send(&self, to: Address, signature: &str, args: &[String]) -> Result<TxReceipt, ChainError>;
}
