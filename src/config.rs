//! Configuration management for the round keeper

use crate::oracle::PriceSource;
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Pyth ETH/USD price feed id
pub const ETH_USD_PRICE_ID: &str = "0xff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace";

pub const DEFAULT_RPC_URL: &str = "https://alfajores-forno.celo-testnet.org";
pub const DEFAULT_HERMES_URL: &str = "https://hermes.pyth.network";

/// Operator private key. Never printed.
#[derive(Clone)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

/// Round keeper configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Network RPC endpoint passed to cast
    pub rpc_url: String,

    /// Prediction contract address
    pub contract_address: Address,

    /// Operator key (optional, only needed for write calls)
    pub private_key: Option<SecretKey>,

    /// Address derived from `private_key`
    pub operator: Option<Address>,

    /// Path or name of the cast binary
    pub cast_bin: String,

    /// Probe `paused()` before each round execution
    pub check_paused: bool,

    /// Full start/lock attempts before genesis gives up
    pub genesis_max_attempts: u32,

    /// Fallback buffer when the contract value cannot be read
    pub buffer_seconds: u64,

    pub timing: TimingConfig,

    /// Price display (optional)
    pub oracle: Option<OracleConfig>,
}

/// Delays and cadences used by genesis and the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// One round phase; also the execute-round tick period
    pub round_interval: Duration,
    /// Status reporter cadence
    pub status_interval: Duration,
    /// Wait after genesis before the first execute-round tick
    pub alignment_delay: Duration,
    /// Wait before locking when genesis was already started
    pub resume_delay: Duration,
    /// Wait after each pause/unpause call
    pub reset_delay: Duration,
    /// Lateness beyond this is logged as drift
    pub drift_tolerance: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            round_interval: Duration::from_secs(30),
            status_interval: Duration::from_secs(5),
            alignment_delay: Duration::from_secs(5),
            resume_delay: Duration::from_secs(5),
            reset_delay: Duration::from_secs(2),
            drift_tolerance: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub source: PriceSource,
    pub price_id: B256,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let rpc_url = env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());

        let contract_address = env::var("CONTRACT_ADDRESS")
            .context("CONTRACT_ADDRESS must be set")?;
        let contract_address = Address::from_str(contract_address.trim())
            .with_context(|| format!("CONTRACT_ADDRESS is not a valid address: {}", contract_address))?;

        let private_key = env::var("PRIVATE_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| SecretKey::new(s.trim()));

        let operator = match &private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key
                    .expose()
                    .parse()
                    .context("PRIVATE_KEY is not a valid secp256k1 key")?;
                Some(signer.address())
            }
            None => None,
        };

        let cast_bin = env::var("CAST_BIN").unwrap_or_else(|_| "cast".to_string());

        let check_paused = match env::var("CHECK_PAUSED") {
            Ok(v) => parse_flag(&v)
                .with_context(|| format!("CHECK_PAUSED must be true or false, got '{}'", v))?,
            Err(_) => true,
        };

        let genesis_max_attempts = env_parse("GENESIS_MAX_ATTEMPTS")?.unwrap_or(5).max(1);

        let buffer_seconds = env_parse("BUFFER_SECONDS")?.unwrap_or(5);

        let defaults = TimingConfig::default();
        let timing = TimingConfig {
            round_interval: env_parse("ROUND_INTERVAL_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.round_interval),
            status_interval: env_parse("STATUS_INTERVAL_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_interval),
            ..defaults
        };

        // Validate configuration
        if timing.round_interval.is_zero() {
            anyhow::bail!("ROUND_INTERVAL_SECONDS must be greater than zero");
        }
        if timing.status_interval.is_zero() {
            anyhow::bail!("STATUS_INTERVAL_SECONDS must be greater than zero");
        }

        let oracle = Self::oracle_from_env()?;

        Ok(Self {
            rpc_url,
            contract_address,
            private_key,
            operator,
            cast_bin,
            check_paused,
            genesis_max_attempts,
            buffer_seconds,
            timing,
            oracle,
        })
    }

    fn oracle_from_env() -> Result<Option<OracleConfig>> {
        let source = env::var("PRICE_SOURCE").unwrap_or_else(|_| "onchain".to_string());
        let oracle_address = env::var("ORACLE_ADDRESS").ok().filter(|s| !s.trim().is_empty());
        let hermes_url = env::var("HERMES_URL").unwrap_or_else(|_| DEFAULT_HERMES_URL.to_string());

        let source = match parse_price_source(&source, oracle_address.as_deref(), &hermes_url)? {
            Some(source) => source,
            None => return Ok(None),
        };

        let price_id = env::var("PRICE_FEED_ID").unwrap_or_else(|_| ETH_USD_PRICE_ID.to_string());
        let price_id = B256::from_str(price_id.trim())
            .with_context(|| format!("PRICE_FEED_ID is not a 32-byte hex id: {}", price_id))?;

        Ok(Some(OracleConfig { source, price_id }))
    }

    /// Write calls need a key; reads do not
    pub fn require_signer(&self) -> Result<&SecretKey> {
        self.private_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("PRIVATE_KEY required to drive rounds"))
    }
}

/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off` (any case); `None` otherwise
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Resolve the price source. On-chain reads without an oracle address mean
/// price display is off.
pub fn parse_price_source(source: &str, oracle_address: Option<&str>, hermes_url: &str) -> Result<Option<PriceSource>> {
    match source.trim().to_ascii_lowercase().as_str() {
        "onchain" => match oracle_address {
            Some(addr) => {
                let oracle = Address::from_str(addr.trim())
                    .with_context(|| format!("ORACLE_ADDRESS is not a valid address: {}", addr))?;
                Ok(Some(PriceSource::OnChain { oracle }))
            }
            None => Ok(None),
        },
        "hermes" => Ok(Some(PriceSource::Hermes {
            base_url: hermes_url.trim_end_matches('/').to_string(),
        })),
        "off" | "none" => Ok(None),
        other => anyhow::bail!("unknown PRICE_SOURCE '{}' (expected onchain, hermes or off)", other),
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_env_value(name, env::var(name).ok().as_deref())
}

/// Unset or blank is `None`; a value that does not parse is an error
fn parse_env_value<T>(name: &str, raw: Option<&str>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value '{}'", name, v)),
        None => Ok(None),
    }
}
