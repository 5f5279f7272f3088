//! Oracle price fetcher
//!
//! Reads the latest Pyth price for one feed, either from the on-chain oracle
//! contract through `cast` or from the Hermes REST API. Price display is
//! best-effort: every failure falls back to the last good price.

use crate::chain::ChainClient;
use crate::contract::{parse_price_output, PriceQuote};
use alloy::primitives::{Address, B256};
use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const GET_PRICE_UNSAFE: &str = "getPriceUnsafe(bytes32)(int64,uint64,int32,uint)";

/// Where prices come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceSource {
    /// Pyth contract on the same network as the prediction contract
    OnChain { oracle: Address },
    /// Pyth Hermes price service
    Hermes { base_url: String },
}

#[derive(Debug, Deserialize)]
struct HermesResponse {
    #[serde(default)]
    parsed: Vec<HermesParsed>,
}

#[derive(Debug, Deserialize)]
struct HermesParsed {
    price: HermesPrice,
}

/// Hermes sends the 64-bit fields as strings
#[derive(Debug, Deserialize)]
struct HermesPrice {
    price: String,
    conf: String,
    expo: i32,
    publish_time: u64,
}

impl HermesResponse {
    fn into_quote(self) -> Result<PriceQuote> {
        let entry = self
            .parsed
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No price data received"))?;

        Ok(PriceQuote {
            price: entry.price.price.parse().context("Invalid Hermes price")?,
            conf: entry.price.conf.parse().context("Invalid Hermes confidence")?,
            expo: entry.price.expo,
            publish_time: entry.price.publish_time,
        })
    }
}

/// Fetches and caches the latest price for a single feed
pub struct PriceFetcher {
    source: PriceSource,
    price_id: B256,
    chain: Arc<dyn ChainClient>,
    http: reqwest::Client,
    last_price: Decimal,
}

impl PriceFetcher {
    pub fn new(source: PriceSource, price_id: B256, chain: Arc<dyn ChainClient>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            source,
            price_id,
            chain,
            http,
            last_price: Decimal::ZERO,
        })
    }

    /// Most recent successfully fetched price, zero before the first one
    pub fn last_price(&self) -> Decimal {
        self.last_price
    }

    /// Fetch the latest price. Never fails; returns the cached price when the
    /// fetch or decode does.
    pub async fn fetch(&mut self) -> Decimal {
        match self.fetch_quote().await.and_then(|q| {
            q.value().ok_or_else(|| anyhow!("Price {}e{} out of range", q.price, q.expo))
        }) {
            Ok(price) => {
                self.last_price = price;
            }
            Err(e) => {
                debug!("[Oracle] Price fetch failed, using cached {}: {:#}", self.last_price, e);
            }
        }
        self.last_price
    }

    async fn fetch_quote(&self) -> Result<PriceQuote> {
        match &self.source {
            PriceSource::OnChain { oracle } => {
                let output = self
                    .chain
                    .call(*oracle, GET_PRICE_UNSAFE, &[self.price_id.to_string()])
                    .await?;
                parse_price_output(&output).ok_or_else(|| anyhow!("Could not decode oracle output"))
            }
            PriceSource::Hermes { base_url } => {
                let url = format!("{}/v2/updates/price/latest", base_url);
                let response = self
                    .http
                    .get(&url)
                    .query(&[("ids[]", self.price_id.to_string())])
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(anyhow!("Hermes returned {}", response.status()));
                }

                response.json::<HermesResponse>().await?.into_quote()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::FakeChain;
    use rust_decimal_macros::dec;

    fn onchain_fetcher(fake: &Arc<FakeChain>) -> PriceFetcher {
        PriceFetcher::new(
            PriceSource::OnChain { oracle: Address::ZERO },
            B256::ZERO,
            fake.clone(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_onchain_price() {
        let fake = Arc::new(FakeChain::new());
        fake.set_read(GET_PRICE_UNSAFE, "412345678900 [4.123e11]\n231000000\n-8\n1735689600\n");

        let mut fetcher = onchain_fetcher(&fake);
        assert_eq!(fetcher.fetch().await, dec!(4123.456789));
        assert_eq!(fetcher.last_price(), dec!(4123.456789));
    }

    #[tokio::test]
    async fn test_failure_returns_zero_initially() {
        let fake = Arc::new(FakeChain::new());
        let mut fetcher = onchain_fetcher(&fake);
        assert_eq!(fetcher.fetch().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_failure_returns_cached_price() {
        let fake = Arc::new(FakeChain::new());
        fake.set_read(GET_PRICE_UNSAFE, "350000000000\n0\n-8\n0\n");

        let mut fetcher = onchain_fetcher(&fake);
        assert_eq!(fetcher.fetch().await, dec!(3500));

        fake.set_read(GET_PRICE_UNSAFE, "garbage");
        assert_eq!(fetcher.fetch().await, dec!(3500));

        fake.clear_read(GET_PRICE_UNSAFE);
        assert_eq!(fetcher.fetch().await, dec!(3500));
    }

    #[test]
    fn test_hermes_response_decoding() {
        let body = r#"{
            "binary": {"encoding": "hex", "data": ["504e4155"]},
            "parsed": [{
                "id": "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
                "price": {"price": "412345678900", "conf": "231000000", "expo": -8, "publish_time": 1735689600},
                "ema_price": {"price": "412000000000", "conf": "200000000", "expo": -8, "publish_time": 1735689600}
            }]
        }"#;

        let quote = serde_json::from_str::<HermesResponse>(body).unwrap().into_quote().unwrap();
        assert_eq!(quote.price, 412_345_678_900);
        assert_eq!(quote.expo, -8);
        assert_eq!(quote.value(), Some(dec!(4123.456789)));
    }

    #[test]
    fn test_hermes_empty_response() {
        let response: HermesResponse = serde_json::from_str(r#"{"parsed": []}"#).unwrap();
        assert!(response.into_quote().is_err());
    }
}
