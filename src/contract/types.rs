//! Observed prediction contract state

use crate::genesis::GenesisEntry;
use alloy::primitives::{I256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// One round as stored by the contract's `rounds(uint256)` mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundData {
    pub epoch: u64,
    pub start_timestamp: u64,
    pub lock_timestamp: u64,
    pub close_timestamp: u64,
    pub lock_price: I256,
    pub close_price: I256,
    pub lock_oracle_id: U256,
    pub close_oracle_id: U256,
    pub total_amount: U256,
    pub bull_amount: U256,
    pub bear_amount: U256,
    pub reward_base_cal_amount: U256,
    pub reward_amount: U256,
    pub oracle_called: bool,
}

impl RoundData {
    /// Seconds left for betting, zero once locked
    pub fn seconds_until_lock(&self, now_unix: u64) -> u64 {
        self.lock_timestamp.saturating_sub(now_unix)
    }

    /// Seconds until the round can be closed, zero once due
    pub fn seconds_until_close(&self, now_unix: u64) -> u64 {
        self.close_timestamp.saturating_sub(now_unix)
    }

    pub fn lock_time(&self) -> Option<DateTime<Utc>> {
        unix_to_datetime(self.lock_timestamp)
    }

    pub fn close_time(&self) -> Option<DateTime<Utc>> {
        unix_to_datetime(self.close_timestamp)
    }
}

/// Result of looking up the round the contract is currently on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundSnapshot {
    /// `currentEpoch()` is 0, no round has been started
    NotStarted,
    Active(RoundData),
    /// Epoch or round read failed
    Unavailable,
}

/// Genesis flags as reported by the contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenesisStatus {
    pub start_once: bool,
    pub lock_once: bool,
}

impl GenesisStatus {
    pub fn is_ready(&self) -> bool {
        self.start_once && self.lock_once
    }

    /// How genesis must be entered, or `None` when rounds can already execute
    pub fn entry(&self) -> Option<GenesisEntry> {
        match (self.start_once, self.lock_once) {
            (true, true) => None,
            (true, false) => Some(GenesisEntry::ResumeLock),
            _ => Some(GenesisEntry::Fresh),
        }
    }
}

/// Round timing parameters from the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundConfig {
    pub interval_seconds: u64,
    pub buffer_seconds: u64,
}

impl RoundConfig {
    /// Portion of a round open for betting
    pub fn betting_window_seconds(&self) -> u64 {
        self.interval_seconds.saturating_sub(self.buffer_seconds)
    }
}

/// Oracle quote as returned by `getPriceUnsafe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub price: i64,
    pub conf: u64,
    pub expo: i32,
    pub publish_time: u64,
}

impl PriceQuote {
    /// `price * 10^expo`, exact. `None` if the result does not fit a `Decimal`.
    pub fn value(&self) -> Option<Decimal> {
        if self.price == 0 {
            return Some(Decimal::ZERO);
        }

        if self.expo <= 0 {
            let scale = self.expo.unsigned_abs();
            if scale <= MAX_SCALE {
                return Some(Decimal::new(self.price, scale));
            }
            // an i64 mantissa has at most 19 digits, so this rounds to zero
            if scale > MAX_SCALE + I64_DIGITS {
                return Some(Decimal::ZERO);
            }
            return Decimal::new(self.price, MAX_SCALE).checked_div(pow10(scale - MAX_SCALE));
        }

        let expo = self.expo.unsigned_abs();
        if expo > MAX_SCALE {
            return None;
        }
        Decimal::from(self.price).checked_mul(pow10(expo))
    }
}

const MAX_SCALE: u32 = 28;
const I64_DIGITS: u32 = 19;

/// `10^exp` for `exp <= 28`
fn pow10(exp: u32) -> Decimal {
    Decimal::from_i128_with_scale(10i128.pow(exp), 0)
}

/// Format a wei amount in whole native units (18 decimals)
pub fn format_native(amount: U256) -> String {
    match Decimal::from_str(&amount.to_string()) {
        Ok(wei) => (wei / Decimal::from(1_000_000_000_000_000_000u64)).normalize().to_string(),
        Err(_) => format!("{} wei", amount),
    }
}

fn unix_to_datetime(ts: u64) -> Option<DateTime<Utc>> {
    i64::try_from(ts).ok().and_then(|s| DateTime::from_timestamp(s, 0))
}
