//! Decoding of `cast call` output
//!
//! `cast` prints one value per line for multi-value returns and may append a
//! bracketed human-readable form (e.g. `1000000000000000000 [1e18]`). Only the
//! first whitespace-separated token on each line is significant.

use super::types::{PriceQuote, RoundData};
use alloy::primitives::{I256, U256};
use std::str::FromStr;

/// Number of values in the `rounds(uint256)` tuple
pub const ROUND_FIELDS: usize = 14;

/// `"true"` decodes to true; anything else, including garbage, is false
pub fn parse_bool(text: &str) -> bool {
    text.trim() == "true"
}

/// First value of the output as an unsigned integer (decimal or 0x hex)
pub fn parse_u64(text: &str) -> Option<u64> {
    value_lines(text).next().and_then(token_u64)
}

/// Decode `getPriceUnsafe(bytes32)(int64,uint64,int32,uint)` output.
/// Requires at least price, conf and expo lines.
pub fn parse_price_output(text: &str) -> Option<PriceQuote> {
    let lines: Vec<&str> = value_lines(text).collect();
    if lines.len() < 3 {
        return None;
    }

    Some(PriceQuote {
        price: token_i64(lines[0])?,
        conf: token_u64(lines[1]).unwrap_or(0),
        expo: token_i32(lines[2])?,
        publish_time: lines.get(3).and_then(|l| token_u64(l)).unwrap_or(0),
    })
}

/// Decode the 14-value `rounds(uint256)` tuple
pub fn parse_round_output(text: &str) -> Option<RoundData> {
    let lines: Vec<&str> = value_lines(text).collect();
    if lines.len() != ROUND_FIELDS {
        return None;
    }

    Some(RoundData {
        epoch: token_u64(lines[0])?,
        start_timestamp: token_u64(lines[1])?,
        lock_timestamp: token_u64(lines[2])?,
        close_timestamp: token_u64(lines[3])?,
        lock_price: token_i256(lines[4])?,
        close_price: token_i256(lines[5])?,
        lock_oracle_id: token_u256(lines[6])?,
        close_oracle_id: token_u256(lines[7])?,
        total_amount: token_u256(lines[8])?,
        bull_amount: token_u256(lines[9])?,
        bear_amount: token_u256(lines[10])?,
        reward_base_cal_amount: token_u256(lines[11])?,
        reward_amount: token_u256(lines[12])?,
        oracle_called: parse_bool(first_token(lines[13])?),
    })
}

fn value_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

fn first_token(line: &str) -> Option<&str> {
    line.split_whitespace().next()
}

fn hex_digits(token: &str) -> Option<&str> {
    token.strip_prefix("0x").or_else(|| token.strip_prefix("0X"))
}

fn token_u64(line: &str) -> Option<u64> {
    let token = first_token(line)?;
    match hex_digits(token) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

/// Hex input is read as two's complement
fn token_i64(line: &str) -> Option<i64> {
    let token = first_token(line)?;
    match hex_digits(token) {
        Some(hex) => u64::from_str_radix(hex, 16).ok().map(|v| v as i64),
        None => token.parse().ok(),
    }
}

/// Hex input is read as two's complement
fn token_i32(line: &str) -> Option<i32> {
    let token = first_token(line)?;
    match hex_digits(token) {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(|v| v as i32),
        None => token.parse().ok(),
    }
}

fn token_u256(line: &str) -> Option<U256> {
    U256::from_str(first_token(line)?).ok()
}

fn token_i256(line: &str) -> Option<I256> {
    let token = first_token(line)?;
    match hex_digits(token) {
        Some(_) => I256::from_hex_str(token).ok(),
        None => I256::from_dec_str(token).ok(),
    }
}
