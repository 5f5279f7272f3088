//! `cast` subprocess client

use super::{ChainClient, ChainError, TxReceipt};
use crate::config::SecretKey;
use alloy::primitives::Address;
use async_trait::async_trait;
use regex::Regex;
use std::process::Output;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::debug;

static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*status\s+(\d+)").expect("valid status regex"));

static TX_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*transactionHash\s+(\S+)").expect("valid tx hash regex"));

/// Runs `cast call` / `cast send` against one RPC endpoint
pub struct CastClient {
    bin: String,
    rpc_url: String,
    private_key: Option<SecretKey>,
}

impl CastClient {
    pub fn new(bin: impl Into<String>, rpc_url: impl Into<String>, private_key: Option<SecretKey>) -> Self {
        Self {
            bin: bin.into(),
            rpc_url: rpc_url.into(),
            private_key,
        }
    }

    fn command(&self, mode: &str, to: Address, signature: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg(mode)
            .arg(to.to_string())
            .arg(signature)
            .args(args)
            .arg("--rpc-url")
            .arg(&self.rpc_url)
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, signature: &str) -> Result<String, ChainError> {
        let output = cmd
            .output()
            .await
            .map_err(|e| ChainError::spawn(&self.bin, &e))?;

        debug!("[cast] {} exited with {}", signature, output.status);
        into_stdout(output)
    }
}

#[async_trait]
impl ChainClient for CastClient {
    async fn call(&self, to: Address, signature: &str, args: &[String]) -> Result<String, ChainError> {
        let cmd = self.command("call", to, signature, args);
        self.run(cmd, signature).await
    }

    async fn send(&self, to: Address, signature: &str, args: &[String]) -> Result<TxReceipt, ChainError> {
        let key = self.private_key.as_ref().ok_or_else(ChainError::no_credential)?;

        let mut cmd = self.command("send", to, signature, args);
        cmd.arg("--private-key").arg(key.expose());

        let stdout = self.run(cmd, signature).await?;
        parse_receipt(&stdout)
    }
}

fn into_stdout(output: Output) -> Result<String, ChainError> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        Err(ChainError::from_output(&stdout))
    } else {
        Err(ChainError::from_output(&stderr))
    }
}

/// Parse the receipt block `cast send` prints on completion
pub fn parse_receipt(stdout: &str) -> Result<TxReceipt, ChainError> {
    let status = STATUS_RE
        .captures(stdout)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .ok_or_else(|| ChainError::missing_status(stdout))?;

    if status != 1 {
        return Err(ChainError::receipt_status(status, stdout));
    }

    let tx_hash = TX_HASH_RE
        .captures(stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Ok(TxReceipt { tx_hash, status })
}
