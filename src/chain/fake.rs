//! Scripted in-memory chain client for tests

use super::{ChainClient, ChainError, TxReceipt};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Reads answer from a fixed table keyed by signature; sends succeed unless a
/// failure has been queued for that signature.
#[derive(Default)]
pub(crate) struct FakeChain {
    reads: Mutex<HashMap<String, String>>,
    send_failures: Mutex<HashMap<String, VecDeque<ChainError>>>,
    sent: Mutex<Vec<String>>,
    called: Mutex<Vec<String>>,
    send_delay: Mutex<Duration>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read(&self, signature: &str, output: &str) {
        self.reads
            .lock()
            .unwrap()
            .insert(signature.to_string(), output.to_string());
    }

    pub fn clear_read(&self, signature: &str) {
        self.reads.lock().unwrap().remove(signature);
    }

    /// Every `send` takes this long before it is recorded
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = delay;
    }

    /// Queue one failure for the next `send` of `signature`
    pub fn fail_send(&self, signature: &str, error_text: &str) {
        self.send_failures
            .lock()
            .unwrap()
            .entry(signature.to_string())
            .or_default()
            .push_back(ChainError::from_output(error_text));
    }

    /// Signatures of every `send`, in order
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self, signature: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|s| *s == signature).count()
    }

    pub fn called(&self) -> Vec<String> {
        self.called.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn call(&self, _to: Address, signature: &str, _args: &[String]) -> Result<String, ChainError> {
        self.called.lock().unwrap().push(signature.to_string());
        self.reads
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .ok_or_else(|| ChainError::from_output(&format!("Error: no response scripted for {}", signature)))
    }

    async fn send(&self, _to: Address, signature: &str, _args: &[String]) -> Result<TxReceipt, ChainError> {
        let delay = *self.send_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let n = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(signature.to_string());
            sent.len()
        };

        let failure = self
            .send_failures
            .lock()
            .unwrap()
            .get_mut(signature)
            .and_then(VecDeque::pop_front);

        match failure {
            Some(err) => Err(err),
            None => Ok(TxReceipt {
                tx_hash: Some(format!("0x{:064x}", n)),
                status: 1,
            }),
        }
    }
}
