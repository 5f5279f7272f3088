//! Chain call error differentiation
//!
//! Classifies raw `cast` output into structured failure kinds once, at the
//! executor layer, so the genesis and scheduling code can match on a tag
//! instead of on message text.

use std::fmt;

/// Substrings the prediction contract uses when a lock/execute call lands
/// outside the buffer window around a round's lock timestamp.
const MISSED_WINDOW_PATTERNS: [&str; 2] = ["bufferSeconds", "Can only lock round within"];

/// Longest summary line kept for log output
const MAX_SUMMARY_LEN: usize = 200;

/// Failure kinds for a chain call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Lock/execute attempted outside the contract's buffer window
    MissedWindow,
    /// Transaction or call reverted for any other reason
    Reverted,
    /// The CLI binary could not be launched
    Spawn,
    /// A write was requested without a signing key configured
    NoCredential,
    /// Anything else (RPC hiccup, nonce race, malformed receipt)
    Transient,
}

impl FailureKind {
    /// Classify raw CLI error text
    pub fn classify(text: &str) -> Self {
        if MISSED_WINDOW_PATTERNS.iter().any(|p| text.contains(p)) {
            return FailureKind::MissedWindow;
        }

        let lower = text.to_lowercase();
        if lower.contains("revert") {
            return FailureKind::Reverted;
        }

        FailureKind::Transient
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::MissedWindow => "missed buffer window",
            FailureKind::Reverted => "reverted",
            FailureKind::Spawn => "cli unavailable",
            FailureKind::NoCredential => "no signing key",
            FailureKind::Transient => "transient",
        };
        write!(f, "{}", label)
    }
}

/// A failed chain call with its classification
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {summary}")]
pub struct ChainError {
    pub kind: FailureKind,
    /// First meaningful line of the output, truncated
    pub summary: String,
    /// Full output as returned by the CLI
    pub raw: String,
}

impl ChainError {
    /// Build an error from CLI stderr/stdout text
    pub fn from_output(text: &str) -> Self {
        Self {
            kind: FailureKind::classify(text),
            summary: summarize(text),
            raw: text.to_string(),
        }
    }

    /// The CLI process could not be started
    pub fn spawn(bin: &str, err: &std::io::Error) -> Self {
        let summary = format!("failed to run `{}`: {}", bin, err);
        Self {
            kind: FailureKind::Spawn,
            raw: summary.clone(),
            summary,
        }
    }

    /// `send` was called without a private key
    pub fn no_credential() -> Self {
        let summary = "write call requires PRIVATE_KEY".to_string();
        Self {
            kind: FailureKind::NoCredential,
            raw: summary.clone(),
            summary,
        }
    }

    /// Receipt came back with a status other than success
    pub fn receipt_status(status: u64, raw: &str) -> Self {
        Self {
            kind: FailureKind::Reverted,
            summary: format!("transaction status {}", status),
            raw: raw.to_string(),
        }
    }

    /// Receipt had no status field at all
    pub fn missing_status(raw: &str) -> Self {
        Self {
            kind: FailureKind::Transient,
            summary: "receipt missing status field".to_string(),
            raw: raw.to_string(),
        }
    }

    pub fn is_missed_window(&self) -> bool {
        self.kind == FailureKind::MissedWindow
    }
}

fn summarize(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output");

    if line.chars().count() > MAX_SUMMARY_LEN {
        let truncated: String = line.chars().take(MAX_SUMMARY_LEN).collect();
        format!("{}...", truncated)
    } else {
        line.to_string()
    }
}
