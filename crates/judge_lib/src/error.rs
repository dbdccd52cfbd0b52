use alloy::primitives::TxHash;
use thiserror::Error;

/// Substrings a node returns when an equivalent transaction is already queued.
const ALREADY_KNOWN_HINTS: [&str; 5] = [
    "already known",
    "already imported",
    "known transaction",
    "already exists",
    "replacement transaction underpriced",
];

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger read failed: {0}")]
    Read(String),

    #[error("transaction already known: {0}")]
    AlreadyKnown(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    #[error("no receipt for {hash} within {secs}s")]
    ConfirmationTimeout { hash: TxHash, secs: u64 },
}

impl LedgerError {
    /// Read failures clear up on their own; the next tick retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Read(_) | Self::ConfirmationTimeout { .. })
    }

    /// Another tick or process already queued an equivalent transaction.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyKnown(_))
    }

    /// Maps a node's send error onto the submission taxonomy.
    pub fn from_submit_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if ALREADY_KNOWN_HINTS.iter().any(|hint| lower.contains(hint)) {
            Self::AlreadyKnown(message)
        } else {
            Self::Rejected(message)
        }
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Request(String),

    #[error("oracle response could not be decoded: {0}")]
    Decode(String),
}
