//! Error types for the ledger engine.

use thiserror::Error;

/// Why a transaction was refused at intake. The pool is untouched in every case.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("bad signature")]
    BadSignature,
    #[error("public key does not match sender {0}")]
    KeyMismatch(String),
    #[error("insufficient funds: balance {balance}, amount {amount}")]
    InsufficientFunds { balance: f64, amount: f64 },
}

/// Faults inside the engine itself, as opposed to rejected input.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("mining task failed: {0}")]
    MiningTask(#[from] tokio::task::JoinError),
    #[error("difficulty {0} exceeds the {max} hex digits of a hash", max = crate::constants::MAX_MINING_DIFFICULTY)]
    UnreachableDifficulty(u32),
}

/// A neighbor could not be reached or answered badly.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {0} unreachable: {1}")]
    Unreachable(String, String),
    #[error("peer {0} answered with status {1}")]
    Status(String, u16),
    #[error("peer {0} sent an undecodable body: {1}")]
    Decode(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
}

impl From<hex::FromHexError> for IdentityError {
    fn from(e: hex::FromHexError) -> Self {
        IdentityError::InvalidHex(e.to_string())
    }
}
