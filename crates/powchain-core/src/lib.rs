//! Proof-of-work ledger engine: blocks, a transaction pool, mining, signed
//! intake and longest-chain reconciliation with neighbor nodes.

use sha2::{Digest, Sha256};

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod peer;
pub mod pool;
pub mod pow;
pub mod scheduler;
pub mod transaction;
pub mod wire;

pub use block::Block;
pub use config::{LedgerConfig, NeighborConfig};
pub use error::{IdentityError, LedgerError, PeerError, Rejection};
pub use identity::{EcdsaVerifier, SignatureVerifier, Wallet};
pub use ledger::Ledger;
pub use peer::{PeerDirectory, PeerEvent, PeerTransport};
pub use pool::TransactionPool;
pub use transaction::Transaction;
pub use wire::{
    AmountResponse, ChainResponse, HealthResponse, SignatureProof, StatusResponse,
    TransactionRequest,
    TransactionsResponse,
};

pub type Hash = [u8; constants::HASH_SIZE];

pub fn sha256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}
