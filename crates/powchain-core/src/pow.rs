//! Brute-force nonce search.
//!
//! A block satisfies the proof of work when the hex form of its trial hash
//! starts with `difficulty` zero characters. The trial hash is the block hash
//! with the timestamp replaced by `0`, so a committed block can be re-checked
//! later no matter when it was stamped.

use crate::{Block, Hash, Transaction};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Precomputed trial-block encoding. Only the leading nonce varies between attempts.
pub struct ProofTemplate {
    tail: Vec<u8>,
}

impl ProofTemplate {
    pub fn new(previous_hash: &Hash, transactions: &[Transaction]) -> Self {
        let trial = Block::trial(0, *previous_hash, transactions.to_vec());
        let tail = trial.hash_bytes().split_off(8);
        Self { tail }
    }

    pub fn hash(&self, nonce: u64) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(nonce.to_le_bytes());
        hasher.update(&self.tail);
        hasher.finalize().into()
    }

    pub fn meets(&self, nonce: u64, difficulty: u32) -> bool {
        count_leading_zero_nibbles(&self.hash(nonce)) >= difficulty
    }
}

/// Number of leading `'0'` characters in the hex encoding of `hash`.
pub fn count_leading_zero_nibbles(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 2;
        } else {
            if *b < 0x10 {
                total += 1;
            }
            break;
        }
    }
    total
}

/// Whether `(nonce, previous_hash, transactions)` satisfies `difficulty`.
pub fn valid_proof(
    nonce: u64,
    previous_hash: &Hash,
    transactions: &[Transaction],
    difficulty: u32,
) -> bool {
    ProofTemplate::new(previous_hash, transactions).meets(nonce, difficulty)
}

/// Sequential search from nonce 0. Blocks until a solution is found.
pub fn proof_of_work(transactions: &[Transaction], previous_hash: &Hash, difficulty: u32) -> u64 {
    let template = ProofTemplate::new(previous_hash, transactions);
    let mut nonce = 0u64;
    while !template.meets(nonce, difficulty) {
        nonce = nonce.wrapping_add(1);
    }
    debug!(nonce, difficulty, "proof of work found");
    nonce
}

/// Parallel search. Rayon splits the nonce range across threads; `find_first`
/// keeps the answer identical to [`proof_of_work`].
pub fn proof_of_work_parallel(
    transactions: &[Transaction],
    previous_hash: &Hash,
    difficulty: u32,
) -> u64 {
    let template = ProofTemplate::new(previous_hash, transactions);
    let found = (0u64..u64::MAX)
        .into_par_iter()
        .find_first(|nonce| template.meets(*nonce, difficulty));
    match found {
        Some(nonce) => {
            debug!(nonce, difficulty, "proof of work found");
            nonce
        }
        // Only reachable if every nonce below u64::MAX failed.
        None => proof_of_work(transactions, previous_hash, difficulty),
    }
}
