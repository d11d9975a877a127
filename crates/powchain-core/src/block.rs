use crate::{sha256, Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub nonce: u64,
    #[serde(with = "hex_hash")]
    pub previous_hash: Hash,
    /// Nanoseconds since the Unix epoch, fixed when the block is built.
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(nonce: u64, previous_hash: Hash, transactions: Vec<Transaction>) -> Self {
        Self {
            nonce,
            previous_hash,
            timestamp: now_nanos(),
            transactions,
        }
    }

    /// A block with the placeholder timestamp the proof-of-work search runs against.
    pub fn trial(nonce: u64, previous_hash: Hash, transactions: Vec<Transaction>) -> Self {
        Self {
            nonce,
            previous_hash,
            timestamp: 0,
            transactions,
        }
    }

    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 32 + 8 + 8 + self.transactions.len() * 64);
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&self.previous_hash);
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            tx.write_bytes(&mut bytes);
        }
        bytes
    }

    pub fn hash(&self) -> Hash {
        sha256(&self.hash_bytes())
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// Serde adapter writing a [`Hash`] as lowercase hex.
pub mod hex_hash {
    use crate::{constants::HASH_SIZE, Hash};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut out = [0u8; HASH_SIZE];
        hex::decode_to_slice(&s, &mut out).map_err(D::Error::custom)?;
        Ok(out)
    }
}
