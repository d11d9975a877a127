use crate::{sha256, Hash};
use serde::{Deserialize, Serialize};

/// A value transfer between two addresses.
///
/// Transactions carry no identity of their own; two transfers with the same
/// fields are indistinguishable and that is fine for the protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "sender_blockchain_address")]
    pub sender: String,
    #[serde(rename = "recipient_blockchain_address")]
    pub recipient: String,
    #[serde(rename = "value")]
    pub amount: f64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Length-prefixed canonical encoding used for both block hashing and signing.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.sender.len() + 8 + self.recipient.len() + 8);
        self.write_bytes(&mut bytes);
        bytes
    }

    pub(crate) fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.sender.len() as u64).to_le_bytes());
        out.extend_from_slice(self.sender.as_bytes());
        out.extend_from_slice(&(self.recipient.len() as u64).to_le_bytes());
        out.extend_from_slice(self.recipient.as_bytes());
        out.extend_from_slice(&self.amount.to_bits().to_le_bytes());
    }

    /// Message hash a sender signs to authorize this transfer.
    pub fn hash(&self) -> Hash {
        sha256(&self.hash_bytes())
    }
}
