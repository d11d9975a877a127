//! JSON shapes exchanged with clients and neighbors.

use crate::{error::Rejection, Block, Transaction};
use serde::{Deserialize, Serialize};

/// Signed intake request. Every field is optional on the wire so that a
/// missing one is reported as such instead of failing deserialization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub sender_blockchain_address: Option<String>,
    pub recipient_blockchain_address: Option<String>,
    pub sender_public_key: Option<String>,
    pub value: Option<f64>,
    pub signature: Option<String>,
}

/// Public key and signature accompanying a non-reward transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct SignatureProof {
    pub public_key: String,
    pub signature: String,
}

impl TransactionRequest {
    /// Split into the transaction and its proof, failing on the first absent field.
    pub fn into_parts(self) -> Result<(Transaction, SignatureProof), Rejection> {
        let sender = self
            .sender_blockchain_address
            .ok_or(Rejection::MissingField("sender_blockchain_address"))?;
        let recipient = self
            .recipient_blockchain_address
            .ok_or(Rejection::MissingField("recipient_blockchain_address"))?;
        let public_key = self
            .sender_public_key
            .ok_or(Rejection::MissingField("sender_public_key"))?;
        let amount = self.value.ok_or(Rejection::MissingField("value"))?;
        let signature = self
            .signature
            .ok_or(Rejection::MissingField("signature"))?;
        Ok((
            Transaction::new(sender, recipient, amount),
            SignatureProof {
                public_key,
                signature,
            },
        ))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
    pub length: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AmountResponse {
    pub amount: f64,
}

/// Liveness answer; `node_id` lets a caller tell which process replied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            message: "success".into(),
        }
    }

    pub fn fail() -> Self {
        Self {
            message: "fail".into(),
        }
    }
}
