//! Keys, signatures and addresses.
//!
//! Public keys travel as 128 hex characters (`X ‖ Y`, uncompressed point
//! without the SEC1 tag byte) and signatures as 128 hex characters (`R ‖ S`).
//! Signatures are made over a transaction's 32-byte message hash directly.

use crate::{error::IdentityError, Hash, Transaction, TransactionRequest};
use crate::constants::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::fmt;

const ADDRESS_VERSION: u8 = 0x00;

/// Identity collaborator consumed by transaction intake.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key_hex: &str, signature_hex: &str, message: &Hash) -> bool;
    fn address_of(&self, public_key_hex: &str) -> Option<String>;
}

/// secp256k1 ECDSA with base58check addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier;

impl SignatureVerifier for EcdsaVerifier {
    fn verify(&self, public_key_hex: &str, signature_hex: &str, message: &Hash) -> bool {
        verify_signature(public_key_hex, signature_hex, message).unwrap_or(false)
    }

    fn address_of(&self, public_key_hex: &str) -> Option<String> {
        address_of(public_key_hex).ok()
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], IdentityError> {
    let bytes = hex::decode(s)?;
    if bytes.len() != N {
        return Err(IdentityError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, IdentityError> {
    let xy = decode_fixed::<PUBLIC_KEY_SIZE>(public_key_hex)?;
    let mut sec1 = Vec::with_capacity(1 + PUBLIC_KEY_SIZE);
    sec1.push(0x04);
    sec1.extend_from_slice(&xy);
    VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| IdentityError::InvalidPublicKey)
}

pub fn parse_signature(signature_hex: &str) -> Result<Signature, IdentityError> {
    let rs = decode_fixed::<SIGNATURE_SIZE>(signature_hex)?;
    Signature::from_slice(&rs).map_err(|_| IdentityError::InvalidSignature)
}

/// Verify `signature_hex` over `message` against `public_key_hex`.
///
/// Malformed inputs are errors; a well-formed signature that does not match is `Ok(false)`.
pub fn verify_signature(
    public_key_hex: &str,
    signature_hex: &str,
    message: &Hash,
) -> Result<bool, IdentityError> {
    let key = parse_public_key(public_key_hex)?;
    let sig = parse_signature(signature_hex)?;
    Ok(key.verify_prehash(message, &sig).is_ok())
}

fn public_key_bytes(key: &VerifyingKey) -> [u8; PUBLIC_KEY_SIZE] {
    let point = key.to_encoded_point(false);
    let mut out = [0u8; PUBLIC_KEY_SIZE];
    out.copy_from_slice(&point.as_bytes()[1..]);
    out
}

/// base58( version ‖ RIPEMD160(SHA256(X ‖ Y)) ‖ checksum )
pub fn address_from_key_bytes(xy: &[u8; PUBLIC_KEY_SIZE]) -> String {
    let digest = Ripemd160::digest(Sha256::digest(xy));
    let mut payload = Vec::with_capacity(25);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(&digest);
    let checksum = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

pub fn address_of(public_key_hex: &str) -> Result<String, IdentityError> {
    let key = parse_public_key(public_key_hex)?;
    Ok(address_from_key_bytes(&public_key_bytes(&key)))
}

/// A key pair and the address derived from it.
pub struct Wallet {
    signing_key: SigningKey,
    public_key: [u8; PUBLIC_KEY_SIZE],
    address: String,
}

impl Wallet {
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    pub fn from_private_key_hex(private_key_hex: &str) -> Result<Self, IdentityError> {
        let bytes = decode_fixed::<32>(private_key_hex)?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| IdentityError::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = public_key_bytes(signing_key.verifying_key());
        let address = address_from_key_bytes(&public_key);
        Self {
            signing_key,
            public_key,
            address,
        }
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign the transaction's message hash, returning `R ‖ S` as hex.
    pub fn sign(&self, tx: &Transaction) -> Result<String, IdentityError> {
        let sig: Signature = self
            .signing_key
            .sign_prehash(&tx.hash())
            .map_err(|_| IdentityError::InvalidSignature)?;
        Ok(hex::encode(sig.to_bytes()))
    }

    /// Build a complete intake request sending `amount` from this wallet.
    pub fn transfer(
        &self,
        recipient: impl Into<String>,
        amount: f64,
    ) -> Result<TransactionRequest, IdentityError> {
        let tx = Transaction::new(self.address.clone(), recipient, amount);
        let signature = self.sign(&tx)?;
        Ok(TransactionRequest {
            sender_blockchain_address: Some(tx.sender),
            recipient_blockchain_address: Some(tx.recipient),
            sender_public_key: Some(self.public_key_hex()),
            value: Some(tx.amount),
            signature: Some(signature),
        })
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
