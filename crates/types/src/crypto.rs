//! Keys and signatures.
//!
//! Thin wrappers over ed25519 keep the dalek types out of downstream crates
//! and give signatures a canonical borsh encoding.

use crate::address::Address;
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signer, Verifier};
use std::fmt;
use thiserror::Error;

/// Errors from key handling and signature verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid key material: expected 32-byte seed (or 64-byte expanded key)")]
    InvalidKeyLength,

    #[error("malformed public key")]
    MalformedPublicKey,

    #[error("signature verification failed")]
    BadSignature,
}

/// An ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// The address derived from this key (low 20 bytes of its sha-256).
    pub fn address(&self) -> Address {
        Address::from_pubkey_bytes(&self.0)
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CryptoError::MalformedPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &sig)
            .map_err(|_| CryptoError::BadSignature)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(PublicKey(arr))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", hex::encode(&self.0[..4]))
    }
}

// Public keys appear in JSON (config, genesis) as hex strings.
impl serde::Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// An ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// All-zero signature, for tests and genesis certificates.
    pub fn zero() -> Self {
        Signature([0u8; 64])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..4]))
    }
}

/// A signing keypair.
pub struct KeyPair {
    signing: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from a cryptographic RNG.
    pub fn generate<R: rand_core::CryptoRngCore>(rng: &mut R) -> Self {
        KeyPair {
            signing: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Build a keypair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        KeyPair {
            signing: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    /// Parse a keypair from its hex form as carried in config files.
    ///
    /// Accepts a 32-byte seed or a 64-byte expanded key (seed ‖ pubkey),
    /// which is the layout the original tooling emits.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        let seed: [u8; 32] = match bytes.len() {
            32 => bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength)?,
            64 => bytes[..32]
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength)?,
            _ => return Err(CryptoError::InvalidKeyLength),
        };
        Ok(Self::from_seed(seed))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.address())
    }
}
