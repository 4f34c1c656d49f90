//! 20-byte node / actor addresses.

use crate::hash::sha256;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of bytes in an address.
pub const ADDRESS_LEN: usize = 20;

/// A 20-byte opaque identifier, derived from the low bytes of a public-key
/// hash. Equality is byte-equality; ordering is lexicographic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Address(pub [u8; ADDRESS_LEN]);

/// Errors parsing an address from its hex form.
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("wrong length: expected {ADDRESS_LEN} bytes, got {0}")]
    WrongLength(usize),
}

impl Address {
    /// Derive an address from raw public-key bytes: the first 20 bytes of
    /// sha256(pubkey).
    pub fn from_pubkey_bytes(pubkey: &[u8]) -> Self {
        let digest = sha256(pubkey);
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(&digest[..ADDRESS_LEN]);
        Address(addr)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Hex form, as carried in config and genesis files.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != ADDRESS_LEN {
            return Err(AddressError::WrongLength(bytes.len()));
        }
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(&bytes);
        Ok(Address(addr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "Address({}..)", hex::encode(&self.0[..4]))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Addresses appear in JSON (config, genesis) as hex strings.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let addr = Address([0xab; ADDRESS_LEN]);
        let parsed: Address = addr.to_hex().parse().unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            "abcd".parse::<Address>(),
            Err(AddressError::WrongLength(2))
        ));
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = Address([1u8; ADDRESS_LEN]);
        let mut b = a;
        b.0[ADDRESS_LEN - 1] = 2;
        assert!(a < b);
    }
}
