//! Core types for the Monsoon node.
//!
//! This crate provides the foundational types used throughout the node:
//!
//! - **Primitives**: [`Hash`], [`Address`], keys and signatures
//! - **Consensus types**: [`View`], [`Step`], [`Block`], [`QuorumCertificate`]
//! - **Staking types**: [`Actor`], [`ActorCategory`], protocol params
//! - **Genesis**: the JSON-facing genesis state
//!
//! # Design Philosophy
//!
//! This crate is self-contained and depends on no other workspace crates,
//! making it the foundation layer. Every type that crosses the wire or feeds
//! a Merkle tree derives `BorshSerialize`/`BorshDeserialize`; the encoding is
//! canonical (fixed field order, length-prefixed collections), so two nodes
//! serializing the same value always produce identical bytes.

mod actor;
mod address;
mod block;
mod certificate;
mod crypto;
mod genesis;
mod hash;
mod params;
mod signing;
mod validator;
mod view;

pub use actor::{Actor, ActorCategory, AsBaseActor, StakeStatus, TreeCategory, HEIGHT_NOT_USED};
pub use address::{Address, AddressError};
pub use block::{Block, BlockHeader, Transaction};
pub use certificate::{PartialSignature, QuorumCertificate, SignerBitmap};
pub use crypto::{CryptoError, KeyPair, PublicKey, Signature};
pub use genesis::{
    ConsensusGenesis, GenesisAccount, GenesisActor, GenesisPeer, GenesisPool, GenesisState,
    P2pGenesis, PersistenceGenesis,
};
pub use hash::{sha256, Hash};
pub use params::{names as param_names, ParamValue, Params, DEFAULT_MAX_PAUSE_BLOCKS, DEFAULT_UNSTAKING_BLOCKS};
pub use signing::{vote_message, DOMAIN_VOTE};
pub use validator::{ValidatorInfo, ValidatorSet};
pub use view::{Step, View};

/// Compare two non-negative big-int decimal strings numerically.
///
/// Stake amounts are carried as decimal strings so they survive JSON and
/// never touch floating point. Leading zeros are ignored.
pub fn cmp_decimal(a: &str, b: &str) -> std::cmp::Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Add two non-negative big-int decimal strings.
///
/// Schoolbook addition over ASCII digits; non-digit characters are treated
/// as zero so a malformed amount cannot panic the caller.
pub fn add_decimal(a: &str, b: &str) -> String {
    let a: Vec<u8> = a.bytes().filter(u8::is_ascii_digit).collect();
    let b: Vec<u8> = b.bytes().filter(u8::is_ascii_digit).collect();
    let mut digits = Vec::with_capacity(a.len().max(b.len()) + 1);
    let mut carry = 0u8;
    for i in 0..a.len().max(b.len()) {
        let da = a.len().checked_sub(1 + i).map_or(0, |j| a[j] - b'0');
        let db = b.len().checked_sub(1 + i).map_or(0, |j| b[j] - b'0');
        let sum = da + db + carry;
        digits.push(b'0' + sum % 10);
        carry = sum / 10;
    }
    if carry > 0 {
        digits.push(b'0' + carry);
    }
    if digits.is_empty() {
        return "0".to_string();
    }
    digits.reverse();
    let s = String::from_utf8(digits).expect("digits are ascii");
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn decimal_comparison_is_numeric() {
        assert_eq!(cmp_decimal("9", "10"), Ordering::Less);
        assert_eq!(cmp_decimal("0100", "100"), Ordering::Equal);
        assert_eq!(
            cmp_decimal("1000000000000000", "999999999999999"),
            Ordering::Greater
        );
        assert_eq!(cmp_decimal("0", ""), Ordering::Equal);
    }

    #[test]
    fn decimal_addition() {
        assert_eq!(add_decimal("0", "0"), "0");
        assert_eq!(add_decimal("999", "1"), "1000");
        assert_eq!(
            add_decimal("1000000000000000", "1000000000000000"),
            "2000000000000000"
        );
        assert_eq!(add_decimal("007", "3"), "10");
    }
}
