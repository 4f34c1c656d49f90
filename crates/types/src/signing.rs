//! Canonical signing messages.
//!
//! Every signature in the protocol covers a domain-tagged, canonically
//! encoded message, so signatures can never be replayed across contexts.

use crate::hash::Hash;
use crate::view::View;

/// Domain tag for consensus votes.
pub const DOMAIN_VOTE: &[u8] = b"monsoon/vote/v1";

/// The byte string a validator signs when voting for `block_hash` at `view`.
///
/// `DOMAIN_VOTE ‖ borsh(view) ‖ block_hash`. Ed25519 signing is
/// deterministic, so a replayed vote for the same pair is an identical byte
/// sequence.
pub fn vote_message(view: &View, block_hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_VOTE.len() + 16 + 32);
    message.extend_from_slice(DOMAIN_VOTE);
    message.extend_from_slice(&borsh::to_vec(view).expect("view serialization is infallible"));
    message.extend_from_slice(block_hash.as_bytes());
    message
}
