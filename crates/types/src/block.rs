//! Blocks and block headers.

use crate::address::Address;
use crate::certificate::QuorumCertificate;
use crate::hash::{sha256, Hash};
use borsh::{BorshDeserialize, BorshSerialize};

/// An opaque transaction. Execution is outside this crate; consensus only
/// needs canonical bytes and a hash.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction(pub Vec<u8>);

impl Transaction {
    pub fn hash(&self) -> Hash {
        Hash::of(&self.0)
    }
}

/// Consensus metadata for a block.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    /// Hash of the parent block (zero for height 1).
    pub parent_hash: Hash,
    /// Address of the proposing validator.
    pub proposer: Address,
    /// Chain height of this block.
    pub height: u64,
    /// Proposal wall-clock time, milliseconds since the unix epoch.
    pub timestamp_ms: u64,
    /// Commitment to the transaction list.
    pub txs_root: Hash,
    /// State root after applying this block.
    pub state_root: Hash,
}

/// A proposed or committed block.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
    /// Certificate for the parent this block extends.
    pub qc_parent: QuorumCertificate,
}

impl Block {
    /// The block hash: sha-256 over the canonical header bytes.
    ///
    /// The header commits to the transactions via `txs_root`, so hashing the
    /// header alone identifies the full block.
    pub fn hash(&self) -> Hash {
        let bytes = borsh::to_vec(&self.header).expect("header serialization is infallible");
        Hash(sha256(&bytes))
    }

    /// Compute the transactions root for a transaction list: sha-256 over
    /// the concatenated transaction hashes, or zero for an empty list.
    pub fn txs_root(txs: &[Transaction]) -> Hash {
        if txs.is_empty() {
            return Hash::ZERO;
        }
        let mut concat = Vec::with_capacity(txs.len() * 32);
        for tx in txs {
            concat.extend_from_slice(tx.hash().as_bytes());
        }
        Hash::of(&concat)
    }
}
