//! Sparse Merkle tree with sha-256 internal hashing.
//!
//! Keys are mapped to 256-bit paths by hashing; a subtree holding a single
//! leaf collapses to that leaf (path compression), and empty subtrees hash
//! to a 32-byte zero placeholder. The root is therefore a pure function of
//! the key→value map: insertion order never matters, deletes restore the
//! tree to the state in which the key was never present.
//!
//! Hashing scheme:
//!
//! ```text
//! empty      = [0u8; 32]
//! leaf(k, v) = sha256(0x00 ‖ path(k) ‖ sha256(v))
//! inner(l,r) = sha256(0x01 ‖ l ‖ r)
//! ```

use monsoon_types::{sha256, Hash};
use std::collections::BTreeMap;

const LEAF_PREFIX: u8 = 0x00;
const INNER_PREFIX: u8 = 0x01;

/// Placeholder hash for an empty subtree.
const EMPTY: [u8; 32] = [0u8; 32];

/// A sparse Merkle tree over arbitrary byte keys.
#[derive(Debug, Clone, Default)]
pub struct SparseMerkleTree {
    /// Leaves by path. The map itself is the authoritative state; roots are
    /// derived from it.
    leaves: BTreeMap<[u8; 32], LeafEntry>,
}

#[derive(Debug, Clone)]
struct LeafEntry {
    value_hash: [u8; 32],
}

impl SparseMerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Insert or replace `key → value`.
    pub fn upsert(&mut self, key: &[u8], value: &[u8]) {
        self.leaves.insert(
            sha256(key),
            LeafEntry {
                value_hash: sha256(value),
            },
        );
    }

    /// Remove `key`. A no-op if absent.
    pub fn delete(&mut self, key: &[u8]) {
        self.leaves.remove(&sha256(key));
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.leaves.contains_key(&sha256(key))
    }

    /// The tree root.
    pub fn root(&self) -> Hash {
        let paths: Vec<&[u8; 32]> = self.leaves.keys().collect();
        Hash(self.subtree_root(&paths, 0))
    }

    /// Root of the subtree holding `paths` (sorted, sharing a prefix of
    /// `depth` bits).
    fn subtree_root(&self, paths: &[&[u8; 32]], depth: usize) -> [u8; 32] {
        match paths {
            [] => EMPTY,
            [path] => self.leaf_hash(path),
            _ => {
                // Sorted input: the split point is where the bit at `depth`
                // flips from 0 to 1.
                let split = paths.partition_point(|p| !bit(p, depth));
                let left = self.subtree_root(&paths[..split], depth + 1);
                let right = self.subtree_root(&paths[split..], depth + 1);
                let mut buf = [0u8; 65];
                buf[0] = INNER_PREFIX;
                buf[1..33].copy_from_slice(&left);
                buf[33..].copy_from_slice(&right);
                sha256(&buf)
            }
        }
    }

    fn leaf_hash(&self, path: &[u8; 32]) -> [u8; 32] {
        let entry = &self.leaves[path];
        let mut buf = [0u8; 65];
        buf[0] = LEAF_PREFIX;
        buf[1..33].copy_from_slice(path);
        buf[33..].copy_from_slice(&entry.value_hash);
        sha256(&buf)
    }
}

/// Bit `i` of a 256-bit path, most significant first.
fn bit(path: &[u8; 32], i: usize) -> bool {
    path[i / 8] & (0x80 >> (i % 8)) != 0
}
