//! The bank of per-category sparse Merkle trees.

use crate::smt::SparseMerkleTree;
use monsoon_types::{Hash, TreeCategory};

/// One sparse Merkle tree per actor or data category.
///
/// The combined **state root** is sha-256 over the lexicographically sorted
/// per-tree roots, so it is a pure function of the committed
/// `(category, key, value)` triples.
#[derive(Debug, Clone, Default)]
pub struct TreeBank {
    trees: [SparseMerkleTree; TreeCategory::ALL.len()],
}

impl TreeBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(category: TreeCategory) -> usize {
        TreeCategory::ALL
            .iter()
            .position(|c| *c == category)
            .unwrap_or(0)
    }

    pub fn upsert(&mut self, category: TreeCategory, key: &[u8], value: &[u8]) {
        self.trees[Self::index(category)].upsert(key, value);
    }

    pub fn delete(&mut self, category: TreeCategory, key: &[u8]) {
        self.trees[Self::index(category)].delete(key);
    }

    pub fn contains(&self, category: TreeCategory, key: &[u8]) -> bool {
        self.trees[Self::index(category)].contains(key)
    }

    pub fn tree_root(&self, category: TreeCategory) -> Hash {
        self.trees[Self::index(category)].root()
    }

    /// The combined state root.
    pub fn state_root(&self) -> Hash {
        let mut roots: Vec<Hash> = self.trees.iter().map(|t| t.root()).collect();
        roots.sort_unstable();

        let mut concat = Vec::with_capacity(roots.len() * 32);
        for root in roots {
            concat.extend_from_slice(root.as_bytes());
        }
        Hash::of(&concat)
    }
}
