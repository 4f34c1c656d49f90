//! Vote collection toward a quorum certificate.

use monsoon_types::{Hash, QuorumCertificate, Signature, SignerBitmap, View};
use std::collections::BTreeMap;

/// Collects verified partial signatures for one `(view, block_hash)` pair.
///
/// The first vote fixes the block hash; later votes for a different hash at
/// the same view are rejected (a validator signs at most one block per
/// view). Duplicate votes from the same validator are ignored, so replayed
/// votes can never inflate the count.
#[derive(Debug, Clone)]
pub struct VoteSet {
    view: View,
    block_hash: Option<Hash>,
    signatures: BTreeMap<usize, Signature>,
}

impl VoteSet {
    pub fn new(view: View) -> Self {
        VoteSet {
            view,
            block_hash: None,
            signatures: BTreeMap::new(),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn block_hash(&self) -> Option<Hash> {
        self.block_hash
    }

    /// Record a verified vote from the validator at `index`. Returns `true`
    /// if the vote was counted.
    pub fn add(&mut self, index: usize, block_hash: Hash, signature: Signature) -> bool {
        match self.block_hash {
            None => self.block_hash = Some(block_hash),
            Some(existing) if existing != block_hash => return false,
            Some(_) => {}
        }
        if self.signatures.contains_key(&index) {
            return false;
        }
        self.signatures.insert(index, signature);
        true
    }

    pub fn count(&self) -> usize {
        self.signatures.len()
    }

    /// Assemble the certificate once a quorum is reached.
    pub fn to_certificate(&self) -> Option<QuorumCertificate> {
        let block_hash = self.block_hash?;
        let mut signers = SignerBitmap::default();
        let mut signatures = Vec::with_capacity(self.signatures.len());
        // BTreeMap iteration is index-ascending, matching the bitmap order.
        for (index, signature) in &self.signatures {
            signers.set(*index);
            signatures.push(*signature);
        }
        Some(QuorumCertificate {
            view: self.view,
            block_hash,
            signatures,
            signers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monsoon_types::Step;

    fn view() -> View {
        View {
            height: 1,
            round: 0,
            step: Step::Prepare,
        }
    }

    #[test]
    fn duplicate_votes_do_not_count_twice() {
        let mut set = VoteSet::new(view());
        let hash = Hash([1u8; 32]);
        assert!(set.add(0, hash, Signature::zero()));
        assert!(!set.add(0, hash, Signature::zero()));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn conflicting_block_hash_is_rejected() {
        let mut set = VoteSet::new(view());
        assert!(set.add(0, Hash([1u8; 32]), Signature::zero()));
        assert!(!set.add(1, Hash([2u8; 32]), Signature::zero()));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn certificate_carries_signers_in_index_order() {
        let mut set = VoteSet::new(view());
        let hash = Hash([3u8; 32]);
        set.add(2, hash, Signature::zero());
        set.add(0, hash, Signature::zero());
        set.add(3, hash, Signature::zero());

        let qc = set.to_certificate().unwrap();
        assert_eq!(qc.block_hash, hash);
        assert_eq!(qc.signer_count(), 3);
        assert_eq!(qc.signers.indices().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(qc.signatures.len(), 3);
    }

    #[test]
    fn empty_set_yields_no_certificate() {
        assert!(VoteSet::new(view()).to_certificate().is_none());
    }
}
