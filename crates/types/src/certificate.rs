//! Quorum certificates and partial signatures.

use crate::address::Address;
use crate::crypto::Signature;
use crate::hash::Hash;
use crate::view::View;
use borsh::{BorshDeserialize, BorshSerialize};

/// A single validator's signature over a `(view, block_hash)` pair.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PartialSignature {
    /// Address of the signing validator.
    pub signer: Address,
    /// Signature over the canonical vote message for `(view, block_hash)`.
    pub signature: Signature,
}

/// Bitmap of validator indices that contributed to a certificate.
///
/// Bit `i` corresponds to index `i` in the validator set's canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignerBitmap(Vec<u8>);

impl SignerBitmap {
    /// An empty bitmap sized for `n` validators.
    pub fn with_capacity(n: usize) -> Self {
        SignerBitmap(vec![0u8; n.div_ceil(8)])
    }

    pub fn set(&mut self, index: usize) {
        let byte = index / 8;
        if byte >= self.0.len() {
            self.0.resize(byte + 1, 0);
        }
        self.0[byte] |= 1 << (index % 8);
    }

    pub fn get(&self, index: usize) -> bool {
        self.0
            .get(index / 8)
            .map(|b| b & (1 << (index % 8)) != 0)
            .unwrap_or(false)
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Indices of set bits, ascending.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.0.len() * 8).filter(|&i| self.get(i))
    }
}

/// Proof that ≥ 2f+1 validators signed the identical `(view, block_hash)`
/// pair.
///
/// Signatures are stored in ascending signer-index order, aligned with the
/// set bits of `signers`. Validity is checked by the consensus driver against
/// the validator set for the certificate's height.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QuorumCertificate {
    /// The view the quorum formed in.
    pub view: View,
    /// The block the quorum certifies.
    pub block_hash: Hash,
    /// One signature per set bit in `signers`, in bit order.
    pub signatures: Vec<Signature>,
    /// Which validator indices signed.
    pub signers: SignerBitmap,
}

impl QuorumCertificate {
    /// The certificate that seeds height 1: no signers, zero block hash.
    pub fn genesis() -> Self {
        QuorumCertificate {
            view: View::genesis(),
            block_hash: Hash::ZERO,
            signatures: Vec::new(),
            signers: SignerBitmap::default(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.block_hash.is_zero() && self.signatures.is_empty()
    }

    /// Number of contributing validators.
    pub fn signer_count(&self) -> usize {
        self.signers.count()
    }

    /// Check this certificate against a validator set: a quorum of distinct
    /// validators must have signed the identical `(view, block_hash)` pair.
    ///
    /// The genesis certificate verifies trivially.
    pub fn verify(&self, validators: &crate::validator::ValidatorSet) -> bool {
        if self.is_genesis() {
            return true;
        }
        if self.signer_count() < validators.quorum_threshold()
            || self.signatures.len() != self.signer_count()
        {
            return false;
        }

        let message = crate::signing::vote_message(&self.view, &self.block_hash);
        self.signers
            .indices()
            .zip(self.signatures.iter())
            .all(|(index, signature)| {
                validators
                    .get(index)
                    .map(|v| v.public_key.verify(&message, signature).is_ok())
                    .unwrap_or(false)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_set_get_count() {
        let mut bm = SignerBitmap::with_capacity(4);
        assert_eq!(bm.count(), 0);
        bm.set(0);
        bm.set(3);
        assert!(bm.get(0));
        assert!(!bm.get(1));
        assert!(bm.get(3));
        assert_eq!(bm.count(), 2);
        assert_eq!(bm.indices().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn bitmap_grows_on_demand() {
        let mut bm = SignerBitmap::default();
        bm.set(17);
        assert!(bm.get(17));
        assert!(!bm.get(16));
        assert_eq!(bm.count(), 1);
    }

    #[test]
    fn genesis_certificate_is_recognized() {
        assert!(QuorumCertificate::genesis().is_genesis());
    }
}
