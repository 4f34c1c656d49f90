//! Validator set handling.

use crate::address::Address;
use crate::cmp_decimal;
use crate::crypto::PublicKey;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// A staked validator as consensus sees it.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub address: Address,
    pub public_key: PublicKey,
    /// Stake as a big-int decimal string.
    pub staked_amount: String,
    pub service_url: String,
}

/// The validator set for a height.
///
/// Internally the set is held in **election order**: stake descending, ties
/// broken by address ascending. That order is consensus-critical: leader
/// election and signer bitmaps both index into it, so it is fixed at
/// construction and never re-sorted observably.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<ValidatorInfo>,
}

impl ValidatorSet {
    pub fn new(mut validators: Vec<ValidatorInfo>) -> Self {
        validators.sort_by(|a, b| {
            cmp_decimal(&b.staked_amount, &a.staked_amount).then_with(|| a.address.cmp(&b.address))
        });
        ValidatorSet { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validators in election order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidatorInfo> {
        self.validators.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ValidatorInfo> {
        self.validators.get(index)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.index_of(address).is_some()
    }

    /// Election-order index of a validator.
    pub fn index_of(&self, address: &Address) -> Option<usize> {
        self.validators.iter().position(|v| v.address == *address)
    }

    pub fn public_key_of(&self, address: &Address) -> Option<&PublicKey> {
        self.validators
            .iter()
            .find(|v| v.address == *address)
            .map(|v| &v.public_key)
    }

    /// Maximum number of faulty validators tolerated: `f = (n - 1) / 3`.
    pub fn max_faulty(&self) -> usize {
        self.validators.len().saturating_sub(1) / 3
    }

    /// Votes required for a quorum: `2f + 1`.
    pub fn quorum_threshold(&self) -> usize {
        2 * self.max_faulty() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(addr_byte: u8, stake: &str) -> ValidatorInfo {
        ValidatorInfo {
            address: Address([addr_byte; 20]),
            public_key: PublicKey([addr_byte; 32]),
            staked_amount: stake.to_string(),
            service_url: String::new(),
        }
    }

    #[test]
    fn election_order_is_stake_desc_then_address() {
        let set = ValidatorSet::new(vec![
            validator(3, "100"),
            validator(1, "2000"),
            validator(2, "100"),
        ]);
        let order: Vec<u8> = set.iter().map(|v| v.address.0[0]).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn quorum_thresholds() {
        // n=4 → f=1 → quorum 3
        let set = ValidatorSet::new((0..4).map(|i| validator(i, "1")).collect());
        assert_eq!(set.max_faulty(), 1);
        assert_eq!(set.quorum_threshold(), 3);

        // n=1 → f=0 → quorum 1
        let set = ValidatorSet::new(vec![validator(9, "1")]);
        assert_eq!(set.quorum_threshold(), 1);
    }
}
