//! Deterministic leader election.

use monsoon_types::{sha256, Address, ValidatorSet};

/// Elect the leader for `(height, round)`.
///
/// `leader = validators[ sha256(height ‖ round)[..8] mod N ]` over the
/// validator set in election order (stake descending, ties by address).
/// Re-election for the same view always returns the same validator.
pub fn elect_leader(validators: &ValidatorSet, height: u64, round: u32) -> Option<Address> {
    if validators.is_empty() {
        return None;
    }
    let mut seed = [0u8; 12];
    seed[..8].copy_from_slice(&height.to_le_bytes());
    seed[8..].copy_from_slice(&round.to_le_bytes());
    let digest = sha256(&seed);

    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[..8]);
    let index = (u64::from_le_bytes(raw) % validators.len() as u64) as usize;
    validators.get(index).map(|v| v.address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monsoon_types::{PublicKey, ValidatorInfo};

    fn set(n: u8) -> ValidatorSet {
        ValidatorSet::new(
            (0..n)
                .map(|i| ValidatorInfo {
                    address: Address([i + 1; 20]),
                    public_key: PublicKey([i + 1; 32]),
                    staked_amount: "1000".to_string(),
                    service_url: String::new(),
                })
                .collect(),
        )
    }

    #[test]
    fn election_is_deterministic_and_idempotent() {
        let validators = set(7);
        let first = elect_leader(&validators, 42, 3);
        for _ in 0..5 {
            assert_eq!(elect_leader(&validators, 42, 3), first);
        }
        assert!(first.is_some());
    }

    #[test]
    fn election_varies_with_height_and_round() {
        let validators = set(7);
        let leaders: std::collections::BTreeSet<Address> = (0..50)
            .filter_map(|h| elect_leader(&validators, h, 0))
            .collect();
        // Fifty heights must spread across more than one validator.
        assert!(leaders.len() > 1);

        let by_round: std::collections::BTreeSet<Address> = (0..50)
            .filter_map(|r| elect_leader(&validators, 1, r))
            .collect();
        assert!(by_round.len() > 1);
    }

    #[test]
    fn empty_set_elects_nobody() {
        assert_eq!(elect_leader(&set(0), 1, 0), None);
    }
}
