//! RainTree target computation and envelope handling.

use crate::addrbook::PeerList;
use crate::seen_cache::SeenCache;
use borsh::{BorshDeserialize, BorshSerialize};
use monsoon_types::{Address, Hash};
use tracing::trace;

/// Redundancy layer marker: re-send to the top-level targets.
pub const LEVEL_REDUNDANCY: i8 = 0;

/// Cleanup layer marker: send to the ring neighbors.
pub const LEVEL_CLEANUP: i8 = -1;

/// The wire envelope a RainTree message travels in.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RainTreeEnvelope {
    /// Address of the originating node.
    pub origin: Address,
    /// Current level: `[1, max_levels]` for tree hops, `0` for the
    /// redundancy layer, `-1` for the cleanup layer.
    pub level: i8,
    /// Originator-chosen nonce; part of the duplicate-suppression key.
    pub nonce: u64,
    /// Opaque payload, decoded by the subscriber.
    pub payload: Vec<u8>,
}

impl RainTreeEnvelope {
    /// Content hash for duplicate suppression.
    ///
    /// The level is deliberately excluded: redundancy and cleanup copies of
    /// a broadcast must collapse onto the tree copy.
    pub fn content_hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(20 + 8 + self.payload.len());
        buf.extend_from_slice(self.origin.as_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        Hash::of(&buf)
    }
}

/// One outbound transmission requested by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RainTreeSend {
    pub to: Address,
    pub envelope: RainTreeEnvelope,
}

/// The result of handling an incoming envelope.
#[derive(Debug, Clone, Default)]
pub struct RainTreeOutcome {
    /// True when the payload should be published to local subscribers.
    pub deliver: bool,
    /// Onward transmissions.
    pub forwards: Vec<RainTreeSend>,
}

/// Computes RainTree targets against a peer list and tracks seen messages.
///
/// The router is pure with respect to I/O: it decides, the caller sends.
#[derive(Debug)]
pub struct RainTreeRouter {
    list: PeerList,
    seen: SeenCache,
}

impl RainTreeRouter {
    pub fn new(list: PeerList) -> Self {
        RainTreeRouter {
            list,
            seen: SeenCache::default(),
        }
    }

    /// Swap in a freshly rebuilt peer list.
    pub fn update_peer_list(&mut self, list: PeerList) {
        self.list = list;
    }

    pub fn peer_list(&self) -> &PeerList {
        &self.list
    }

    /// Size of the slice of the list addressed at `level`.
    ///
    /// The full list is addressed at the top level; each level below
    /// shrinks the slice by a factor of 2/3, truncating at every step.
    fn slice_size(&self, level: u32) -> usize {
        let mut size = self.list.len();
        for _ in level..self.list.max_levels() {
            size = size * 2 / 3;
        }
        size
    }

    /// The two target indices at `level`: one and two thirds into the
    /// addressed slice.
    fn target_indices(&self, level: u32) -> (usize, usize) {
        let size = self.slice_size(level);
        (size / 3, size * 2 / 3)
    }

    /// The two target addresses at `level ∈ [1, max_levels]`, excluding the
    /// local node and collapsing duplicates.
    pub fn targets_at_level(&self, level: u32) -> Vec<Address> {
        let (first, second) = self.target_indices(level);
        let mut targets = Vec::with_capacity(2);
        for index in [first, second] {
            if index == 0 {
                continue;
            }
            if let Some(addr) = self.list.get(index) {
                if !targets.contains(&addr) {
                    targets.push(addr);
                }
            }
        }
        targets
    }

    /// The cleanup-layer targets: the ring neighbors at indices `N−1` and
    /// `1`, wrapping.
    pub fn cleanup_targets(&self) -> Vec<Address> {
        let n = self.list.len();
        if n <= 1 {
            return Vec::new();
        }
        let mut targets = Vec::with_capacity(2);
        for index in [n - 1, 1] {
            if let Some(addr) = self.list.get(index) {
                if !targets.contains(&addr) {
                    targets.push(addr);
                }
            }
        }
        targets
    }

    /// Transmissions for the descent from `from_level` down to level 1.
    ///
    /// A node holding the message at level `l` is its own middle target: it
    /// sends to the two computed targets at `l`, demotes itself to `l − 1`,
    /// and repeats. Each outgoing envelope carries the level it was sent at,
    /// so its receiver resumes the descent one level further down.
    fn descend(
        &self,
        origin: Address,
        nonce: u64,
        payload: &[u8],
        from_level: u32,
        sends: &mut Vec<RainTreeSend>,
    ) {
        for level in (1..=from_level).rev() {
            for to in self.targets_at_level(level) {
                sends.push(RainTreeSend {
                    to,
                    envelope: RainTreeEnvelope {
                        origin,
                        level: level as i8,
                        nonce,
                        payload: payload.to_vec(),
                    },
                });
            }
        }
    }

    /// Originate a broadcast.
    ///
    /// Returns the full tree descent from the top level, plus the redundancy
    /// (level 0) and cleanup (level −1) copies. The caller publishes the
    /// payload locally itself; the originator is always part of its own
    /// delivery.
    pub fn originate(&mut self, origin: Address, nonce: u64, payload: Vec<u8>) -> Vec<RainTreeSend> {
        let top = self.list.max_levels();
        let mut sends = Vec::new();

        let envelope = |level: i8| RainTreeEnvelope {
            origin,
            level,
            nonce,
            payload: payload.clone(),
        };

        // Mark our own broadcast as seen so echoes are suppressed.
        self.seen.insert(envelope(top as i8).content_hash());

        if top == 0 {
            // Single-node network: nothing to send.
            return sends;
        }

        self.descend(origin, nonce, &payload, top, &mut sends);
        for to in self.targets_at_level(top) {
            sends.push(RainTreeSend {
                to,
                envelope: envelope(LEVEL_REDUNDANCY),
            });
        }
        for to in self.cleanup_targets() {
            sends.push(RainTreeSend {
                to,
                envelope: envelope(LEVEL_CLEANUP),
            });
        }
        sends
    }

    /// Handle an incoming envelope: suppress duplicates, deliver locally,
    /// and continue the descent below the level the message arrived at.
    ///
    /// A redundancy copy (level 0) re-enters at the top level, so a node
    /// that sees it first forwards exactly as it would have for the tree
    /// copy. Cleanup copies never forward.
    pub fn handle(&mut self, envelope: &RainTreeEnvelope) -> RainTreeOutcome {
        let hash = envelope.content_hash();
        if !self.seen.insert(hash) {
            trace!(origin = %envelope.origin, nonce = envelope.nonce, "duplicate suppressed");
            return RainTreeOutcome::default();
        }

        let mut outcome = RainTreeOutcome {
            deliver: true,
            forwards: Vec::new(),
        };

        let effective_level = match envelope.level {
            LEVEL_REDUNDANCY => self.list.max_levels(),
            // Cleanup copies (and any malformed negative level) deliver
            // without forwarding.
            l if l < 0 => return outcome,
            // A level beyond our view of the network is clamped; the list
            // bounds the descent either way.
            l => (l as u32).min(self.list.max_levels()),
        };
        if effective_level >= 1 {
            self.descend(
                envelope.origin,
                envelope.nonce,
                &envelope.payload,
                effective_level - 1,
                &mut outcome.forwards,
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrbook::PeerList;
    use std::collections::BTreeSet;

    fn addr(b: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = b;
        Address(bytes)
    }

    /// A router whose peer list holds `list` (single-letter addresses),
    /// rotated so `origin` sits at index 0.
    fn alphabet_router(origin: u8, list: &str) -> RainTreeRouter {
        let addresses: Vec<Address> = list.bytes().map(addr).collect();
        RainTreeRouter::new(PeerList::build(addresses, addr(origin)))
    }

    fn letters(targets: &[Address]) -> String {
        targets.iter().map(|a| a.0[0] as char).collect()
    }

    // Six nodes, origin A:
    //
    //                       A
    //     ┌─────────────────┬─────────────────┐
    //     C                 A                 E
    #[test]
    fn targets_six_nodes() {
        let router = alphabet_router(b'A', "ABCDEF");
        assert_eq!(router.peer_list().max_levels(), 2);

        assert_eq!(letters(&router.targets_at_level(2)), "CE");
        assert_eq!(letters(&router.targets_at_level(1)), "BC");
        // Redundancy layer re-uses the top-level targets.
        assert_eq!(
            letters(&router.targets_at_level(router.peer_list().max_levels())),
            "CE"
        );
        assert_eq!(letters(&router.cleanup_targets()), "FB");
    }

    // Nine nodes, origin A:
    //
    //                       A
    //     ┌─────────────────┬─────────────────┐
    //     D                 A                 G
    #[test]
    fn targets_nine_nodes() {
        let router = alphabet_router(b'A', "ABCDEFGHI");
        assert_eq!(router.peer_list().max_levels(), 2);

        assert_eq!(letters(&router.targets_at_level(2)), "DG");
        assert_eq!(letters(&router.targets_at_level(1)), "CE");
        assert_eq!(letters(&router.cleanup_targets()), "IB");
    }

    // Twenty-seven nodes, origin O. The rotated list wraps the alphabet:
    // "OPQRSTUVWXYZ[ABCDEFGHIJKLMN".
    #[test]
    fn targets_twenty_seven_nodes() {
        let router = alphabet_router(b'O', "ABCDEFGHIJKLMNOPQRSTUVWXYZ[");
        assert_eq!(router.peer_list().max_levels(), 3);

        let order: String = router.peer_list().iter().map(|a| a.0[0] as char).collect();
        assert_eq!(order, "OPQRSTUVWXYZ[ABCDEFGHIJKLMN");

        assert_eq!(letters(&router.targets_at_level(3)), "XF");
        assert_eq!(letters(&router.targets_at_level(2)), "U[");
        assert_eq!(letters(&router.targets_at_level(1)), "SW");
        assert_eq!(letters(&router.cleanup_targets()), "NP");
    }

    #[test]
    fn originate_emits_descent_redundancy_and_cleanup() {
        let mut router = alphabet_router(b'A', "ABCDEF");
        let sends = router.originate(addr(b'A'), 7, b"payload".to_vec());

        let summary: Vec<(char, i8)> = sends
            .iter()
            .map(|s| (s.to.0[0] as char, s.envelope.level))
            .collect();
        assert_eq!(
            summary,
            vec![
                // Tree descent: A is its own middle target at every level.
                ('C', 2),
                ('E', 2),
                ('B', 1),
                ('C', 1),
                // Redundancy copies to the top-level targets.
                ('C', 0),
                ('E', 0),
                // Cleanup copies to the ring neighbors.
                ('F', -1),
                ('B', -1),
            ]
        );
    }

    #[test]
    fn handle_forwards_below_arrival_level() {
        // C received A's level-2 send; C's own rotated list is "CDEFAB".
        let mut router = alphabet_router(b'C', "ABCDEF");
        let envelope = RainTreeEnvelope {
            origin: addr(b'A'),
            level: 2,
            nonce: 1,
            payload: b"x".to_vec(),
        };

        let outcome = router.handle(&envelope);
        assert!(outcome.deliver);
        let summary: Vec<(char, i8)> = outcome
            .forwards
            .iter()
            .map(|s| (s.to.0[0] as char, s.envelope.level))
            .collect();
        // C's level-1 slice has size 4: targets at indices 1 and 2 → D, E.
        assert_eq!(summary, vec![('D', 1), ('E', 1)]);
    }

    #[test]
    fn handle_descends_through_every_lower_level() {
        // X received O's level-3 send; X descends through levels 2 and 1.
        let mut router = alphabet_router(b'X', "ABCDEFGHIJKLMNOPQRSTUVWXYZ[");
        let envelope = RainTreeEnvelope {
            origin: addr(b'O'),
            level: 3,
            nonce: 1,
            payload: b"x".to_vec(),
        };

        let outcome = router.handle(&envelope);
        assert!(outcome.deliver);
        let levels: Vec<i8> = outcome.forwards.iter().map(|s| s.envelope.level).collect();
        assert_eq!(levels, vec![2, 2, 1, 1]);
    }

    #[test]
    fn redundancy_copy_reenters_at_top_level() {
        let mut router = alphabet_router(b'C', "ABCDEF");
        let envelope = RainTreeEnvelope {
            origin: addr(b'A'),
            level: LEVEL_REDUNDANCY,
            nonce: 100,
            payload: b"x".to_vec(),
        };
        let outcome = router.handle(&envelope);
        assert!(outcome.deliver);
        // Same forwards as a fresh level-2 receipt: the descent below top.
        let summary: Vec<(char, i8)> = outcome
            .forwards
            .iter()
            .map(|s| (s.to.0[0] as char, s.envelope.level))
            .collect();
        assert_eq!(summary, vec![('D', 1), ('E', 1)]);
    }

    #[test]
    fn cleanup_copies_do_not_forward() {
        let mut router = alphabet_router(b'C', "ABCDEF");
        let envelope = RainTreeEnvelope {
            origin: addr(b'A'),
            level: LEVEL_CLEANUP,
            nonce: 101,
            payload: b"x".to_vec(),
        };
        let outcome = router.handle(&envelope);
        assert!(outcome.deliver);
        assert!(outcome.forwards.is_empty());
    }

    #[test]
    fn duplicates_are_suppressed_across_layers() {
        let mut router = alphabet_router(b'C', "ABCDEF");
        let tree = RainTreeEnvelope {
            origin: addr(b'A'),
            level: 2,
            nonce: 9,
            payload: b"x".to_vec(),
        };
        let redundancy = RainTreeEnvelope {
            level: LEVEL_REDUNDANCY,
            ..tree.clone()
        };

        assert!(router.handle(&tree).deliver);
        // Same (origin, nonce, payload) at a different level is a duplicate.
        let again = router.handle(&redundancy);
        assert!(!again.deliver);
        assert!(again.forwards.is_empty());
    }

    // Every honest peer receives each broadcast, from any originator, for a
    // range of network sizes spanning the level boundaries.
    #[test]
    fn full_dissemination_for_various_sizes() {
        for n in [1usize, 2, 3, 4, 6, 9, 10, 13, 27] {
            let addresses: Vec<Address> = (0..n as u8).map(addr).collect();
            let origin = addresses[0];

            let mut routers: Vec<RainTreeRouter> = addresses
                .iter()
                .map(|a| RainTreeRouter::new(PeerList::build(addresses.clone(), *a)))
                .collect();

            let mut delivered: BTreeSet<Address> = BTreeSet::new();
            delivered.insert(origin); // local publish at the originator

            let mut queue: Vec<RainTreeSend> = routers[0].originate(origin, 42, b"m".to_vec());
            while let Some(send) = queue.pop() {
                let index = addresses.iter().position(|a| *a == send.to).unwrap();
                let outcome = routers[index].handle(&send.envelope);
                if outcome.deliver {
                    delivered.insert(send.to);
                }
                queue.extend(outcome.forwards);
            }

            assert_eq!(delivered.len(), n, "n={n}: all peers must be reached");
        }
    }
}
