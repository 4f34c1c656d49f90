//! Address book and the deterministic peer list.

use monsoon_types::Address;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A known peer: an address plus the transport handle used to reach it.
#[derive(Debug, Clone)]
pub struct Peer {
    pub address: Address,
    /// Transport endpoint (e.g. `host:port`). Opaque to routing.
    pub service_url: String,
    /// Reputation score, decremented on protocol violations.
    pub score: i32,
}

impl Peer {
    pub fn new(address: Address, service_url: impl Into<String>) -> Self {
        Peer {
            address,
            service_url: service_url.into(),
            score: 0,
        }
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        // Peers are equal by address.
        self.address == other.address
    }
}

impl Eq for Peer {}

/// `⌈log₃ n⌉`, the number of RainTree levels for an `n`-peer list.
///
/// Computed by repeated multiplication, so it stays exact for every `n`
/// a network will ever see (no floating point).
pub fn max_levels(n: usize) -> u32 {
    let mut levels = 0u32;
    let mut capacity = 1u64;
    while capacity < n as u64 {
        capacity *= 3;
        levels += 1;
    }
    levels
}

/// The unordered set of known peers.
///
/// Mutations mark the derived [`PeerList`] dirty; `rebuild` is the only
/// operation that refreshes it, and must run before any target query while
/// dirty. Owned by the p2p module; other modules read immutable snapshots.
#[derive(Debug)]
pub struct AddressBook {
    self_address: Address,
    peers: BTreeMap<Address, Peer>,
    list: PeerList,
    dirty: bool,
}

impl AddressBook {
    /// Create a book containing only the local node.
    pub fn new(self_address: Address, self_url: impl Into<String>) -> Self {
        let mut peers = BTreeMap::new();
        peers.insert(self_address, Peer::new(self_address, self_url));
        let mut book = AddressBook {
            self_address,
            peers,
            list: PeerList::default(),
            dirty: true,
        };
        book.rebuild();
        book
    }

    pub fn self_address(&self) -> Address {
        self.self_address
    }

    /// Insert or replace a peer. Marks the peer list dirty.
    pub fn add(&mut self, peer: Peer) {
        self.peers.insert(peer.address, peer);
        self.dirty = true;
    }

    /// Remove a peer by address. Marks the peer list dirty.
    pub fn remove(&mut self, address: &Address) {
        if self.peers.remove(address).is_some() {
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&Peer> {
        self.peers.get(address)
    }

    /// Decrement a peer's reputation score after a protocol violation.
    pub fn decrement_score(&mut self, address: &Address) {
        if let Some(peer) = self.peers.get_mut(address) {
            peer.score -= 1;
        }
    }

    /// Rebuild the derived peer list: sort by address ascending, rotate so
    /// the local node is at index 0, recompute the level count. Idempotent.
    pub fn rebuild(&mut self) {
        if !self.dirty {
            return;
        }
        // BTreeMap iteration is already address-ascending.
        let sorted: Vec<Address> = self.peers.keys().copied().collect();
        let self_offset = sorted
            .binary_search(&self.self_address)
            .unwrap_or_default();
        self.list = PeerList {
            sorted,
            self_offset,
        };
        self.dirty = false;
    }

    /// The current peer list. Panics in debug builds if queried while dirty;
    /// callers must `rebuild` first.
    pub fn peer_list(&self) -> &PeerList {
        debug_assert!(!self.dirty, "peer list queried while dirty");
        &self.list
    }

    /// An owned snapshot of the current peer list.
    pub fn snapshot(&self) -> PeerList {
        debug_assert!(!self.dirty, "peer list queried while dirty");
        self.list.clone()
    }
}

/// The ordered peer list: all addresses sorted ascending, rotated so the
/// local node occupies index 0.
///
/// Stored as the sorted vector plus the local offset, so `find` stays a
/// binary search while indexing is O(1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerList {
    sorted: Vec<Address>,
    self_offset: usize,
}

impl PeerList {
    /// Build a list directly from an address set and a local address.
    /// The local address must be in the set.
    pub fn build(mut addresses: Vec<Address>, self_address: Address) -> Self {
        addresses.sort_unstable();
        addresses.dedup();
        let self_offset = addresses.binary_search(&self_address).unwrap_or_default();
        PeerList {
            sorted: addresses,
            self_offset,
        }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Number of RainTree levels for this list.
    pub fn max_levels(&self) -> u32 {
        max_levels(self.sorted.len())
    }

    /// Address at rotated index `i` (index 0 is the local node).
    pub fn get(&self, i: usize) -> Option<Address> {
        if self.sorted.is_empty() {
            return None;
        }
        let n = self.sorted.len();
        self.sorted.get((self.self_offset + i) % n).copied()
    }

    /// Rotated index of `address`, by binary search over the sorted backing.
    pub fn find(&self, address: &Address) -> Option<usize> {
        let n = self.sorted.len();
        let raw = self.sorted.binary_search(address).ok()?;
        Some((raw + n - self.self_offset) % n)
    }

    /// Addresses in rotated order, local node first.
    pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
        (0..self.sorted.len()).filter_map(move |i| self.get(i))
    }
}

/// Shared handle to the address book. The p2p module holds the only writer;
/// other modules take read snapshots.
pub type SharedAddressBook = Arc<RwLock<AddressBook>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = b;
        Address(bytes)
    }

    // Expected level counts for network sizes, from 1 node up to the
    // boundaries around each power of three.
    #[test]
    fn max_levels_table() {
        let cases: &[(usize, u32)] = &[
            (1, 0),
            (2, 1),
            (3, 1),
            (4, 2),
            (9, 2),
            (10, 3),
            (27, 3),
            (28, 4),
            (81, 4),
            (82, 5),
            (59_049, 10),
            (59_050, 11),
        ];
        for &(n, expected) in cases {
            assert_eq!(max_levels(n), expected, "n={n}");
        }
    }

    #[test]
    fn rebuild_rotates_self_to_front() {
        let mut book = AddressBook::new(addr(b'C'), "c:1");
        for b in [b'A', b'B', b'D', b'E'] {
            book.add(Peer::new(addr(b), format!("{b}:1")));
        }
        book.rebuild();

        let list = book.peer_list();
        assert_eq!(list.len(), 5);
        assert_eq!(list.get(0), Some(addr(b'C')));
        let order: Vec<u8> = list.iter().map(|a| a.0[0]).collect();
        assert_eq!(order, vec![b'C', b'D', b'E', b'A', b'B']);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let mut book = AddressBook::new(addr(1), "a:1");
        book.add(Peer::new(addr(2), "b:1"));
        book.rebuild();
        let before = book.snapshot();
        book.rebuild();
        assert_eq!(before, book.snapshot());
    }

    #[test]
    fn find_returns_rotated_index() {
        let addresses: Vec<Address> = (1..=6).map(addr).collect();
        let list = PeerList::build(addresses, addr(4));
        assert_eq!(list.find(&addr(4)), Some(0));
        assert_eq!(list.find(&addr(5)), Some(1));
        assert_eq!(list.find(&addr(1)), Some(3));
        assert_eq!(list.find(&addr(9)), None);
    }

    // Two nodes with the same address set but different "self" must see
    // cyclic rotations of one another.
    #[test]
    fn lists_are_cyclic_rotations_across_nodes() {
        let addresses: Vec<Address> = (1..=7).map(addr).collect();
        let reference = PeerList::build(addresses.clone(), addr(1));
        let reference_order: Vec<Address> = reference.iter().collect();

        for self_addr in &addresses {
            let list = PeerList::build(addresses.clone(), *self_addr);
            assert_eq!(list.get(0), Some(*self_addr));

            let order: Vec<Address> = list.iter().collect();
            let shift = reference_order
                .iter()
                .position(|a| a == self_addr)
                .unwrap();
            let rotated: Vec<Address> = (0..reference_order.len())
                .map(|i| reference_order[(shift + i) % reference_order.len()])
                .collect();
            assert_eq!(order, rotated);
        }
    }

    #[test]
    fn removal_marks_dirty_and_shrinks_list() {
        let mut book = AddressBook::new(addr(1), "a:1");
        book.add(Peer::new(addr(2), "b:1"));
        book.add(Peer::new(addr(3), "c:1"));
        book.rebuild();
        assert_eq!(book.peer_list().len(), 3);

        book.remove(&addr(2));
        book.rebuild();
        assert_eq!(book.peer_list().len(), 2);
        assert_eq!(book.peer_list().find(&addr(2)), None);
    }

    // The derived structure must not depend on how addresses were drawn;
    // seeded random sets exercise the sort across realistic address space.
    #[test]
    fn random_address_sets_agree_on_structure() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        let addresses: Vec<Address> = (0..200)
            .map(|_| {
                let mut bytes = [0u8; 20];
                rng.fill(&mut bytes);
                Address(bytes)
            })
            .collect();

        let a = PeerList::build(addresses.clone(), addresses[17]);
        let b = PeerList::build(addresses.clone(), addresses[111]);
        assert_eq!(a.len(), b.len());
        assert_eq!(a.max_levels(), b.max_levels());
        assert_eq!(a.max_levels(), max_levels(200));

        // Same set, different self: one list is a rotation of the other.
        let offset = a.find(&addresses[111]).unwrap();
        for i in 0..a.len() {
            assert_eq!(b.get(i), a.get((offset + i) % a.len()));
        }
    }

    #[test]
    fn score_decrements_on_violation() {
        let mut book = AddressBook::new(addr(1), "a:1");
        book.add(Peer::new(addr(2), "b:1"));
        book.decrement_score(&addr(2));
        book.decrement_score(&addr(2));
        assert_eq!(book.get(&addr(2)).unwrap().score, -2);
    }
}
