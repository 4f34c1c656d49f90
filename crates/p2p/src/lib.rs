//! RainTree structured gossip overlay.
//!
//! RainTree delivers a message from any originator to every node in an
//! N-peer network in O(log₃ N) hops. Each node owns a deterministic
//! **peer list** (the peer set sorted by address and rotated so the local
//! node sits at index 0) and at each level of the broadcast forwards to two
//! computed targets, delegating a third of the remaining list to each.
//!
//! Two extra layers harden delivery:
//!
//! - **redundancy** (level 0): the originator re-sends to its top-level
//!   targets,
//! - **cleanup** (level −1): the originator sends to its immediate left and
//!   right neighbors on the ring.
//!
//! Because the peer list is fully determined by the set of addresses, every
//! node independently computes identical target indices and the broadcast
//! tree is reproducible.
//!
//! This crate is pure: routing decisions come back as data and the caller
//! owns all transport I/O.

mod addrbook;
mod raintree;
mod seen_cache;

pub use addrbook::{max_levels, AddressBook, Peer, PeerList, SharedAddressBook};
pub use raintree::{
    RainTreeEnvelope, RainTreeOutcome, RainTreeRouter, RainTreeSend, LEVEL_CLEANUP,
    LEVEL_REDUNDANCY,
};
pub use seen_cache::SeenCache;

use thiserror::Error;

/// Errors from the overlay.
#[derive(Debug, Error)]
pub enum P2pError {
    #[error("peer {0} is not in the address book")]
    UnknownPeer(monsoon_types::Address),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}
