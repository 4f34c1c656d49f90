//! Staked actors and their lifecycle.
//!
//! An actor is a staked participant: an application, a validator, a
//! fisherman, or a service node. All four kinds share one row shape; the
//! category picks the Merkle tree the row is committed to and the parameter
//! set that governs its lifecycle.

use crate::address::Address;
use crate::crypto::PublicKey;
use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;

/// Sentinel for "this height field is not in use".
pub const HEIGHT_NOT_USED: i64 = -1;

/// The four staked actor kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize,
)]
pub enum ActorCategory {
    App,
    Validator,
    Fisherman,
    ServiceNode,
}

impl ActorCategory {
    pub const ALL: [ActorCategory; 4] = [
        ActorCategory::App,
        ActorCategory::Validator,
        ActorCategory::Fisherman,
        ActorCategory::ServiceNode,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActorCategory::App => "app",
            ActorCategory::Validator => "validator",
            ActorCategory::Fisherman => "fisherman",
            ActorCategory::ServiceNode => "service_node",
        }
    }

    /// The pool credited when an actor of this category finishes unstaking.
    pub fn stake_pool(self) -> &'static str {
        match self {
            ActorCategory::App => "app_stake_pool",
            ActorCategory::Validator => "validator_stake_pool",
            ActorCategory::Fisherman => "fisherman_stake_pool",
            ActorCategory::ServiceNode => "service_node_stake_pool",
        }
    }
}

impl fmt::Display for ActorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One tree per actor or data category; together they commit the full state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize,
)]
pub enum TreeCategory {
    App,
    Validator,
    Fisherman,
    ServiceNode,
    Account,
    Pool,
    Blocks,
    Params,
    Flags,
}

impl TreeCategory {
    pub const ALL: [TreeCategory; 9] = [
        TreeCategory::App,
        TreeCategory::Validator,
        TreeCategory::Fisherman,
        TreeCategory::ServiceNode,
        TreeCategory::Account,
        TreeCategory::Pool,
        TreeCategory::Blocks,
        TreeCategory::Params,
        TreeCategory::Flags,
    ];
}

impl From<ActorCategory> for TreeCategory {
    fn from(category: ActorCategory) -> Self {
        match category {
            ActorCategory::App => TreeCategory::App,
            ActorCategory::Validator => TreeCategory::Validator,
            ActorCategory::Fisherman => TreeCategory::Fisherman,
            ActorCategory::ServiceNode => TreeCategory::ServiceNode,
        }
    }
}

/// Lifecycle state derived from an actor's height fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeStatus {
    Staked,
    Paused,
    Unstaking,
}

/// A staked actor row as persisted and committed to the state trees.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Actor {
    pub address: Address,
    pub public_key: PublicKey,
    /// Stake as a big-int decimal string.
    pub staked_amount: String,
    /// Chain identifiers this actor serves (empty for validators).
    pub chains: Vec<String>,
    /// Service endpoint advertised by the actor.
    pub service_url: String,
    /// Height the actor was paused at, or [`HEIGHT_NOT_USED`].
    pub paused_height: i64,
    /// Height the actor's stake unlocks at, or [`HEIGHT_NOT_USED`].
    pub unstaking_height: i64,
    /// Address the stake is returned to.
    pub output_address: Address,
    /// Height this row was first inserted.
    pub height_inserted: u64,
    /// Height this row was last modified.
    pub height_updated: u64,
}

impl Actor {
    pub fn status(&self) -> StakeStatus {
        if self.unstaking_height != HEIGHT_NOT_USED {
            StakeStatus::Unstaking
        } else if self.paused_height != HEIGHT_NOT_USED {
            StakeStatus::Paused
        } else {
            StakeStatus::Staked
        }
    }

    /// Canonical bytes committed to the category tree, keyed by address.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("actor serialization is infallible")
    }
}

/// Conversion into the shared actor row.
///
/// Genesis and test fixtures carry category-specific shapes; this trait is
/// the single, explicit bridge into the persisted row.
pub trait AsBaseActor {
    fn to_base(&self) -> Actor;
}
