//! State commitment and the height-scoped persistence context.
//!
//! This crate owns the node's committed state:
//!
//! - a bank of per-category sparse Merkle trees whose sorted roots hash into
//!   the single per-block **state root**,
//! - the height-versioned actor, account, pool, parameter, and flag tables,
//! - the [`PersistenceContext`], the only surface through which consensus
//!   reads or writes any of it.
//!
//! Consensus progression depends on the state root being a pure function of
//! the committed `(category, key, value)` triples: identical on every
//! replica, independent of insertion order, and stable under repeated
//! recomputation. The tests in `tests/` pin those properties.

mod context;
mod smt;
mod store;
mod tree_bank;

pub use context::{PersistenceContext, PersistenceError, PersistenceManager};
pub use smt::SparseMerkleTree;
pub use store::{KvStore, MemKvStore};
pub use tree_bank::TreeBank;
