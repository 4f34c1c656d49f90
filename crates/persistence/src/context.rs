//! The height-scoped persistence context.
//!
//! A [`PersistenceContext`] is a read/write view over actor, account, pool,
//! parameter, and block state, bounded to a single height. Writes accumulate
//! in the context and become visible to queries immediately; nothing touches
//! committed state until [`PersistenceContext::commit`] consumes the
//! context. [`PersistenceContext::release`] drops every uncommitted write,
//! and simply letting the context fall out of scope has the same effect, so
//! a context is settled on all paths.

use crate::store::KvStore;
use crate::tree_bank::TreeBank;
use monsoon_types::{
    add_decimal, param_names, Actor, ActorCategory, Address, Block, Hash, ParamValue, Params,
    PersistenceGenesis, TreeCategory, AsBaseActor, DEFAULT_UNSTAKING_BLOCKS, HEIGHT_NOT_USED,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unknown {category} actor {address}")]
    UnknownActor {
        category: ActorCategory,
        address: Address,
    },

    #[error("context height {context} precedes committed height {committed}")]
    HeightRegression { context: u64, committed: u64 },

    /// Invariant breach: the root cached by `update_state_hash` no longer
    /// matches the context's writes. Fatal: the caller halts the node.
    #[error("state root mismatch at commit: cached {cached}, recomputed {recomputed}")]
    RootMismatch { cached: Hash, recomputed: Hash },
}

/// One historical version of an actor row. `None` records a deletion.
#[derive(Debug, Clone)]
struct ActorVersion {
    height: u64,
    row: Option<Actor>,
}

/// Committed, height-versioned node state plus the Merkle tree bank.
#[derive(Debug, Default)]
struct CommittedState {
    /// Full version history per actor, ascending by height.
    actors: BTreeMap<(ActorCategory, Address), Vec<ActorVersion>>,
    /// Latest value and the height it changed at.
    accounts: BTreeMap<Address, (u64, String)>,
    pools: BTreeMap<String, (u64, String)>,
    params: BTreeMap<String, (u64, ParamValue)>,
    flags: BTreeMap<String, (u64, bool)>,
    trees: TreeBank,
    latest_height: Option<u64>,
    latest_block_hash: Hash,
    state_root: Hash,
}

/// Buffered writes belonging to one context.
#[derive(Debug, Default)]
struct PendingWrites {
    actors: BTreeMap<(ActorCategory, Address), Option<Actor>>,
    accounts: BTreeMap<Address, String>,
    pools: BTreeMap<String, String>,
    params: BTreeMap<String, ParamValue>,
    flags: BTreeMap<String, bool>,
    block: Option<Block>,
}

/// Owner of committed state. Lives inside the persistence module's loop;
/// consensus reaches it only through contexts.
pub struct PersistenceManager {
    state: CommittedState,
    kv: Box<dyn KvStore>,
}

impl PersistenceManager {
    pub fn new(kv: Box<dyn KvStore>) -> Self {
        PersistenceManager {
            state: CommittedState::default(),
            kv,
        }
    }

    /// Build committed state from genesis: actor rows, account and pool
    /// balances, and the parameter table, all inserted at height 0.
    pub fn from_genesis(
        genesis: &PersistenceGenesis,
        params: &Params,
        kv: Box<dyn KvStore>,
    ) -> Result<Self, PersistenceError> {
        let mut manager = Self::new(kv);
        let mut ctx = manager.context(0)?;
        for category in ActorCategory::ALL {
            for genesis_actor in genesis.actors(category) {
                ctx.insert_actor(category, genesis_actor.to_base());
            }
        }
        for account in &genesis.accounts {
            ctx.set_account_amount(account.address, account.amount.clone());
        }
        for pool in &genesis.pools {
            ctx.set_pool_amount(pool.name.clone(), pool.amount.clone());
        }
        for (name, value) in &params.0 {
            ctx.set_param(name.clone(), value.clone());
        }
        let root = ctx.commit()?;
        info!(%root, "genesis state committed");
        Ok(manager)
    }

    /// Open a context at `height`. Heights must not regress behind the
    /// committed tip.
    pub fn context(&mut self, height: u64) -> Result<PersistenceContext<'_>, PersistenceError> {
        if let Some(committed) = self.state.latest_height {
            if height <= committed {
                return Err(PersistenceError::HeightRegression {
                    context: height,
                    committed,
                });
            }
        }
        Ok(PersistenceContext {
            manager: self,
            height,
            pending: PendingWrites::default(),
            cached_root: None,
        })
    }

    pub fn latest_height(&self) -> Option<u64> {
        self.state.latest_height
    }

    pub fn state_root(&self) -> Hash {
        self.state.state_root
    }

    pub fn latest_block_hash(&self) -> Hash {
        self.state.latest_block_hash
    }

    /// A committed block's bytes, if stored.
    pub fn block_bytes(&self, height: u64) -> Option<Vec<u8>> {
        self.kv.get(&block_key(height))
    }

    fn committed_actor_at(
        &self,
        category: ActorCategory,
        address: &Address,
        height: u64,
    ) -> Option<Actor> {
        self.state
            .actors
            .get(&(category, *address))?
            .iter()
            .rev()
            .find(|v| v.height <= height)
            .and_then(|v| v.row.clone())
    }
}

fn block_key(height: u64) -> Vec<u8> {
    let mut key = b"block/".to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Height-bounded read/write view. See the module docs for the lifecycle.
pub struct PersistenceContext<'a> {
    manager: &'a mut PersistenceManager,
    height: u64,
    pending: PendingWrites,
    cached_root: Option<Hash>,
}

impl PersistenceContext<'_> {
    pub fn height(&self) -> u64 {
        self.height
    }

    // ─── Actors ───

    /// The actor as visible to this context: pending writes shadow
    /// committed versions.
    pub fn get_actor(&self, category: ActorCategory, address: &Address) -> Option<Actor> {
        match self.pending.actors.get(&(category, *address)) {
            Some(Some(row)) => Some(row.clone()),
            Some(None) => None,
            None => self
                .manager
                .committed_actor_at(category, address, self.height),
        }
    }

    /// All actors of a category visible at this context's height,
    /// address-ascending.
    pub fn get_all_actors(&self, category: ActorCategory) -> Vec<Actor> {
        let mut addresses: Vec<Address> = self
            .manager
            .state
            .actors
            .range((category, Address([0u8; 20]))..=(category, Address([0xffu8; 20])))
            .map(|((_, addr), _)| *addr)
            .collect();
        for (cat, addr) in self.pending.actors.keys() {
            if *cat == category && !addresses.contains(addr) {
                addresses.push(*addr);
            }
        }
        addresses.sort_unstable();

        addresses
            .into_iter()
            .filter_map(|addr| self.get_actor(category, &addr))
            .collect()
    }

    /// Actor rows of a category whose latest update happened exactly at
    /// `height`, including deletions (`None`).
    pub fn actors_updated_at(
        &self,
        category: ActorCategory,
        height: u64,
    ) -> Vec<(Address, Option<Actor>)> {
        let mut updates: BTreeMap<Address, Option<Actor>> = self
            .manager
            .state
            .actors
            .range((category, Address([0u8; 20]))..=(category, Address([0xffu8; 20])))
            .filter_map(|((_, addr), versions)| {
                versions
                    .iter()
                    .rev()
                    .find(|v| v.height == height)
                    .map(|v| (*addr, v.row.clone()))
            })
            .collect();

        if height == self.height {
            for ((cat, addr), row) in &self.pending.actors {
                if *cat == category {
                    updates.insert(*addr, row.clone());
                }
            }
        }
        updates.into_iter().collect()
    }

    /// Actors of a category updated at `height` and still live.
    pub fn get_actors_updated_at(&self, category: ActorCategory, height: u64) -> Vec<Actor> {
        self.actors_updated_at(category, height)
            .into_iter()
            .filter_map(|(_, row)| row)
            .collect()
    }

    /// Insert a new actor row (staking). Height fields are stamped with the
    /// context height.
    pub fn insert_actor(&mut self, category: ActorCategory, mut actor: Actor) {
        actor.height_inserted = self.height;
        actor.height_updated = self.height;
        self.pending.actors.insert((category, actor.address), Some(actor));
    }

    pub fn get_actor_stake(
        &self,
        category: ActorCategory,
        address: &Address,
    ) -> Result<String, PersistenceError> {
        self.get_actor(category, address)
            .map(|a| a.staked_amount)
            .ok_or(PersistenceError::UnknownActor {
                category,
                address: *address,
            })
    }

    pub fn set_actor_stake(
        &mut self,
        category: ActorCategory,
        address: &Address,
        amount: String,
    ) -> Result<(), PersistenceError> {
        self.update_actor(category, address, |actor| actor.staked_amount = amount)
    }

    pub fn set_actor_pause_height(
        &mut self,
        category: ActorCategory,
        address: &Address,
        height: i64,
    ) -> Result<(), PersistenceError> {
        self.update_actor(category, address, |actor| actor.paused_height = height)
    }

    pub fn get_pause_height(
        &self,
        category: ActorCategory,
        address: &Address,
    ) -> Result<i64, PersistenceError> {
        self.get_actor(category, address)
            .map(|a| a.paused_height)
            .ok_or(PersistenceError::UnknownActor {
                category,
                address: *address,
            })
    }

    pub fn delete_actor(
        &mut self,
        category: ActorCategory,
        address: &Address,
    ) -> Result<(), PersistenceError> {
        if self.get_actor(category, address).is_none() {
            return Err(PersistenceError::UnknownActor {
                category,
                address: *address,
            });
        }
        self.pending.actors.insert((category, *address), None);
        Ok(())
    }

    fn update_actor(
        &mut self,
        category: ActorCategory,
        address: &Address,
        mutate: impl FnOnce(&mut Actor),
    ) -> Result<(), PersistenceError> {
        let mut actor =
            self.get_actor(category, address)
                .ok_or(PersistenceError::UnknownActor {
                    category,
                    address: *address,
                })?;
        mutate(&mut actor);
        actor.height_updated = self.height;
        self.pending.actors.insert((category, *address), Some(actor));
        Ok(())
    }

    // ─── Stake lifecycle ───

    /// Number of blocks an unstaking actor of `category` waits before
    /// deletion.
    pub fn unstaking_blocks(&self, category: ActorCategory) -> i64 {
        self.get_param(&param_names::unstaking_blocks(category))
            .and_then(|v| v.as_int())
            .unwrap_or(DEFAULT_UNSTAKING_BLOCKS)
    }

    /// Move every actor of `category` paused strictly before `before` into
    /// Unstaking, with `unstaking_height = context_height + unstaking_blocks`.
    pub fn unstake_actors_paused_before(
        &mut self,
        category: ActorCategory,
        before: i64,
    ) -> Result<(), PersistenceError> {
        let unstaking_height = self.height as i64 + self.unstaking_blocks(category);
        let paused: Vec<Address> = self
            .get_all_actors(category)
            .into_iter()
            .filter(|a| {
                a.paused_height != HEIGHT_NOT_USED
                    && a.paused_height < before
                    && a.unstaking_height == HEIGHT_NOT_USED
            })
            .map(|a| a.address)
            .collect();

        for address in paused {
            debug!(%address, category = %category, unstaking_height, "actor begins unstaking");
            self.update_actor(category, &address, |actor| {
                actor.unstaking_height = unstaking_height;
            })?;
        }
        Ok(())
    }

    /// Delete every actor whose unstaking height has been reached and credit
    /// its stake to the category's pool.
    pub fn unstake_actors_that_are_ready(&mut self) -> Result<(), PersistenceError> {
        for category in ActorCategory::ALL {
            let ready: Vec<Actor> = self
                .get_all_actors(category)
                .into_iter()
                .filter(|a| {
                    a.unstaking_height != HEIGHT_NOT_USED
                        && a.unstaking_height <= self.height as i64
                })
                .collect();

            for actor in ready {
                debug!(address = %actor.address, category = %category, "unstaking actor deleted");
                self.add_pool_amount(category.stake_pool(), &actor.staked_amount);
                self.delete_actor(category, &actor.address)?;
            }
        }
        Ok(())
    }

    // ─── Accounts and pools ───

    pub fn get_account_amount(&self, address: &Address) -> String {
        if let Some(amount) = self.pending.accounts.get(address) {
            return amount.clone();
        }
        self.manager
            .state
            .accounts
            .get(address)
            .map(|(_, amount)| amount.clone())
            .unwrap_or_else(|| "0".to_string())
    }

    pub fn set_account_amount(&mut self, address: Address, amount: String) {
        self.pending.accounts.insert(address, amount);
    }

    pub fn get_pool_amount(&self, name: &str) -> String {
        if let Some(amount) = self.pending.pools.get(name) {
            return amount.clone();
        }
        self.manager
            .state
            .pools
            .get(name)
            .map(|(_, amount)| amount.clone())
            .unwrap_or_else(|| "0".to_string())
    }

    pub fn set_pool_amount(&mut self, name: impl Into<String>, amount: String) {
        self.pending.pools.insert(name.into(), amount);
    }

    pub fn add_pool_amount(&mut self, name: &str, amount: &str) {
        let sum = add_decimal(&self.get_pool_amount(name), amount);
        self.pending.pools.insert(name.to_string(), sum);
    }

    // ─── Params and flags ───

    pub fn get_param(&self, name: &str) -> Option<ParamValue> {
        if let Some(value) = self.pending.params.get(name) {
            return Some(value.clone());
        }
        self.manager
            .state
            .params
            .get(name)
            .map(|(_, value)| value.clone())
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: ParamValue) {
        self.pending.params.insert(name.into(), value);
    }

    pub fn get_flag(&self, name: &str) -> Option<bool> {
        if let Some(value) = self.pending.flags.get(name) {
            return Some(*value);
        }
        self.manager.state.flags.get(name).map(|(_, value)| *value)
    }

    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) {
        self.pending.flags.insert(name.into(), value);
    }

    // ─── Blocks ───

    /// Record the block this context is applying. Its bytes enter the
    /// `Blocks` tree after the state root is sealed, so the root a block
    /// header carries never depends on the block's own bytes.
    pub fn store_block(&mut self, block: Block) {
        self.pending.block = Some(block);
    }

    // ─── State commitment ───

    /// Update the Merkle trees with everything this height touched and
    /// return the resulting state root.
    ///
    /// Idempotent within a height: the root is recomputed from scratch over
    /// the same update set on every invocation, so repeated calls without
    /// intervening writes return identical bytes.
    pub fn update_state_hash(&mut self) -> Hash {
        let mut bank = self.manager.state.trees.clone();
        self.apply_tree_updates(&mut bank);
        let root = bank.state_root();
        self.cached_root = Some(root);
        root
    }

    fn apply_tree_updates(&self, bank: &mut TreeBank) {
        for category in ActorCategory::ALL {
            for (address, row) in self.actors_updated_at(category, self.height) {
                match row {
                    Some(actor) => bank.upsert(
                        category.into(),
                        address.as_bytes(),
                        &actor.canonical_bytes(),
                    ),
                    None => bank.delete(category.into(), address.as_bytes()),
                }
            }
        }
        for (address, amount) in &self.pending.accounts {
            bank.upsert(
                TreeCategory::Account,
                address.as_bytes(),
                &canonical_bytes(amount),
            );
        }
        for (name, amount) in &self.pending.pools {
            bank.upsert(TreeCategory::Pool, name.as_bytes(), &canonical_bytes(amount));
        }
        for (name, value) in &self.pending.params {
            bank.upsert(TreeCategory::Params, name.as_bytes(), &canonical_bytes(value));
        }
        for (name, value) in &self.pending.flags {
            bank.upsert(TreeCategory::Flags, name.as_bytes(), &canonical_bytes(value));
        }
    }

    /// Seal this height: verify the cached root, fold pending writes into
    /// committed state, advance the trees, and persist the block.
    pub fn commit(mut self) -> Result<Hash, PersistenceError> {
        let recomputed = {
            let mut bank = self.manager.state.trees.clone();
            self.apply_tree_updates(&mut bank);
            bank.state_root()
        };
        if let Some(cached) = self.cached_root {
            if cached != recomputed {
                return Err(PersistenceError::RootMismatch {
                    cached,
                    recomputed,
                });
            }
        }

        let height = self.height;

        // Advance the trees from the same update set the root was computed
        // over.
        let mut bank = self.manager.state.trees.clone();
        self.apply_tree_updates(&mut bank);

        if let Some(block) = self.pending.block.take() {
            let bytes = borsh::to_vec(&block).expect("block serialization is infallible");
            // The block enters the tree after the root was sealed; it
            // surfaces in the next height's root.
            bank.upsert(TreeCategory::Blocks, &height.to_be_bytes(), &bytes);
            self.manager.kv.put(block_key(height), bytes);
            self.manager.state.latest_block_hash = block.hash();
        }

        let state = &mut self.manager.state;
        for ((category, address), row) in std::mem::take(&mut self.pending.actors) {
            state
                .actors
                .entry((category, address))
                .or_default()
                .push(ActorVersion { height, row });
        }
        for (address, amount) in std::mem::take(&mut self.pending.accounts) {
            state.accounts.insert(address, (height, amount));
        }
        for (name, amount) in std::mem::take(&mut self.pending.pools) {
            state.pools.insert(name, (height, amount));
        }
        for (name, value) in std::mem::take(&mut self.pending.params) {
            state.params.insert(name, (height, value));
        }
        for (name, value) in std::mem::take(&mut self.pending.flags) {
            state.flags.insert(name, (height, value));
        }
        state.trees = bank;
        state.latest_height = Some(height);
        state.state_root = recomputed;
        debug!(height, root = %recomputed, "height committed");
        Ok(recomputed)
    }

    /// Drop every uncommitted write.
    pub fn release(self) {
        debug!(height = self.height, "context released");
    }
}

fn canonical_bytes<T: borsh::BorshSerialize>(value: &T) -> Vec<u8> {
    borsh::to_vec(value).expect("canonical serialization is infallible")
}
