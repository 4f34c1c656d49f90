//! Genesis state, as loaded from the JSON genesis file.

use crate::actor::{Actor, ActorCategory, AsBaseActor, HEIGHT_NOT_USED};
use crate::address::Address;
use crate::crypto::PublicKey;
use crate::params::Params;
use crate::validator::{ValidatorInfo, ValidatorSet};
use serde::{Deserialize, Serialize};

/// Top-level genesis file: one sub-object per module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenesisState {
    #[serde(default)]
    pub persistence_genesis_state: PersistenceGenesis,
    #[serde(default)]
    pub consensus_genesis_state: ConsensusGenesis,
    #[serde(default)]
    pub p2p_genesis_state: P2pGenesis,
}

/// Initial persisted state: actors, accounts, pools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceGenesis {
    #[serde(default)]
    pub apps: Vec<GenesisActor>,
    #[serde(default)]
    pub validators: Vec<GenesisActor>,
    #[serde(default)]
    pub fishermen: Vec<GenesisActor>,
    #[serde(default)]
    pub service_nodes: Vec<GenesisActor>,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
    #[serde(default)]
    pub pools: Vec<GenesisPool>,
}

impl PersistenceGenesis {
    /// Genesis actors for a category.
    pub fn actors(&self, category: ActorCategory) -> &[GenesisActor] {
        match category {
            ActorCategory::App => &self.apps,
            ActorCategory::Validator => &self.validators,
            ActorCategory::Fisherman => &self.fishermen,
            ActorCategory::ServiceNode => &self.service_nodes,
        }
    }
}

/// Initial consensus state: the validator set and parameter table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusGenesis {
    #[serde(default)]
    pub validators: Vec<GenesisActor>,
    #[serde(default)]
    pub params: Params,
}

impl ConsensusGenesis {
    /// The validator set in election order.
    pub fn validator_set(&self) -> ValidatorSet {
        ValidatorSet::new(
            self.validators
                .iter()
                .map(|v| ValidatorInfo {
                    address: v.address,
                    public_key: v.public_key,
                    staked_amount: v.staked_amount.clone(),
                    service_url: v.service_url.clone(),
                })
                .collect(),
        )
    }
}

/// Initial peer list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct P2pGenesis {
    #[serde(default)]
    pub peers: Vec<GenesisPeer>,
}

/// A staked actor as written in the genesis file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisActor {
    pub address: Address,
    pub public_key: PublicKey,
    pub staked_amount: String,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub service_url: String,
    #[serde(default)]
    pub output_address: Option<Address>,
}

impl AsBaseActor for GenesisActor {
    fn to_base(&self) -> Actor {
        Actor {
            address: self.address,
            public_key: self.public_key,
            staked_amount: self.staked_amount.clone(),
            chains: self.chains.clone(),
            service_url: self.service_url.clone(),
            paused_height: HEIGHT_NOT_USED,
            unstaking_height: HEIGHT_NOT_USED,
            output_address: self.output_address.unwrap_or(self.address),
            height_inserted: 0,
            height_updated: 0,
        }
    }
}

/// An account balance at genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub amount: String,
}

/// A protocol pool balance at genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisPool {
    pub name: String,
    pub amount: String,
}

/// A peer known at genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisPeer {
    pub address: Address,
    pub service_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_genesis() {
        let json = r#"{
            "persistence_genesis_state": {
                "validators": [{
                    "address": "0101010101010101010101010101010101010101",
                    "public_key": "0202020202020202020202020202020202020202020202020202020202020202",
                    "staked_amount": "1000000000000000"
                }]
            },
            "consensus_genesis_state": {
                "validators": [{
                    "address": "0101010101010101010101010101010101010101",
                    "public_key": "0202020202020202020202020202020202020202020202020202020202020202",
                    "staked_amount": "1000000000000000"
                }],
                "params": {}
            },
            "p2p_genesis_state": { "peers": [] }
        }"#;

        let genesis: GenesisState = serde_json::from_str(json).unwrap();
        let set = genesis.consensus_genesis_state.validator_set();
        assert_eq!(set.len(), 1);

        let base = genesis.persistence_genesis_state.validators[0].to_base();
        assert_eq!(base.paused_height, HEIGHT_NOT_USED);
        assert_eq!(base.output_address, base.address);
    }
}
