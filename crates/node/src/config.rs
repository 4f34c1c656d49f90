//! Node configuration.
//!
//! The config file is a JSON object keyed by module name; each value is a
//! module-specific sub-object. Unknown modules are ignored so operators can
//! carry extra sections for sidecar tooling.

use monsoon_consensus::{ConsensusConfig, PacemakerConfig};
use monsoon_types::{GenesisState, KeyPair};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading configuration or genesis files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid private key: {0}")]
    PrivateKey(#[from] monsoon_types::CryptoError),
}

/// Top-level configuration: one sub-object per module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub base: BaseConfig,
    #[serde(default)]
    pub consensus: ConsensusSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default)]
    pub p2p: P2pSection,
    #[serde(default)]
    pub utility: UtilitySection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default)]
    pub root_directory: String,
    /// Hex-encoded signing key (32-byte seed or 64-byte expanded form).
    #[serde(default)]
    pub private_key: String,
    /// Genesis file path; resolved against `root_directory` when relative.
    #[serde(default = "default_genesis_file")]
    pub genesis_file: String,
}

fn default_genesis_file() -> String {
    "genesis.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusSection {
    #[serde(default = "default_max_block_bytes")]
    pub max_block_bytes: u32,
    #[serde(default)]
    pub pacemaker: PacemakerSection,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        ConsensusSection {
            max_block_bytes: default_max_block_bytes(),
            pacemaker: PacemakerSection::default(),
        }
    }
}

fn default_max_block_bytes() -> u32 {
    4_000_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacemakerSection {
    #[serde(default = "default_timeout_msec")]
    pub timeout_msec: u32,
    #[serde(default = "default_max_timeout_msec")]
    pub max_timeout_msec: u32,
    #[serde(default)]
    pub manual: bool,
    /// Debug pacing between steps; zero disables it.
    #[serde(default)]
    pub debug_time_between_steps_msec: u32,
}

impl Default for PacemakerSection {
    fn default() -> Self {
        PacemakerSection {
            timeout_msec: default_timeout_msec(),
            max_timeout_msec: default_max_timeout_msec(),
            manual: false,
            debug_time_between_steps_msec: 0,
        }
    }
}

fn default_timeout_msec() -> u32 {
    5_000
}

fn default_max_timeout_msec() -> u32 {
    60_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceSection {
    /// Data directory for the storage backend; empty selects the in-memory
    /// reference store.
    #[serde(default)]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2pSection {
    /// Hex-encoded network key. Falls back to `base.private_key` when empty.
    #[serde(default)]
    pub private_key: String,
    #[serde(default = "default_consensus_port")]
    pub consensus_port: u16,
    #[serde(default = "default_true")]
    pub use_raintree: bool,
    /// Loopback mode for single-process networks: no listener is bound.
    #[serde(default)]
    pub is_empty_connection_type: bool,
}

impl Default for P2pSection {
    fn default() -> Self {
        P2pSection {
            private_key: String::new(),
            consensus_port: default_consensus_port(),
            use_raintree: true,
            is_empty_connection_type: false,
        }
    }
}

fn default_consensus_port() -> u16 {
    8221
}

fn default_true() -> bool {
    true
}

/// Placeholder for the transaction-policy module's options; carried so its
/// section round-trips, interpreted elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtilitySection {
    #[serde(default)]
    pub max_mempool_transaction_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `tracing` filter directive, e.g. `info` or `monsoon_consensus=debug`.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        TelemetrySection {
            enabled: true,
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The node's signing keypair from `base.private_key`.
    pub fn keypair(&self) -> Result<KeyPair, ConfigError> {
        Ok(KeyPair::from_hex(&self.base.private_key)?)
    }

    /// Resolve and load the genesis file.
    pub fn load_genesis(&self) -> Result<GenesisState, ConfigError> {
        let mut path = PathBuf::from(&self.base.root_directory);
        path.push(&self.base.genesis_file);
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    /// The consensus module's typed configuration.
    pub fn consensus_config(&self) -> ConsensusConfig {
        ConsensusConfig {
            max_block_bytes: self.consensus.max_block_bytes,
            pacemaker: PacemakerConfig {
                base_timeout: Duration::from_millis(self.consensus.pacemaker.timeout_msec as u64),
                max_timeout: Duration::from_millis(
                    self.consensus.pacemaker.max_timeout_msec as u64,
                ),
                jump_limit: 100,
                manual: self.consensus.pacemaker.manual,
            },
        }
    }
}

/// Test-artifact helpers: fabricate per-validator configs and a genesis
/// validator set for an `n`-node network.
pub mod test_artifacts {
    use super::*;
    use monsoon_types::{ConsensusGenesis, GenesisActor, GenesisPeer, P2pGenesis, Params, PersistenceGenesis};

    /// Deterministic keypairs for an `n`-validator test network.
    pub fn validator_keys(n: usize) -> Vec<KeyPair> {
        (0..n)
            .map(|i| {
                let mut seed = [0u8; 32];
                seed[0] = (i + 1) as u8;
                seed[1] = 0xA5;
                KeyPair::from_seed(seed)
            })
            .collect()
    }

    /// A genesis state whose validator set and peer list are the given keys.
    pub fn genesis_state(keys: &[KeyPair], base_port: u16) -> GenesisState {
        let validators: Vec<GenesisActor> = keys
            .iter()
            .map(|kp| GenesisActor {
                address: kp.address(),
                public_key: kp.public_key(),
                staked_amount: "1000000000000000".to_string(),
                chains: Vec::new(),
                service_url: String::new(),
                output_address: Some(kp.address()),
            })
            .collect();
        let peers: Vec<GenesisPeer> = keys
            .iter()
            .enumerate()
            .map(|(i, kp)| GenesisPeer {
                address: kp.address(),
                service_url: format!("127.0.0.1:{}", base_port + i as u16),
            })
            .collect();

        GenesisState {
            persistence_genesis_state: PersistenceGenesis {
                validators: validators.clone(),
                ..PersistenceGenesis::default()
            },
            consensus_genesis_state: ConsensusGenesis {
                validators,
                params: Params::defaults(),
            },
            p2p_genesis_state: P2pGenesis { peers },
        }
    }

    /// Per-validator configs for an `n`-node network on localhost.
    pub fn configs(keys: &[KeyPair], base_port: u16) -> Vec<NodeConfig> {
        keys.iter()
            .enumerate()
            .map(|(i, kp)| NodeConfig {
                base: BaseConfig {
                    root_directory: String::new(),
                    // Expanded key form: seed ‖ pubkey, as the key tooling
                    // writes it.
                    private_key: {
                        let mut seed = [0u8; 32];
                        seed[0] = (i + 1) as u8;
                        seed[1] = 0xA5;
                        format!("{}{}", hex::encode(seed), kp.public_key().to_hex())
                    },
                    genesis_file: "genesis.json".to_string(),
                },
                p2p: P2pSection {
                    consensus_port: base_port + i as u16,
                    use_raintree: true,
                    is_empty_connection_type: true,
                    ..P2pSection::default()
                },
                ..NodeConfig::default()
            })
            .collect()
    }
}
