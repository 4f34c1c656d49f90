//! Monsoon node: module wiring, transport, and configuration.
//!
//! The node runs one event loop per module (p2p, consensus, persistence)
//! over bounded typed queues, a shared worker pool for signature
//! verification, and a frame transport the RainTree overlay routes over.
//! [`spawn_node`] wires everything together from a config and a genesis
//! state; the `monsoon` binary adds the CLI and the TCP listener.

pub mod codec;
pub mod config;
mod crypto_pool;
mod runner;
mod telemetry;
mod timers;
pub mod transport;

pub use config::{ConfigError, NodeConfig};
pub use crypto_pool::CryptoPool;
pub use runner::{spawn_node, CommittedInfo, NodeError, NodeHandle};
pub use telemetry::init_telemetry;
pub use timers::TimerManager;
