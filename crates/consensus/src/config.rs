//! Consensus configuration.

use std::time::Duration;

/// Pacemaker timing parameters.
#[derive(Debug, Clone)]
pub struct PacemakerConfig {
    /// Base view timeout; doubles each round at the same height.
    pub base_timeout: Duration,
    /// Ceiling for the exponential backoff.
    pub max_timeout: Duration,
    /// Maximum height gap a message may lead by before it is rejected
    /// instead of triggering a fast-forward.
    pub jump_limit: u64,
    /// Manual mode: timers are never armed; a driver (test or debug CLI)
    /// steps views explicitly.
    pub manual: bool,
}

impl Default for PacemakerConfig {
    fn default() -> Self {
        PacemakerConfig {
            base_timeout: Duration::from_millis(5_000),
            max_timeout: Duration::from_secs(60),
            jump_limit: 100,
            manual: false,
        }
    }
}

/// Consensus module configuration.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Upper bound on serialized proposal size.
    pub max_block_bytes: u32,
    pub pacemaker: PacemakerConfig,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            max_block_bytes: 4_000_000,
            pacemaker: PacemakerConfig::default(),
        }
    }
}
