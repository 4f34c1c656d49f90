//! The pacemaker: view timing and message gating.

use crate::config::PacemakerConfig;
use monsoon_core::HotstuffMessage;
use monsoon_types::{Step, ValidatorSet, View};
use std::time::Duration;
use thiserror::Error;

/// Why a message was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacemakerError {
    #[error("message view {message} is behind current view {current}")]
    StaleView { message: View, current: View },

    #[error("sender is not in the validator set for height {0}")]
    UnknownValidator(u64),

    #[error("message height {message} leads current height {current} by more than the jump limit")]
    TooFarAhead { message: u64, current: u64 },
}

/// How an accepted message relates to the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Message is for the current view.
    Current,
    /// Message is ahead within the jump limit; the driver adopts its view.
    FastForward,
    /// Stale NewRound carrying a QC higher than anything seen; harvest the
    /// certificate, ignore the rest.
    HarvestQc,
}

/// Owns view deadlines and the liveness/safety gate for incoming messages.
#[derive(Debug)]
pub struct Pacemaker {
    config: PacemakerConfig,
}

impl Pacemaker {
    pub fn new(config: PacemakerConfig) -> Self {
        Pacemaker { config }
    }

    pub fn config(&self) -> &PacemakerConfig {
        &self.config
    }

    /// Deadline for a round: `base * 2^round`, capped.
    pub fn timeout_for_round(&self, round: u32) -> Duration {
        let exp = round.min(16);
        let timeout = self
            .config
            .base_timeout
            .saturating_mul(1u32 << exp.min(31));
        timeout.min(self.config.max_timeout)
    }

    /// Gate an incoming message against the current view.
    pub fn validate(
        &self,
        message: &HotstuffMessage,
        current: View,
        highest_qc_view: View,
        validators: &ValidatorSet,
    ) -> Result<Gate, PacemakerError> {
        if !validators.contains(&message.sender) {
            return Err(PacemakerError::UnknownValidator(message.view.height));
        }

        if message.view < current {
            // A stale NewRound piggybacking a QC above anything we have seen
            // is still worth harvesting.
            let piggybacked = message.step() == Step::NewRound
                && message
                    .qc
                    .as_ref()
                    .map(|qc| qc.view > highest_qc_view)
                    .unwrap_or(false);
            if piggybacked {
                return Ok(Gate::HarvestQc);
            }
            return Err(PacemakerError::StaleView {
                message: message.view,
                current,
            });
        }

        let lead = message.view.height.saturating_sub(current.height);
        if lead > self.config.jump_limit {
            return Err(PacemakerError::TooFarAhead {
                message: message.view.height,
                current: current.height,
            });
        }

        if message.view == current {
            Ok(Gate::Current)
        } else {
            Ok(Gate::FastForward)
        }
    }
}
