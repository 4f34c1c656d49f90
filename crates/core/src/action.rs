//! Action types for the module state machines.

use crate::message::{HotstuffMessage, OutboundMessage};
use crate::TimerId;
use monsoon_types::{Address, Block, PublicKey, QuorumCertificate};
use std::time::Duration;

/// Actions a state machine wants performed.
///
/// Actions are commands; the runner executes them and may convert results
/// back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ─── Network ───
    /// Broadcast a message to every peer via the RainTree overlay.
    Broadcast { message: OutboundMessage },

    /// Send a message directly to one peer (votes go to the leader).
    SendTo {
        to: Address,
        message: OutboundMessage,
    },

    // ─── Timers ───
    /// Arm a timer; replaces any armed timer with the same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Disarm a timer. No-op if not armed.
    CancelTimer { id: TimerId },

    // ─── Delegated work (returns a callback event) ───
    /// Verify a vote's partial signature on the crypto worker pool.
    ///
    /// The public key and the signing message are pre-resolved by the
    /// driver, which holds the validator set and the proposal the vote must
    /// bind to. Returns [`crate::Event::VoteVerified`].
    VerifyVote {
        message: HotstuffMessage,
        public_key: PublicKey,
        signing_message: Vec<u8>,
    },

    /// Validate a proposed block against the persistence preview.
    ///
    /// Runs inside the persistence module's loop. Returns
    /// [`crate::Event::BlockValidated`].
    ValidateBlock { block: Block },

    /// Execute and commit a decided block.
    ///
    /// Runs inside the persistence module's loop; produces the next state
    /// root. Returns [`crate::Event::BlockCommitted`].
    CommitBlock {
        block: Block,
        commit_qc: QuorumCertificate,
    },

    // ─── External notifications ───
    /// Announce a committed block to external observers.
    EmitCommittedBlock { block: Block },
}

impl Action {
    /// The action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SendTo { .. } => "SendTo",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::VerifyVote { .. } => "VerifyVote",
            Action::ValidateBlock { .. } => "ValidateBlock",
            Action::CommitBlock { .. } => "CommitBlock",
            Action::EmitCommittedBlock { .. } => "EmitCommittedBlock",
        }
    }
}
