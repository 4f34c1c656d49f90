//! Event types for the module state machines.

use crate::message::HotstuffMessage;
use monsoon_types::{Hash, View};

/// All possible inputs to the consensus state machine.
///
/// Events are passive data; the state machine processes them in arrival
/// order (FIFO within a module) and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ─── Timers ───
    /// The pacemaker deadline for `view` expired.
    ViewTimeout { view: View },

    // ─── Network ───
    /// A HotStuff message arrived from the overlay or a direct send.
    HotstuffReceived { message: HotstuffMessage },

    // ─── Callbacks: crypto pool ───
    /// A vote's partial signature was verified.
    ///
    /// Callback from [`crate::Action::VerifyVote`].
    VoteVerified { message: HotstuffMessage, valid: bool },

    // ─── Callbacks: persistence ───
    /// A proposed block was validated against the persistence preview.
    ///
    /// Callback from [`crate::Action::ValidateBlock`].
    BlockValidated { block_hash: Hash, valid: bool },

    /// A block was committed and the next state root produced.
    ///
    /// Callback from [`crate::Action::CommitBlock`]. `state_root` is the
    /// root the *next* height's proposal must carry (the committed trees
    /// plus the lifecycle sweep previewed one height ahead).
    BlockCommitted {
        height: u64,
        block_hash: Hash,
        state_root: Hash,
    },

    // ─── Failures ───
    /// A module-level failure, reported as data rather than a panic.
    ModuleFailure { module: &'static str, error: String },
}

impl Event {
    /// The event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::ViewTimeout { .. } => "ViewTimeout",
            Event::HotstuffReceived { .. } => "HotstuffReceived",
            Event::VoteVerified { .. } => "VoteVerified",
            Event::BlockValidated { .. } => "BlockValidated",
            Event::BlockCommitted { .. } => "BlockCommitted",
            Event::ModuleFailure { .. } => "ModuleFailure",
        }
    }
}
