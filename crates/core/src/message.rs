//! Consensus wire messages.

use borsh::{BorshDeserialize, BorshSerialize};
use monsoon_types::{Address, Block, PartialSignature, QuorumCertificate, Step, View};

/// A HotStuff protocol message.
///
/// One shape covers all five steps; which optional fields must be present
/// depends on the step and the sender's role:
///
/// - leader proposals at non-NewRound steps carry `qc` (and `block` on
///   Prepare),
/// - replica votes on Prepare/PreCommit/Commit carry `partial_sig`,
/// - NewRound messages carry the sender's highest known `qc`.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct HotstuffMessage {
    pub view: View,
    pub qc: Option<QuorumCertificate>,
    pub block: Option<Block>,
    pub partial_sig: Option<PartialSignature>,
    pub sender: Address,
}

impl HotstuffMessage {
    /// A NewRound message carrying the sender's highest known QC.
    pub fn new_round(view: View, qc: QuorumCertificate, sender: Address) -> Self {
        HotstuffMessage {
            view,
            qc: Some(qc),
            block: None,
            partial_sig: None,
            sender,
        }
    }

    /// A leader proposal for the given step.
    pub fn proposal(
        view: View,
        block: Option<Block>,
        qc: QuorumCertificate,
        sender: Address,
    ) -> Self {
        HotstuffMessage {
            view,
            qc: Some(qc),
            block,
            partial_sig: None,
            sender,
        }
    }

    /// A replica vote carrying a partial signature.
    pub fn vote(view: View, partial_sig: PartialSignature, sender: Address) -> Self {
        HotstuffMessage {
            view,
            qc: None,
            block: None,
            partial_sig: Some(partial_sig),
            sender,
        }
    }

    pub fn step(&self) -> Step {
        self.view.step
    }

    pub fn is_vote(&self) -> bool {
        self.partial_sig.is_some()
    }
}

/// Outbound network messages.
///
/// The runner handles the actual transport: broadcasts ride the RainTree
/// overlay, direct sends go straight to the target peer.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum OutboundMessage {
    /// A HotStuff consensus message.
    Hotstuff(HotstuffMessage),
}

impl OutboundMessage {
    /// Human-readable name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::Hotstuff(m) => m.step().name(),
        }
    }
}
