//! The HotStuff driver.
//!
//! A synchronous state machine advancing `(height, round, step)` through the
//! five protocol steps. The driver plays both roles: every node runs the
//! replica handlers, and whichever node the election picked additionally
//! runs the leader handlers. All I/O (broadcasts, direct sends, timers,
//! signature verification, persistence effects) is returned as actions.
//!
//! Message dispatch order follows the protocol:
//!
//! 1. the pacemaker gates the message for liveness and safety,
//! 2. a leader is elected if the view has none yet,
//! 3. the replica handler runs (unless this node leads the view),
//! 4. the leader handler runs.

use crate::config::ConsensusConfig;
use crate::leader::elect_leader;
use crate::pacemaker::{Gate, Pacemaker};
use crate::vote_set::VoteSet;
use monsoon_core::{Action, Event, HotstuffMessage, OutboundMessage, StateMachine, TimerId};
use monsoon_types::{
    vote_message, Address, Block, BlockHeader, Hash, KeyPair, PartialSignature,
    QuorumCertificate, Step, Transaction, ValidatorSet, View,
};
use std::collections::{BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// A proposal handed to persistence for validation, pinned to the view that
/// requested it. The result is abandoned if the view has moved on.
#[derive(Debug, Clone)]
struct PendingValidation {
    view: View,
    block: Block,
}

/// The HotStuff consensus state machine.
pub struct HotstuffDriver {
    // ─── Identity ───
    keypair: KeyPair,
    address: Address,
    validators: ValidatorSet,
    config: ConsensusConfig,
    pacemaker: Pacemaker,

    // ─── View state ───
    view: View,
    leader: Option<Address>,

    // ─── Safety state ───
    /// QC we are locked on (set from a valid preCommit QC).
    locked_qc: Option<QuorumCertificate>,
    /// Highest prepare-step QC seen for the current height.
    prepare_qc: Option<QuorumCertificate>,
    /// Highest QC of any step seen anywhere.
    high_qc: QuorumCertificate,
    /// Block hash this node voted for, per `(height, round)`. A validator
    /// signs at most one block per view.
    voted: HashMap<(u64, u32), Hash>,

    // ─── Round state ───
    /// The proposal for the current height (survives round changes so a
    /// certified block can be re-proposed).
    proposal: Option<Block>,
    /// Leader-side vote collection per vote view.
    vote_sets: HashMap<View, VoteSet>,
    /// Distinct NewRound senders per `(height, round)`.
    new_round_senders: HashMap<(u64, u32), BTreeSet<Address>>,
    /// Proposal awaiting the persistence preview.
    pending_validation: Option<PendingValidation>,

    // ─── Chain state ───
    committed_height: u64,
    latest_block_hash: Hash,
    /// State root the next proposal must carry; produced by persistence at
    /// each commit.
    next_state_root: Hash,
}

impl HotstuffDriver {
    pub fn new(
        keypair: KeyPair,
        validators: ValidatorSet,
        config: ConsensusConfig,
        genesis_state_root: Hash,
    ) -> Self {
        let address = keypair.address();
        let pacemaker = Pacemaker::new(config.pacemaker.clone());
        HotstuffDriver {
            keypair,
            address,
            validators,
            config,
            pacemaker,
            view: View::genesis(),
            leader: None,
            locked_qc: None,
            prepare_qc: None,
            high_qc: QuorumCertificate::genesis(),
            voted: HashMap::new(),
            proposal: None,
            vote_sets: HashMap::new(),
            new_round_senders: HashMap::new(),
            pending_validation: None,
            committed_height: 0,
            latest_block_hash: Hash::ZERO,
            next_state_root: genesis_state_root,
        }
    }

    // ─── Accessors (used by the runner and tests) ───

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn leader(&self) -> Option<Address> {
        self.leader
    }

    pub fn committed_height(&self) -> u64 {
        self.committed_height
    }

    pub fn latest_block_hash(&self) -> Hash {
        self.latest_block_hash
    }

    pub fn high_qc(&self) -> &QuorumCertificate {
        &self.high_qc
    }

    fn is_leader(&self) -> bool {
        self.leader == Some(self.address)
    }

    /// Enter the first view. Returns the startup actions.
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        let height = self.committed_height + 1;
        info!(height, address = %self.address, "consensus starting");
        self.begin_round(height, 0, &mut actions);
        actions
    }

    // ─── Round entry ───

    fn begin_round(&mut self, height: u64, round: u32, actions: &mut Vec<Action>) {
        if height != self.view.height {
            self.proposal = None;
            self.prepare_qc = None;
            self.pending_validation = None;
        }
        self.view = View {
            height,
            round,
            step: Step::NewRound,
        };
        self.leader = elect_leader(&self.validators, height, round);
        debug!(height, round, leader = ?self.leader, "entering round");

        if !self.pacemaker.config().manual {
            actions.push(Action::SetTimer {
                id: TimerId::ViewChange,
                duration: self.pacemaker.timeout_for_round(round),
            });
        }

        // Everyone announces the round with the highest QC it knows.
        let new_round =
            HotstuffMessage::new_round(self.view, self.high_qc.clone(), self.address);
        actions.push(Action::Broadcast {
            message: OutboundMessage::Hotstuff(new_round),
        });

        self.note_new_round(self.address, height, round);
        self.try_propose(actions);
    }

    fn note_new_round(&mut self, sender: Address, height: u64, round: u32) {
        self.new_round_senders
            .entry((height, round))
            .or_default()
            .insert(sender);
    }

    fn new_round_quorum(&self) -> bool {
        self.new_round_senders
            .get(&(self.view.height, self.view.round))
            .map(|s| s.len() >= self.validators.quorum_threshold())
            .unwrap_or(false)
    }

    /// Leader: propose once the round has gathered a quorum of NewRounds.
    fn try_propose(&mut self, actions: &mut Vec<Action>) {
        if !self.is_leader() || self.view.step != Step::NewRound || !self.new_round_quorum() {
            return;
        }
        // The parent hash and state root for this height arrive with the
        // previous commit's callback; proposing before that lands would
        // extend a stale chain state.
        if self.view.height != self.committed_height + 1 {
            debug!(view = %self.view, committed = self.committed_height, "proposal deferred until commit lands");
            return;
        }

        let block = match self.proposal.clone() {
            // A block certified in an earlier round of this height is
            // re-proposed verbatim so locked replicas can accept it.
            Some(block) => block,
            None => self.build_block(),
        };
        let block_hash = block.hash();
        self.proposal = Some(block.clone());
        self.view.step = Step::Prepare;

        info!(view = %self.view, block = %block_hash, "proposing");
        let proposal = HotstuffMessage::proposal(
            self.view,
            Some(block),
            self.high_qc.clone(),
            self.address,
        );
        actions.push(Action::Broadcast {
            message: OutboundMessage::Hotstuff(proposal),
        });

        // The leader also plays the replica role for its own proposal.
        self.record_own_vote(Step::Prepare, block_hash, actions);
    }

    fn build_block(&self) -> Block {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let txs: Vec<Transaction> = Vec::new();
        Block {
            header: BlockHeader {
                parent_hash: self.latest_block_hash,
                proposer: self.address,
                height: self.view.height,
                timestamp_ms,
                txs_root: Block::txs_root(&txs),
                state_root: self.next_state_root,
            },
            txs,
            qc_parent: self.high_qc.clone(),
        }
    }

    // ─── Message dispatch ───

    fn on_hotstuff(&mut self, message: HotstuffMessage) -> Vec<Action> {
        let mut actions = Vec::new();

        match self.pacemaker.validate(
            &message,
            self.view,
            self.high_qc.view,
            &self.validators,
        ) {
            Err(reason) => {
                // A replica that already knows the leader keeps receiving
                // NewRound chatter; discarding it is the normal case and
                // not worth a log line.
                let silent = message.step() == Step::NewRound
                    && self.leader.is_some()
                    && !self.is_leader();
                if !silent {
                    warn!(%reason, view = %message.view, sender = %message.sender, "message discarded");
                }
                return actions;
            }
            Ok(Gate::HarvestQc) => {
                if let Some(qc) = message.qc {
                    self.update_high_qc(qc);
                }
                return actions;
            }
            Ok(Gate::FastForward) => self.fast_forward(message.view, &mut actions),
            Ok(Gate::Current) => {}
        }

        if message.step() == Step::NewRound && self.leader.is_none() {
            self.leader =
                elect_leader(&self.validators, message.view.height, message.view.round);
        }

        if !self.is_leader() {
            self.replica_handle(&message, &mut actions);
        }
        self.leader_handle(&message, &mut actions);
        actions
    }

    fn fast_forward(&mut self, target: View, actions: &mut Vec<Action>) {
        if target.height != self.view.height || target.round != self.view.round {
            debug!(from = %self.view, to = %target, "fast-forwarding");
            self.begin_round(target.height, target.round, actions);
        }
        if target > self.view {
            self.view = target;
        }
    }

    // ─── Replica handlers ───

    fn replica_handle(&mut self, message: &HotstuffMessage, actions: &mut Vec<Action>) {
        match message.step() {
            Step::NewRound => {
                if let Some(qc) = &message.qc {
                    self.update_high_qc(qc.clone());
                }
            }
            Step::Prepare => self.replica_on_prepare(message, actions),
            Step::PreCommit => self.replica_on_prepare_qc(message, actions),
            Step::Commit => self.replica_on_precommit_qc(message, actions),
            Step::Decide => self.replica_on_decide(message, actions),
        }
    }

    /// Prepare: the leader's proposal. Check the safety rule, then hand the
    /// block to persistence for the preview; the vote is sent once
    /// `BlockValidated` comes back.
    fn replica_on_prepare(&mut self, message: &HotstuffMessage, actions: &mut Vec<Action>) {
        let Some(block) = &message.block else {
            return;
        };
        if Some(message.sender) != self.leader {
            warn!(sender = %message.sender, "proposal from non-leader discarded");
            return;
        }

        let encoded = borsh::to_vec(block).map(|b| b.len()).unwrap_or(usize::MAX);
        if encoded > self.config.max_block_bytes as usize {
            warn!(bytes = encoded, "oversized proposal discarded");
            return;
        }

        if !self.is_safe_proposal(block) {
            warn!(block = %block.hash(), "proposal fails the safety rule");
            return;
        }
        if !block.qc_parent.verify(&self.validators) {
            warn!(block = %block.hash(), "proposal carries an invalid parent QC");
            return;
        }

        self.update_high_qc(block.qc_parent.clone());
        self.proposal = Some(block.clone());
        self.pending_validation = Some(PendingValidation {
            view: self.view,
            block: block.clone(),
        });
        actions.push(Action::ValidateBlock {
            block: block.clone(),
        });
    }

    /// A replica votes on proposal P iff P extends what it is locked on, or
    /// P's parent QC is at least as recent as the lock.
    fn is_safe_proposal(&self, block: &Block) -> bool {
        match &self.locked_qc {
            None => true,
            Some(locked) => {
                block.qc_parent.view >= locked.view || block.hash() == locked.block_hash
            }
        }
    }

    /// PreCommit: the leader aggregated a prepare QC.
    fn replica_on_prepare_qc(&mut self, message: &HotstuffMessage, actions: &mut Vec<Action>) {
        let expected = View {
            height: self.view.height,
            round: self.view.round,
            step: Step::Prepare,
        };
        let Some(qc) = self.accept_step_qc(message, expected) else {
            return;
        };

        self.prepare_qc = Some(qc.clone());
        self.update_high_qc(qc.clone());
        if self.vote_for_step(Step::PreCommit, qc.block_hash, actions) {
            self.view.step = Step::Commit;
        }
    }

    /// Commit: the leader aggregated a preCommit QC. Lock on it.
    fn replica_on_precommit_qc(&mut self, message: &HotstuffMessage, actions: &mut Vec<Action>) {
        let expected = View {
            height: self.view.height,
            round: self.view.round,
            step: Step::PreCommit,
        };
        let Some(qc) = self.accept_step_qc(message, expected) else {
            return;
        };

        debug!(block = %qc.block_hash, view = %qc.view, "locking");
        self.locked_qc = Some(qc.clone());
        self.update_high_qc(qc.clone());
        if self.vote_for_step(Step::Commit, qc.block_hash, actions) {
            self.view.step = Step::Decide;
        }
    }

    /// Decide: the leader aggregated a commit QC. Execute and persist.
    fn replica_on_decide(&mut self, message: &HotstuffMessage, actions: &mut Vec<Action>) {
        let expected = View {
            height: self.view.height,
            round: self.view.round,
            step: Step::Commit,
        };
        let Some(qc) = self.accept_step_qc(message, expected) else {
            return;
        };
        self.update_high_qc(qc.clone());

        let Some(block) = self.proposal.clone() else {
            // Without the block we cannot execute; the node will recover at
            // the next height it participates in from the start.
            warn!(block = %qc.block_hash, "commit QC for an unknown block");
            return;
        };
        if block.hash() != qc.block_hash {
            warn!(block = %block.hash(), qc_block = %qc.block_hash, "commit QC does not match the held proposal");
            return;
        }

        actions.push(Action::CommitBlock {
            block,
            commit_qc: qc,
        });
    }

    /// Common checks for leader QC announcements: the certificate must be
    /// for this round's expected step, for the proposal we hold (when we
    /// hold one), and must verify against the validator set.
    fn accept_step_qc(
        &mut self,
        message: &HotstuffMessage,
        expected: View,
    ) -> Option<QuorumCertificate> {
        if Some(message.sender) != self.leader {
            return None;
        }
        let qc = message.qc.as_ref()?;
        if qc.view != expected {
            warn!(qc_view = %qc.view, %expected, "QC for an unexpected view discarded");
            return None;
        }
        if let Some(block) = &self.proposal {
            if block.hash() != qc.block_hash {
                warn!(qc_block = %qc.block_hash, "QC for a different block discarded");
                return None;
            }
        }
        if !qc.verify(&self.validators) {
            warn!(qc_view = %qc.view, "QC fails verification");
            return None;
        }
        Some(qc.clone())
    }

    /// Sign and send a vote to the leader, honoring the one-block-per-view
    /// rule. Returns `true` if the vote went out.
    fn vote_for_step(&mut self, step: Step, block_hash: Hash, actions: &mut Vec<Action>) -> bool {
        let key = (self.view.height, self.view.round);
        match self.voted.get(&key) {
            Some(prior) if *prior != block_hash => {
                warn!(height = key.0, round = key.1, "refusing to vote for a second block in one view");
                return false;
            }
            _ => {}
        }
        self.voted.insert(key, block_hash);

        let vote_view = View {
            height: self.view.height,
            round: self.view.round,
            step,
        };
        let signature = self.keypair.sign(&vote_message(&vote_view, &block_hash));
        let vote = HotstuffMessage::vote(
            vote_view,
            PartialSignature {
                signer: self.address,
                signature,
            },
            self.address,
        );
        let Some(leader) = self.leader else {
            return false;
        };
        actions.push(Action::SendTo {
            to: leader,
            message: OutboundMessage::Hotstuff(vote),
        });
        true
    }

    // ─── Leader handlers ───

    fn leader_handle(&mut self, message: &HotstuffMessage, actions: &mut Vec<Action>) {
        if !self.is_leader() {
            return;
        }
        match message.step() {
            Step::NewRound => {
                if let Some(qc) = &message.qc {
                    if qc.verify(&self.validators) {
                        self.update_high_qc(qc.clone());
                    }
                }
                self.note_new_round(message.sender, message.view.height, message.view.round);
                self.try_propose(actions);
            }
            Step::Prepare | Step::PreCommit | Step::Commit => {
                if message.is_vote() {
                    self.leader_on_vote(message, actions);
                }
            }
            // The leader commits when it forms the commit QC; Decide
            // messages are for replicas.
            Step::Decide => {}
        }
    }

    /// A replica vote arrived: hand the signature to the crypto pool. The
    /// signing message binds the vote to our own proposal, so a vote for any
    /// other block simply fails verification.
    fn leader_on_vote(&mut self, message: &HotstuffMessage, actions: &mut Vec<Action>) {
        let Some(partial) = &message.partial_sig else {
            return;
        };
        let Some(block_hash) = self.proposal.as_ref().map(|b| b.hash()) else {
            return;
        };
        let Some(public_key) = self.validators.public_key_of(&partial.signer) else {
            return;
        };
        actions.push(Action::VerifyVote {
            message: message.clone(),
            public_key: *public_key,
            signing_message: vote_message(&message.view, &block_hash),
        });
    }

    /// Crypto-pool callback: count the vote and advance on quorum.
    fn on_vote_verified(&mut self, message: HotstuffMessage, valid: bool) -> Vec<Action> {
        let mut actions = Vec::new();
        if !valid {
            warn!(sender = %message.sender, "vote signature invalid");
            return actions;
        }
        if !self.is_leader()
            || message.view.height != self.view.height
            || message.view.round != self.view.round
        {
            return actions;
        }
        let (Some(partial), Some(block_hash)) = (
            message.partial_sig.as_ref(),
            self.proposal.as_ref().map(|b| b.hash()),
        ) else {
            return actions;
        };
        let Some(index) = self.validators.index_of(&partial.signer) else {
            return actions;
        };

        let view = message.view;
        let set = self
            .vote_sets
            .entry(view)
            .or_insert_with(|| VoteSet::new(view));
        if !set.add(index, block_hash, partial.signature) {
            return actions;
        }
        debug!(view = %view, votes = set.count(), "vote counted");
        self.advance_on_quorum(view, &mut actions);
        actions
    }

    /// Leader's own vote goes straight into the set; its signature needs no
    /// pool round-trip.
    fn record_own_vote(&mut self, step: Step, block_hash: Hash, actions: &mut Vec<Action>) {
        let vote_view = View {
            height: self.view.height,
            round: self.view.round,
            step,
        };
        self.voted
            .insert((vote_view.height, vote_view.round), block_hash);
        let signature = self.keypair.sign(&vote_message(&vote_view, &block_hash));
        let Some(index) = self.validators.index_of(&self.address) else {
            return;
        };
        let set = self
            .vote_sets
            .entry(vote_view)
            .or_insert_with(|| VoteSet::new(vote_view));
        set.add(index, block_hash, signature);
        self.advance_on_quorum(vote_view, actions);
    }

    /// Form the QC for `view` if it just reached quorum, and broadcast the
    /// next step.
    fn advance_on_quorum(&mut self, view: View, actions: &mut Vec<Action>) {
        let quorum = self.validators.quorum_threshold();
        let Some(set) = self.vote_sets.get(&view) else {
            return;
        };
        if set.count() < quorum || view.step != self.view.step {
            return;
        }
        let Some(qc) = set.to_certificate() else {
            return;
        };
        let block_hash = qc.block_hash;
        info!(view = %view, votes = qc.signer_count(), "quorum reached");

        match view.step {
            Step::Prepare => {
                self.prepare_qc = Some(qc.clone());
                self.update_high_qc(qc.clone());
                self.view.step = Step::PreCommit;
                self.broadcast_step_qc(qc, actions);
                self.record_own_vote(Step::PreCommit, block_hash, actions);
            }
            Step::PreCommit => {
                self.locked_qc = Some(qc.clone());
                self.update_high_qc(qc.clone());
                self.view.step = Step::Commit;
                self.broadcast_step_qc(qc, actions);
                self.record_own_vote(Step::Commit, block_hash, actions);
            }
            Step::Commit => {
                self.update_high_qc(qc.clone());
                self.view.step = Step::Decide;
                self.broadcast_step_qc(qc.clone(), actions);
                if let Some(block) = self.proposal.clone() {
                    actions.push(Action::CommitBlock {
                        block,
                        commit_qc: qc,
                    });
                }
            }
            Step::NewRound | Step::Decide => {}
        }
    }

    /// Broadcast the message that carries a freshly formed QC; its view is
    /// the driver's (already advanced) step.
    fn broadcast_step_qc(&mut self, qc: QuorumCertificate, actions: &mut Vec<Action>) {
        let message = HotstuffMessage::proposal(self.view, None, qc, self.address);
        actions.push(Action::Broadcast {
            message: OutboundMessage::Hotstuff(message),
        });
    }

    // ─── Callbacks ───

    /// Persistence validated a proposal; vote if everything still lines up.
    fn on_block_validated(&mut self, block_hash: Hash, valid: bool) -> Vec<Action> {
        let mut actions = Vec::new();
        // A result for a superseded proposal must not consume the pending
        // slot of its successor.
        let matches = self
            .pending_validation
            .as_ref()
            .map(|p| p.block.hash() == block_hash)
            .unwrap_or(false);
        if !matches {
            return actions;
        }
        let Some(pending) = self.pending_validation.take() else {
            return actions;
        };
        // Cancellation: the pacemaker moved the view while persistence was
        // working; the vote is abandoned.
        if pending.view.height != self.view.height || pending.view.round != self.view.round {
            debug!(block = %block_hash, "validation result for an abandoned view");
            return actions;
        }
        if !valid {
            warn!(block = %block_hash, "proposal failed the persistence preview");
            return actions;
        }
        if self.view.step > Step::Prepare {
            // The round advanced past Prepare while persistence was
            // working; the prepare vote is moot.
            return actions;
        }

        if self.vote_for_step(Step::Prepare, block_hash, &mut actions) {
            self.view.step = Step::PreCommit;
        }
        actions
    }

    /// Persistence committed a block; enter the next height.
    fn on_block_committed(
        &mut self,
        height: u64,
        block_hash: Hash,
        state_root: Hash,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        if height <= self.committed_height {
            return actions;
        }
        self.latest_block_hash = block_hash;
        if let Some(block) = &self.proposal {
            if block.hash() == block_hash {
                actions.push(Action::EmitCommittedBlock {
                    block: block.clone(),
                });
            }
        }
        self.committed_height = height;
        self.next_state_root = state_root;
        self.locked_qc = None;
        self.voted.retain(|(h, _), _| *h > height);
        self.vote_sets.retain(|v, _| v.height > height);
        self.new_round_senders.retain(|(h, _), _| *h > height);
        info!(height, root = %state_root, "block committed");

        self.begin_round(height + 1, 0, &mut actions);
        actions
    }

    /// Pacemaker deadline fired: bump the round and re-announce with the
    /// highest QC seen.
    fn on_view_timeout(&mut self, view: View) -> Vec<Action> {
        let mut actions = Vec::new();
        if view.height != self.view.height || view.round != self.view.round {
            // A deadline for a view we already left.
            return actions;
        }
        warn!(view = %self.view, "view timed out");
        self.begin_round(self.view.height, self.view.round + 1, &mut actions);
        actions
    }

    fn update_high_qc(&mut self, qc: QuorumCertificate) {
        if qc.view > self.high_qc.view {
            self.high_qc = qc;
        }
    }
}

impl StateMachine for HotstuffDriver {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::HotstuffReceived { message } => self.on_hotstuff(message),
            Event::VoteVerified { message, valid } => self.on_vote_verified(message, valid),
            Event::BlockValidated { block_hash, valid } => {
                self.on_block_validated(block_hash, valid)
            }
            Event::BlockCommitted {
                height,
                block_hash,
                state_root,
            } => self.on_block_committed(height, block_hash, state_root),
            Event::ViewTimeout { view } => self.on_view_timeout(view),
            Event::ModuleFailure { module, error } => {
                warn!(module, %error, "module failure reported");
                Vec::new()
            }
        }
    }
}
