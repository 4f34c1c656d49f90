//! Module event loops and wiring.
//!
//! Startup builds each module's typed inbound queue and hands every module
//! send-handles to its collaborators; there is no global registry. Three
//! long-lived loops run per node:
//!
//! - **p2p**: owns the address book and the RainTree router; turns inbound
//!   frames into consensus events and outbound commands into transport
//!   sends,
//! - **consensus**: owns the HotStuff driver, its timers, and the crypto
//!   pool handle; executes the driver's actions,
//! - **persistence**: owns the persistence manager; answers validate and
//!   commit commands with callback events.
//!
//! Within a loop, messages are processed in FIFO order; all channels are
//! bounded, so a slow consumer applies backpressure to its producers.

use crate::codec::{self, Inbound};
use crate::config::NodeConfig;
use crate::crypto_pool::CryptoPool;
use crate::timers::TimerManager;
use crate::transport::Transport;
use monsoon_consensus::HotstuffDriver;
use monsoon_core::{Action, Event, OutboundMessage, StateMachine};
use monsoon_p2p::{AddressBook, Peer, RainTreeRouter};
use monsoon_persistence::{MemKvStore, PersistenceContext, PersistenceError, PersistenceManager};
use monsoon_types::{Address, Block, GenesisState, Hash, QuorumCertificate};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Errors that prevent a node from starting.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("genesis has no validators")]
    EmptyValidatorSet,
}

/// What the node has committed, published after every height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedInfo {
    pub height: u64,
    pub state_root: Hash,
}

/// Commands into the p2p loop.
enum P2pCommand {
    Broadcast(OutboundMessage),
    Direct(Address, OutboundMessage),
}

/// Commands into the persistence loop.
enum PersistCommand {
    Validate(Block),
    Commit(Block, QuorumCertificate),
}

/// A running node's handles.
pub struct NodeHandle {
    pub address: Address,
    /// Latest committed height and state root.
    pub committed: watch::Receiver<CommittedInfo>,
    /// Committed blocks, for external observers.
    pub blocks: broadcast::Receiver<Block>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Stop every module loop.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build and start a node's module loops.
///
/// `inbound` carries frame contents from the transport's receive side; the
/// caller owns how those bytes arrive (TCP listener, in-process channels).
pub fn spawn_node(
    config: &NodeConfig,
    genesis: &GenesisState,
    transport: Arc<dyn Transport>,
    mut inbound: mpsc::Receiver<Vec<u8>>,
) -> Result<NodeHandle, NodeError> {
    let keypair = config.keypair()?;
    let address = keypair.address();

    let validators = genesis.consensus_genesis_state.validator_set();
    if validators.is_empty() {
        return Err(NodeError::EmptyValidatorSet);
    }

    // ─── Persistence state from genesis ───
    let mut manager = PersistenceManager::from_genesis(
        &genesis.persistence_genesis_state,
        &genesis.consensus_genesis_state.params,
        Box::new(MemKvStore::new()),
    )?;
    let genesis_root = preview_root(&mut manager)?;

    // ─── Address book from genesis peers ───
    let self_url = genesis
        .p2p_genesis_state
        .peers
        .iter()
        .find(|p| p.address == address)
        .map(|p| p.service_url.clone())
        .unwrap_or_default();
    let mut book = AddressBook::new(address, self_url);
    for peer in &genesis.p2p_genesis_state.peers {
        book.add(Peer::new(peer.address, peer.service_url.clone()));
    }
    book.rebuild();
    let router = RainTreeRouter::new(book.snapshot());

    // ─── Queues ───
    let (events_tx, events_rx) = mpsc::channel::<Event>(1024);
    let (p2p_tx, p2p_rx) = mpsc::channel::<P2pCommand>(256);
    let (persist_tx, persist_rx) = mpsc::channel::<PersistCommand>(64);
    let (committed_tx, committed_rx) = watch::channel(CommittedInfo {
        height: 0,
        state_root: manager.state_root(),
    });
    let (blocks_tx, blocks_rx) = broadcast::channel(1024);

    let driver = HotstuffDriver::new(
        keypair,
        validators,
        config.consensus_config(),
        genesis_root,
    );

    info!(%address, root = %genesis_root, "node starting");

    // ─── p2p loop ───
    let use_raintree = config.p2p.use_raintree;
    let p2p_events = events_tx.clone();
    let p2p_task = tokio::spawn(async move {
        let mut p2p = P2pLoop {
            address,
            book,
            router,
            transport,
            events: p2p_events,
            nonce: 0,
            use_raintree,
        };
        let mut commands = p2p_rx;
        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(frame) => p2p.on_frame(&frame).await,
                    None => break,
                },
                command = commands.recv() => match command {
                    Some(command) => p2p.on_command(command).await,
                    None => break,
                },
            }
        }
        debug!(%address, "p2p loop stopped");
    });

    // ─── persistence loop ───
    let persist_events = events_tx.clone();
    let persist_task = tokio::spawn(async move {
        let mut commands = persist_rx;
        while let Some(command) = commands.recv().await {
            match command {
                PersistCommand::Validate(block) => {
                    let block_hash = block.hash();
                    let valid = validate_block(&mut manager, &block);
                    if persist_events
                        .send(Event::BlockValidated { block_hash, valid })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                PersistCommand::Commit(block, commit_qc) => {
                    match commit_block(&mut manager, block, commit_qc) {
                        Ok((height, block_hash, state_root)) => {
                            let _ = committed_tx.send(CommittedInfo {
                                height,
                                state_root: manager.state_root(),
                            });
                            if persist_events
                                .send(Event::BlockCommitted {
                                    height,
                                    block_hash,
                                    state_root,
                                })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(failure) => {
                            // Invariant breach: halt rather than diverge.
                            error!(%failure, "persistence halting");
                            let _ = persist_events
                                .send(Event::ModuleFailure {
                                    module: "persistence",
                                    error: failure.to_string(),
                                })
                                .await;
                            break;
                        }
                    }
                }
            }
        }
        debug!("persistence loop stopped");
    });

    // ─── consensus loop ───
    let consensus_task = tokio::spawn(consensus_loop(
        driver,
        events_rx,
        events_tx,
        p2p_tx,
        persist_tx,
        blocks_tx,
    ));

    Ok(NodeHandle {
        address,
        committed: committed_rx,
        blocks: blocks_rx,
        tasks: vec![p2p_task, persist_task, consensus_task],
    })
}

// ─── p2p ───

struct P2pLoop {
    address: Address,
    book: AddressBook,
    router: RainTreeRouter,
    transport: Arc<dyn Transport>,
    events: mpsc::Sender<Event>,
    nonce: u64,
    use_raintree: bool,
}

impl P2pLoop {
    async fn on_frame(&mut self, frame: &[u8]) {
        match codec::decode_frame(frame) {
            Ok(Inbound::Envelope(envelope)) => {
                let origin = envelope.origin;
                let outcome = self.router.handle(&envelope);
                for forward in outcome.forwards {
                    self.send_envelope(forward.to, &forward.envelope);
                }
                if outcome.deliver {
                    match codec::decode_payload(&envelope.payload) {
                        Ok(OutboundMessage::Hotstuff(message)) => {
                            let _ = self
                                .events
                                .send(Event::HotstuffReceived { message })
                                .await;
                        }
                        Err(error) => {
                            // Malformed payload from a known origin costs
                            // reputation.
                            warn!(%origin, %error, "undecodable payload");
                            self.book.decrement_score(&origin);
                        }
                    }
                }
            }
            Ok(Inbound::Direct(message)) => {
                let _ = self.events.send(Event::HotstuffReceived { message }).await;
            }
            Err(error) => {
                warn!(%error, "undecodable frame dropped");
            }
        }
    }

    async fn on_command(&mut self, command: P2pCommand) {
        match command {
            P2pCommand::Broadcast(message) => {
                debug!(message = message.type_name(), "broadcasting");
                let Ok(payload) = codec::encode_payload(&message) else {
                    return;
                };
                self.nonce += 1;
                if self.use_raintree {
                    let sends = self.router.originate(self.address, self.nonce, payload);
                    for send in sends {
                        self.send_envelope(send.to, &send.envelope);
                    }
                } else {
                    // Flat fallback: a direct frame to every peer.
                    let OutboundMessage::Hotstuff(message) = &message;
                    let peers: Vec<Address> = self.router.peer_list().iter().skip(1).collect();
                    for peer_addr in peers {
                        self.send_direct(&peer_addr, message);
                    }
                }
            }
            P2pCommand::Direct(to, message) => {
                debug!(to = %to, message = message.type_name(), "direct send");
                let OutboundMessage::Hotstuff(message) = message;
                self.send_direct(&to, &message);
            }
        }
    }

    fn send_envelope(&self, to: Address, envelope: &monsoon_p2p::RainTreeEnvelope) {
        let Some(peer) = self.book.get(&to) else {
            warn!(%to, "no peer entry for RainTree target");
            return;
        };
        match codec::encode_envelope(envelope) {
            Ok(frame) => self.transport.send(&peer.service_url, frame),
            Err(error) => warn!(%error, "envelope encode failed"),
        }
    }

    fn send_direct(&self, to: &Address, message: &monsoon_core::HotstuffMessage) {
        let Some(peer) = self.book.get(to) else {
            warn!(%to, "no peer entry for direct send");
            return;
        };
        match codec::encode_direct(message) {
            Ok(frame) => self.transport.send(&peer.service_url, frame),
            Err(error) => warn!(%error, "message encode failed"),
        }
    }
}

// ─── consensus ───

async fn consensus_loop(
    mut driver: HotstuffDriver,
    mut events: mpsc::Receiver<Event>,
    events_tx: mpsc::Sender<Event>,
    p2p: mpsc::Sender<P2pCommand>,
    persist: mpsc::Sender<PersistCommand>,
    blocks: broadcast::Sender<Block>,
) {
    let pool = CryptoPool::new(2);
    let mut timers = TimerManager::new(events_tx.clone());

    let startup = driver.start();
    execute_actions(
        &mut driver,
        startup,
        &pool,
        &mut timers,
        &events_tx,
        &p2p,
        &persist,
        &blocks,
    )
    .await;

    while let Some(event) = events.recv().await {
        trace!(event = event.type_name(), "consensus event");
        let actions = driver.handle(event);
        execute_actions(
            &mut driver,
            actions,
            &pool,
            &mut timers,
            &events_tx,
            &p2p,
            &persist,
            &blocks,
        )
        .await;
    }
    debug!("consensus loop stopped");
}

#[allow(clippy::too_many_arguments)]
async fn execute_actions(
    driver: &mut HotstuffDriver,
    actions: Vec<Action>,
    pool: &CryptoPool,
    timers: &mut TimerManager,
    events_tx: &mpsc::Sender<Event>,
    p2p: &mpsc::Sender<P2pCommand>,
    persist: &mpsc::Sender<PersistCommand>,
    blocks: &broadcast::Sender<Block>,
) {
    for action in actions {
        trace!(action = action.type_name(), "executing action");
        match action {
            Action::Broadcast { message } => {
                let _ = p2p.send(P2pCommand::Broadcast(message)).await;
            }
            Action::SendTo { to, message } => {
                let _ = p2p.send(P2pCommand::Direct(to, message)).await;
            }
            Action::SetTimer { id, duration } => {
                timers.set(id, duration, driver.view());
            }
            Action::CancelTimer { id } => timers.cancel(id),
            Action::VerifyVote {
                message,
                public_key,
                signing_message,
            } => {
                pool.verify_vote(message, public_key, signing_message, events_tx.clone());
            }
            Action::ValidateBlock { block } => {
                let _ = persist.send(PersistCommand::Validate(block)).await;
            }
            Action::CommitBlock { block, commit_qc } => {
                let _ = persist.send(PersistCommand::Commit(block, commit_qc)).await;
            }
            Action::EmitCommittedBlock { block } => {
                let _ = blocks.send(block);
            }
        }
    }
}

// ─── persistence helpers ───

/// The lifecycle sweep persistence applies for every block.
fn apply_block_lifecycle(ctx: &mut PersistenceContext<'_>) -> Result<(), PersistenceError> {
    ctx.unstake_actors_that_are_ready()
}

/// Preview the state root the next height's proposal must carry.
fn preview_root(manager: &mut PersistenceManager) -> Result<Hash, PersistenceError> {
    let next = manager.latest_height().map_or(1, |h| h + 1);
    let mut ctx = manager.context(next)?;
    apply_block_lifecycle(&mut ctx)?;
    let root = ctx.update_state_hash();
    ctx.release();
    Ok(root)
}

/// Check a proposal against the committed chain and the state preview.
fn validate_block(manager: &mut PersistenceManager, block: &Block) -> bool {
    let expected_height = manager.latest_height().map_or(1, |h| h + 1);
    if block.header.height != expected_height {
        warn!(
            height = block.header.height,
            expected_height, "proposal height mismatch"
        );
        return false;
    }
    if block.header.parent_hash != manager.latest_block_hash() {
        warn!("proposal parent hash mismatch");
        return false;
    }
    if Block::txs_root(&block.txs) != block.header.txs_root {
        warn!("proposal transaction root mismatch");
        return false;
    }

    let Ok(mut ctx) = manager.context(block.header.height) else {
        return false;
    };
    if apply_block_lifecycle(&mut ctx).is_err() {
        ctx.release();
        return false;
    }
    let root = ctx.update_state_hash();
    ctx.release();
    if root != block.header.state_root {
        warn!(proposed = %block.header.state_root, computed = %root, "proposal state root mismatch");
        return false;
    }
    true
}

/// Execute and commit a decided block; returns the committed height, the
/// block hash, and the state root for the next proposal.
fn commit_block(
    manager: &mut PersistenceManager,
    block: Block,
    _commit_qc: QuorumCertificate,
) -> Result<(u64, Hash, Hash), PersistenceError> {
    let height = block.header.height;
    let block_hash = block.hash();

    let mut ctx = manager.context(height)?;
    apply_block_lifecycle(&mut ctx)?;
    let root = ctx.update_state_hash();
    if root != block.header.state_root {
        ctx.release();
        return Err(PersistenceError::RootMismatch {
            cached: block.header.state_root,
            recomputed: root,
        });
    }
    ctx.store_block(block);
    ctx.commit()?;

    let next_root = preview_root(manager)?;
    Ok((height, block_hash, next_root))
}
