//! HotStuff consensus driver and pacemaker.
//!
//! The driver is a leader-based, three-phase BFT state machine advancing
//! `(height, round, step)` per block:
//!
//! | Step | Leader | Replica |
//! |---|---|---|
//! | NewRound | gather NewRounds, propose | elect and record the leader |
//! | Prepare | broadcast proposal | safety-check, preview, vote |
//! | PreCommit | aggregate prepare QC | vote on the prepare QC |
//! | Commit | aggregate preCommit QC | lock, vote |
//! | Decide | aggregate commit QC | execute and commit |
//!
//! The pacemaker owns view deadlines (`base * 2^round`, capped) and gates
//! every incoming message before the step handlers see it. Both components
//! are synchronous state machines in the [`monsoon_core`] model; the runner
//! owns timers, transport, and the crypto pool.

mod config;
mod driver;
mod leader;
mod pacemaker;
mod vote_set;

pub use config::{ConsensusConfig, PacemakerConfig};
pub use driver::HotstuffDriver;
pub use leader::elect_leader;
pub use pacemaker::{Gate, Pacemaker, PacemakerError};
pub use vote_set::VoteSet;
