//! Core event and action types for the Monsoon node.
//!
//! This crate defines the contract between the module state machines and the
//! runner that owns all I/O:
//!
//! - [`Event`]: all possible inputs to a module
//! - [`Action`]: all possible outputs from a module
//! - [`StateMachine`]: the trait every module loop drives
//!
//! # Architecture
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! Module state machines are synchronous, deterministic, and perform no I/O.
//! The node runner delivers events to each module over its typed inbound
//! queue (FIFO per module), executes the returned actions (network sends,
//! timers, signature verification, persistence effects), and converts the
//! results back into events. There is no process-wide registry: startup
//! wires the queues together explicitly, and a module holds only a
//! send-handle to its collaborators.

mod action;
mod event;
mod message;
mod traits;

pub use action::Action;
pub use event::Event;
pub use message::{HotstuffMessage, OutboundMessage};
pub use traits::StateMachine;

/// Identifies a timer owned by a module.
///
/// Setting a timer with an id that is already armed replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Pacemaker view deadline.
    ViewChange,
}
