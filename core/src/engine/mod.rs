//! # Block/Command engine
//!
//! Cooperative, resumable interpreter for flowcharts of command blocks.
//!
//! ## Core Principles
//!
//! 1. **Explicit continuations**: commands return a [`Flow`] instead of
//!    calling back into their block
//! 2. **Queue-driven scheduling**: a FIFO of jobs drained after every public
//!    call, so blocks never recurse into each other
//! 3. **Ticketed suspension**: every wait is a [`Ticket`] guarded by the
//!    block epoch; stopping or restarting a block invalidates it
//! 4. **No globals**: signal bus, config and callbacks are injected

pub mod block;
pub mod command;
pub mod context;
pub mod exec_loop;
pub mod flowchart;
pub mod handlers;
pub mod outbox;
pub mod scope;

#[cfg(test)]
mod tests;

pub use block::{Block, Caller, Directory};
pub use command::{BlockId, Command, CommandKind, CommandMeta, Flow, Resume, Ticket, Wait};
pub use context::{Callback, Context};
pub use flowchart::Flowchart;
pub use handlers::{EventHandler, Trigger, TriggerCondition};
pub use outbox::{HostRequest, Outbox, Outgoing, RequestKind};
