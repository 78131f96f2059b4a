//! Side effects queued by commands during a step
//!
//! Commands never touch other blocks directly. They queue effects here and
//! the scheduler turns them into jobs once the step returns.

use serde::Serialize;

use super::command::{BlockId, Resume, Ticket};

/// Work a host is asked to perform
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    /// Show a line of narration; answer with `Resume::Done`
    Say {
        character: Option<String>,
        text: String,
    },
    /// Offer a choice; the host calls `choose_option(target)` when picked
    MenuOption {
        text: String,
        target: String,
        interactable: bool,
    },
    /// Plug-in defined request
    Custom {
        name: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRequest {
    /// Present when a block is suspended waiting for the answer
    pub ticket: Option<Ticket>,
    #[serde(flatten)]
    pub kind: RequestKind,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    Start { block: BlockId, index: usize },
    Stop(BlockId),
    Message(String),
}

/// Work addressed to another flowchart, forwarded by whoever owns both
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Start `block` of `flowchart`; `caller` (a block here) waits for it
    Call {
        flowchart: String,
        block: String,
        index: usize,
        caller: Option<String>,
    },
    /// Deliver `message` to every flowchart
    Broadcast(String),
    /// Resume `block` of `flowchart`, which is waiting on `callee` here
    Resume {
        flowchart: String,
        block: String,
        callee: String,
        resume: Resume,
    },
}

#[derive(Debug, Default)]
pub struct Outbox {
    pub(crate) effects: Vec<Effect>,
    pub(crate) requests: Vec<HostRequest>,
    pub(crate) outgoing: Vec<Outgoing>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.requests.is_empty() && self.outgoing.is_empty()
    }

    pub(crate) fn has_effects(&self) -> bool {
        !self.effects.is_empty()
    }
}
