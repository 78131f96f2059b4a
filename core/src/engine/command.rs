//! Command contract and continuation types
//!
//! A command is entered once when the block cursor reaches it and answers
//! with a [`Flow`]. Suspending commands are resumed through
//! [`Command::on_resume`] with the [`Resume`] value their wait produced.

use std::fmt;

use serde::Serialize;

use super::context::Context;
use super::outbox::RequestKind;
use crate::signals::SignalBus;
use crate::variables::Value;

/* ===================== Continuations ===================== */

/// What the block does after a command returns
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Advance to the next command
    Continue,
    /// Continue at an index of the same block
    Jump(usize),
    /// End the owning block (`was_stopped = true`)
    Stop,
    /// Hold the cursor on this command until the wait completes
    Suspend(Wait),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Wait {
    /// Resume with [`Resume::Timer`] once `seconds` of flowchart time pass
    Timer { seconds: f64 },
    /// Start `target` and resume with [`Resume::BlockEnded`] when it ends
    Block { target: BlockId, start_index: usize },
    /// Start `block` in another flowchart and resume with
    /// [`Resume::BlockEnded`] when it ends
    Flowchart {
        flowchart: String,
        block: String,
        start_index: usize,
    },
    /// Publish a ticketed host request; the host answers via `resume`
    Host(RequestKind),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    Done,
    Timer,
    BlockEnded { was_stopped: bool },
    CallRejected,
    Value(Value),
}

/* ===================== Handles ===================== */

/// Index of a block inside its flowchart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Suspension token; stale once the block stops, restarts or resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Ticket {
    pub block: BlockId,
    pub epoch: u64,
    pub serial: u64,
}

/* ===================== Layout ===================== */

/// Structural role of a command, used for indent levels and scope scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Action,
    If,
    ElseIf,
    Else,
    End,
    While,
    Break,
    Label,
    Comment,
}

impl CommandKind {
    pub fn opens_scope(&self) -> bool {
        matches!(
            self,
            CommandKind::If | CommandKind::ElseIf | CommandKind::Else | CommandKind::While
        )
    }

    pub fn closes_scope(&self) -> bool {
        matches!(
            self,
            CommandKind::ElseIf | CommandKind::Else | CommandKind::End
        )
    }

    /// Never entered by the block loop
    pub fn is_passive(&self) -> bool {
        matches!(self, CommandKind::Label | CommandKind::Comment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMeta {
    pub kind: CommandKind,
    pub indent: usize,
    pub enabled: bool,
    pub label: Option<String>,
}

impl CommandMeta {
    /// Whether the block loop enters this command at all
    pub fn is_runnable(&self) -> bool {
        self.enabled && !self.kind.is_passive()
    }
}

/* ===================== Contract ===================== */

pub trait Command: fmt::Debug {
    /// Display name used in signals and logs
    fn name(&self) -> &str;

    fn kind(&self) -> CommandKind {
        CommandKind::Action
    }

    /// Name of the label this command marks, if it is one
    fn label(&self) -> Option<&str> {
        None
    }

    fn on_enter(&mut self, ctx: &mut Context<'_>) -> Flow;

    fn on_resume(&mut self, _ctx: &mut Context<'_>, _resume: Resume) -> Flow {
        Flow::Continue
    }

    /// Clear per-run transient state
    fn on_reset(&mut self) {}

    /// The owning block was stopped while this command was active
    fn on_stop(&mut self, _signals: &SignalBus) {}

    /// Short description; starts with `Error:` when misconfigured
    fn summary(&self) -> String {
        String::new()
    }

    /// Names of blocks this command can start
    fn connected_blocks(&self) -> Vec<&str> {
        Vec::new()
    }
}
