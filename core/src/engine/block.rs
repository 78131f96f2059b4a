//! Block: an ordered command list and its cursor

use std::collections::HashMap;

use super::command::{BlockId, Command, CommandKind, CommandMeta, Ticket, Wait};
use super::scope::indent_levels;
use crate::types::{BlockStatus, ExecutionState};

/// Who is suspended until a block ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// A block of the same flowchart
    Local(Ticket),
    /// A block of another flowchart, answered through [`Outgoing::Resume`]
    ///
    /// [`Outgoing::Resume`]: super::outbox::Outgoing::Resume
    Remote { flowchart: String, block: String },
}

/// A suspension the block is waiting on
#[derive(Debug, Clone)]
pub(crate) struct Pending {
    pub ticket: Ticket,
    pub wait: Wait,
}

#[derive(Debug)]
pub struct Block {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) commands: Vec<Box<dyn Command>>,
    pub(crate) layout: Vec<CommandMeta>,

    pub(crate) state: ExecutionState,
    pub(crate) cursor: usize,
    pub(crate) active: Option<usize>,
    pub(crate) previous_active: Option<usize>,
    pub(crate) jumped: bool,
    /// Bumped on every start and end; tickets from older epochs are stale
    pub(crate) epoch: u64,
    pub(crate) pending: Option<Pending>,
    /// Block suspended until this one ends
    pub(crate) caller: Option<Caller>,
    /// Commands entered since the last pump began
    pub(crate) steps: usize,
}

impl Block {
    /// Build a block, computing each command's indent from its kind.
    ///
    /// `enabled` pairs with `commands`; missing entries count as enabled.
    pub fn new(
        name: impl Into<String>,
        commands: Vec<Box<dyn Command>>,
        enabled: &[bool],
    ) -> Self {
        let kinds: Vec<CommandKind> = commands.iter().map(|c| c.kind()).collect();
        let layout = indent_levels(&kinds)
            .into_iter()
            .zip(&commands)
            .enumerate()
            .map(|(i, (indent, command))| CommandMeta {
                kind: command.kind(),
                indent,
                enabled: enabled.get(i).copied().unwrap_or(true),
                label: command.label().map(str::to_string),
            })
            .collect();

        Self {
            name: name.into(),
            description: String::new(),
            commands,
            layout,
            state: ExecutionState::Idle,
            cursor: 0,
            active: None,
            previous_active: None,
            jumped: false,
            epoch: 0,
            pending: None,
            caller: None,
            steps: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn commands(&self) -> &[Box<dyn Command>] {
        &self.commands
    }

    pub fn layout(&self) -> &[CommandMeta] {
        &self.layout
    }

    pub fn is_executing(&self) -> bool {
        self.state == ExecutionState::Executing
    }

    pub fn status(&self) -> BlockStatus {
        match (self.state, &self.pending) {
            (ExecutionState::Idle, _) => BlockStatus::Idle,
            (ExecutionState::Executing, None) => BlockStatus::Running,
            (ExecutionState::Executing, Some(_)) => BlockStatus::Suspended,
        }
    }

    /// Index of the command the cursor is on
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn active_command(&self) -> Option<usize> {
        self.active
    }

    /// Ticket of the suspension this block is waiting on
    pub fn pending_ticket(&self) -> Option<Ticket> {
        self.pending.as_ref().map(|p| p.ticket)
    }

    pub(crate) fn reset_commands(&mut self) {
        for command in &mut self.commands {
            command.on_reset();
        }
    }

    /// First runnable index at or after `from`
    pub(crate) fn next_runnable(&self, from: usize) -> Option<usize> {
        (from..self.layout.len()).find(|&i| self.layout[i].is_runnable())
    }
}

/// Name lookup and execution counts, readable while a block is borrowed
#[derive(Debug, Default)]
pub struct Directory {
    names: Vec<String>,
    index: HashMap<String, BlockId>,
    execution_counts: Vec<u32>,
}

impl Directory {
    pub(crate) fn insert(&mut self, name: &str) -> Option<BlockId> {
        if self.index.contains_key(name) {
            return None;
        }
        let id = BlockId(self.names.len());
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        self.execution_counts.push(0);
        Some(id)
    }

    pub fn find(&self, name: &str) -> Option<BlockId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: BlockId) -> &str {
        &self.names[id.0]
    }

    pub fn execution_count(&self, id: BlockId) -> u32 {
        self.execution_counts.get(id.0).copied().unwrap_or(0)
    }

    pub(crate) fn record_execution(&mut self, id: BlockId) {
        if let Some(count) = self.execution_counts.get_mut(id.0) {
            *count += 1;
        }
    }

    pub(crate) fn set_execution_count(&mut self, id: BlockId, count: u32) {
        if let Some(slot) = self.execution_counts.get_mut(id.0) {
            *slot = count;
        }
    }
}
