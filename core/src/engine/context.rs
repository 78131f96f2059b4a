//! Per-step view handed to commands

use std::collections::HashMap;

use super::block::Directory;
use super::command::{BlockId, CommandMeta, Flow, Wait};
use super::outbox::{Effect, HostRequest, Outbox, Outgoing, RequestKind};
use crate::signals::{Signal, SignalBus};
use crate::variables::{PublicVariables, VariableStore};

/// Native function a flowchart can run from an `Invoke` command
pub type Callback = Box<dyn FnMut(&mut VariableStore)>;

pub struct Context<'a> {
    pub(crate) flowchart: &'a str,
    pub(crate) block: BlockId,
    pub(crate) index: usize,
    pub(crate) previous_active: Option<usize>,
    pub(crate) jumped: bool,
    pub(crate) layout: &'a [CommandMeta],
    pub(crate) directory: &'a Directory,
    pub(crate) variables: &'a mut VariableStore,
    pub(crate) callbacks: &'a mut HashMap<String, Callback>,
    pub(crate) outbox: &'a mut Outbox,
    pub(crate) signals: &'a SignalBus,
    pub(crate) public: &'a PublicVariables,
    pub(crate) now: f64,
}

impl<'a> Context<'a> {
    /* ===================== Position ===================== */

    pub fn flowchart_name(&self) -> &str {
        self.flowchart
    }

    pub fn block_id(&self) -> BlockId {
        self.block
    }

    pub fn block_name(&self) -> &str {
        self.directory.name(self.block)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Layout of the command currently running
    pub fn meta(&self) -> &CommandMeta {
        &self.layout[self.index]
    }

    pub fn layout(&self) -> &[CommandMeta] {
        self.layout
    }

    /// Last command that returned a continuation in this run
    pub fn previous_active(&self) -> Option<&CommandMeta> {
        self.previous_active.map(|i| &self.layout[i])
    }

    /// Whether the cursor got here through a `Jump` from `previous_active`
    pub fn arrived_by_jump(&self) -> bool {
        self.jumped
    }

    /// Flowchart clock in seconds
    pub fn now(&self) -> f64 {
        self.now
    }

    /* ===================== Variables ===================== */

    pub fn variables(&self) -> &VariableStore {
        &*self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut *self.variables
    }

    /// Substitute own variables, then public variables of other flowcharts
    pub fn substitute(&self, template: &str) -> String {
        let local = self.variables.substitute(template);
        self.public.substitute(&local, self.flowchart)
    }

    /* ===================== Blocks ===================== */

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.directory.find(name)
    }

    pub fn execution_count(&self, block: BlockId) -> u32 {
        self.directory.execution_count(block)
    }

    /// Start `target` and end this block
    pub fn handoff(&mut self, target: BlockId, index: usize) -> Flow {
        self.spawn(target, index);
        Flow::Stop
    }

    /// Start `target` after this step; the caller keeps going
    pub fn spawn(&mut self, target: BlockId, index: usize) {
        self.outbox.effects.push(Effect::Start {
            block: target,
            index,
        });
    }

    /// Start `target` and suspend until it ends
    pub fn call_and_wait(&mut self, target: BlockId, index: usize) -> Flow {
        Flow::Suspend(Wait::Block {
            target,
            start_index: index,
        })
    }

    /// Start `block` of another flowchart; the caller keeps going
    pub fn spawn_in(&mut self, flowchart: &str, block: &str, index: usize) {
        self.outbox.outgoing.push(Outgoing::Call {
            flowchart: flowchart.to_string(),
            block: block.to_string(),
            index,
            caller: None,
        });
    }

    /// Start `block` of another flowchart and suspend until it ends
    pub fn call_in_and_wait(&mut self, flowchart: &str, block: &str, index: usize) -> Flow {
        Flow::Suspend(Wait::Flowchart {
            flowchart: flowchart.to_string(),
            block: block.to_string(),
            start_index: index,
        })
    }

    pub fn stop_block(&mut self, target: BlockId) {
        self.outbox.effects.push(Effect::Stop(target));
    }

    /// Run a registered callback now; `false` when none is registered
    pub fn invoke(&mut self, name: &str) -> bool {
        match self.callbacks.get_mut(name) {
            Some(callback) => {
                callback(&mut *self.variables);
                true
            }
            None => false,
        }
    }

    /* ===================== Host & signals ===================== */

    /// Publish a request that nobody waits on
    pub fn post(&mut self, kind: RequestKind) {
        self.outbox.requests.push(HostRequest { ticket: None, kind });
    }

    pub fn emit(&self, signal: Signal) {
        self.signals.emit(&signal);
    }

    /// Broadcast `message` to this flowchart's message handlers
    pub fn send_message(&mut self, message: &str) {
        self.signals.emit(&Signal::MessageSent {
            flowchart: self.flowchart.to_string(),
            message: message.to_string(),
        });
        self.outbox.effects.push(Effect::Message(message.to_string()));
    }

    /// Broadcast `message` to the message handlers of every flowchart
    pub fn broadcast(&mut self, message: &str) {
        self.signals.emit(&Signal::MessageSent {
            flowchart: self.flowchart.to_string(),
            message: message.to_string(),
        });
        self.outbox
            .outgoing
            .push(Outgoing::Broadcast(message.to_string()));
    }
}
