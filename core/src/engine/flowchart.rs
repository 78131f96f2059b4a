//! Flowchart: blocks, variables and the cooperative scheduler
//!
//! Every public entry point queues work and then drains the job queue to
//! quiescence before returning. Blocks never call into each other directly,
//! so there is no recursion between blocks.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info, warn};

use super::block::{Block, Caller, Directory};
use super::command::{BlockId, Resume, Ticket, Wait};
use super::context::Callback;
use super::exec_loop::{EndReason, Job, Timer};
use super::handlers::{EventHandler, Trigger};
use super::outbox::{HostRequest, Outgoing, RequestKind};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::signals::SignalBus;
use crate::types::{BlockStatus, ExecuteOutcome, VariableScope};
use crate::variables::{PublicVariables, Value, Variable, VariableStore};

pub struct Flowchart {
    pub(crate) name: String,
    pub(crate) blocks: Vec<Block>,
    pub(crate) directory: Directory,
    pub(crate) variables: VariableStore,
    pub(crate) handlers: Vec<EventHandler>,
    pub(crate) callbacks: HashMap<String, Callback>,
    pub(crate) signals: SignalBus,
    pub(crate) config: EngineConfig,

    pub(crate) jobs: VecDeque<Job>,
    pub(crate) timers: Vec<Timer>,
    /// Blocks that hit the step budget, continued on the next tick
    pub(crate) yielded: Vec<(BlockId, u64)>,
    pub(crate) requests: Vec<HostRequest>,
    /// Work for other flowcharts, taken by the application
    pub(crate) outgoing: Vec<Outgoing>,
    pub(crate) public: PublicVariables,
    pub(crate) clock: f64,
    pub(crate) serial: u64,
    /// Hash of the definition this flowchart was built from, if any
    pub(crate) definition_hash: Option<String>,
}

impl std::fmt::Debug for Flowchart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flowchart")
            .field("name", &self.name)
            .field("blocks", &self.blocks.len())
            .field("variables", &self.variables.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl Flowchart {
    pub fn new(name: impl Into<String>, signals: SignalBus, config: EngineConfig) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            directory: Directory::default(),
            variables: VariableStore::new(),
            handlers: Vec::new(),
            callbacks: HashMap::new(),
            signals,
            config,
            jobs: VecDeque::new(),
            timers: Vec::new(),
            yielded: Vec::new(),
            requests: Vec::new(),
            outgoing: Vec::new(),
            public: PublicVariables::new(),
            clock: 0.0,
            serial: 0,
            definition_hash: None,
        }
    }

    /* ===================== Building ===================== */

    pub fn add_block(&mut self, block: Block) -> Result<BlockId> {
        let id = self
            .directory
            .insert(&block.name)
            .ok_or_else(|| EngineError::DuplicateBlock(block.name.clone()))?;
        self.blocks.push(block);
        Ok(id)
    }

    pub fn declare_variable(
        &mut self,
        key: impl Into<String>,
        scope: VariableScope,
        value: Value,
    ) -> Result<()> {
        self.variables.declare(key, scope, value)
    }

    /// Publish public variables into `public`, shared with other flowcharts
    pub fn share_public(&mut self, public: PublicVariables) {
        self.public.withdraw(&self.name);
        self.public = public;
        self.public.publish(&self.name, &self.variables);
    }

    pub fn add_handler(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    /// Make `callback` available to `Invoke` commands under `name`
    pub fn register_callback<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: FnMut(&mut VariableStore) + 'static,
    {
        self.callbacks.insert(name.into(), Box::new(callback));
    }

    /* ===================== Queries ===================== */

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.directory.find(name)
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.find_block(name).map(|id| &self.blocks[id.0])
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn handlers(&self) -> &[EventHandler] {
        &self.handlers
    }

    pub fn status(&self, name: &str) -> Option<BlockStatus> {
        self.block(name).map(Block::status)
    }

    pub fn is_executing(&self, name: &str) -> bool {
        self.block(name).is_some_and(Block::is_executing)
    }

    /// Whether any block is executing
    pub fn has_executing_blocks(&self) -> bool {
        self.blocks.iter().any(Block::is_executing)
    }

    /// No block is executing and no timer handler is still armed
    pub fn is_idle(&self) -> bool {
        !self.has_executing_blocks() && self.handlers.iter().all(|h| h.next_fire.is_none())
    }

    pub fn execution_count(&self, name: &str) -> Option<u32> {
        self.find_block(name)
            .map(|id| self.directory.execution_count(id))
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub fn public_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables
            .iter()
            .filter(|v| v.scope == VariableScope::Public)
    }

    /// Value of `key` if it is declared `public`
    pub fn public_value(&self, key: &str) -> Option<&Value> {
        self.variables
            .variable(key)
            .filter(|v| v.scope == VariableScope::Public)
            .map(Variable::value)
    }

    /// Set a `public` variable from outside the flowchart
    pub fn set_public_value(&mut self, key: &str, value: Value) -> Result<()> {
        if self.public_value(key).is_none() {
            return Err(EngineError::VariableNotPublic(key.to_string()));
        }
        self.variables.set(key, value)?;
        self.public.publish(&self.name, &self.variables);
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Flowchart clock in seconds, advanced by `tick`
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Substitute own variables, then public variables of other flowcharts
    pub fn substitute(&self, template: &str) -> String {
        let local = self.variables.substitute(template);
        self.public.substitute(&local, &self.name)
    }

    /* ===================== Control ===================== */

    /// Start `name` at `start_index`.
    ///
    /// Fails only when no block has that name. A block that is already
    /// executing is handled by the configured restart policy.
    pub fn execute_block(&mut self, name: &str, start_index: usize) -> Result<ExecuteOutcome> {
        let id = self
            .find_block(name)
            .ok_or_else(|| EngineError::BlockNotFound(name.to_string()))?;
        self.begin_pump();
        let outcome = self.start_block(id, start_index, None);
        self.drain();
        Ok(outcome)
    }

    /// Start `name` for a block of another flowchart waiting on it.
    ///
    /// The caller is answered through [`Outgoing::Resume`] when the block
    /// ends, or straight away with `CallRejected` if the start is ignored.
    pub fn execute_block_for(
        &mut self,
        name: &str,
        start_index: usize,
        caller_flowchart: &str,
        caller_block: &str,
    ) -> Result<ExecuteOutcome> {
        let id = self
            .find_block(name)
            .ok_or_else(|| EngineError::BlockNotFound(name.to_string()))?;
        self.begin_pump();
        let caller = Caller::Remote {
            flowchart: caller_flowchart.to_string(),
            block: caller_block.to_string(),
        };
        let outcome = self.start_block(id, start_index, Some(caller));
        self.drain();
        Ok(outcome)
    }

    /// Resume `name` if it is waiting on `callee` of flowchart `from`
    pub fn resume_remote_wait(&mut self, name: &str, from: &str, callee: &str, resume: Resume) -> bool {
        let Some(ticket) = self.block(name).and_then(|block| {
            let pending = block.pending.as_ref()?;
            match &pending.wait {
                Wait::Flowchart {
                    flowchart,
                    block: target,
                    ..
                } if flowchart == from && target == callee => Some(pending.ticket),
                _ => None,
            }
        }) else {
            debug!(flowchart = %self.name, block = name, from, callee, "no matching cross-flowchart wait");
            return false;
        };
        self.resume(ticket, resume)
    }

    /// Stop `name`; returns false if it was not executing
    pub fn stop_block(&mut self, name: &str) -> bool {
        let Some(id) = self.find_block(name) else {
            warn!(flowchart = %self.name, block = name, "stop_block: no such block");
            return false;
        };
        if !self.blocks[id.0].is_executing() {
            return false;
        }
        self.begin_pump();
        self.end_block(id, EndReason::Stopped);
        self.drain();
        true
    }

    pub fn stop_all(&mut self) {
        self.begin_pump();
        for i in 0..self.blocks.len() {
            if self.blocks[i].is_executing() {
                self.end_block(BlockId(i), EndReason::Stopped);
            }
        }
        self.drain();
    }

    /// Answer a suspension; false when the ticket is stale
    pub fn resume(&mut self, ticket: Ticket, resume: Resume) -> bool {
        if !self.is_current(ticket) {
            debug!(flowchart = %self.name, ?ticket, "ignoring stale ticket");
            return false;
        }
        self.begin_pump();
        self.resume_block(ticket, resume);
        self.drain();
        true
    }

    /// Advance the clock by `dt` seconds, firing due timers in order
    pub fn tick(&mut self, dt: f64) {
        self.begin_pump();
        self.clock += dt.max(0.0);

        let due = self.timers.partition_point(|t| t.fire_at <= self.clock);
        let fired_timers: Vec<Timer> = self.timers.drain(..due).collect();
        for timer in fired_timers {
            self.jobs.push_back(Job::Resume {
                ticket: timer.ticket,
                resume: Resume::Timer,
            });
        }

        for (block, epoch) in std::mem::take(&mut self.yielded) {
            self.jobs.push_back(Job::Step { block, epoch });
        }

        let now = self.clock;
        let mut fired = Vec::new();
        for handler in &mut self.handlers {
            if handler.poll_timer(now) {
                fired.push((handler.block.clone(), handler.start_index));
            }
        }
        for (block, index) in fired {
            self.queue_start_by_name(&block, index);
        }

        self.drain();
    }

    /// Execute every handler whose condition matches `trigger`
    pub fn dispatch(&mut self, trigger: &Trigger) -> usize {
        self.begin_pump();
        let count = self.dispatch_handlers(trigger);
        self.drain();
        count
    }

    /// Fire `FlowchartStarted` handlers
    pub fn start(&mut self) -> usize {
        info!(flowchart = %self.name, "flowchart started");
        self.dispatch(&Trigger::FlowchartStarted)
    }

    pub fn send_message(&mut self, message: &str) -> usize {
        self.dispatch(&Trigger::Message(message.to_string()))
    }

    /// Drain work addressed to other flowcharts
    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoing)
    }

    /// Drain host requests published since the last call
    pub fn take_requests(&mut self) -> Vec<HostRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Run the block behind a menu option; pending options are discarded
    pub fn choose_option(&mut self, target: &str) -> Result<ExecuteOutcome> {
        self.requests
            .retain(|r| !matches!(r.kind, RequestKind::MenuOption { .. }));
        self.execute_block(target, 0)
    }

    /// Reset command transient state and/or variables to start values
    pub fn reset(&mut self, commands: bool, variables: bool) {
        if commands {
            for block in &mut self.blocks {
                block.reset_commands();
            }
        }
        if variables {
            self.variables.reset();
            self.public.publish(&self.name, &self.variables);
        }
    }

    /* ===================== Internals ===================== */

    pub(crate) fn is_current(&self, ticket: Ticket) -> bool {
        self.blocks.get(ticket.block.0).is_some_and(|block| {
            block.is_executing()
                && block.epoch == ticket.epoch
                && block.pending.as_ref().is_some_and(|p| p.ticket == ticket)
        })
    }

    pub(crate) fn dispatch_handlers(&mut self, trigger: &Trigger) -> usize {
        let matching: Vec<(String, usize)> = self
            .handlers
            .iter()
            .filter(|h| h.trigger.matches(trigger))
            .map(|h| (h.block.clone(), h.start_index))
            .collect();
        debug!(flowchart = %self.name, ?trigger, handlers = matching.len(), "dispatch");
        let mut count = 0;
        for (block, index) in matching {
            match self.find_block(&block) {
                Some(id) => {
                    self.start_block(id, index, None);
                    count += 1;
                }
                None => {
                    warn!(flowchart = %self.name, block = %block, "handler targets unknown block");
                }
            }
        }
        count
    }

    fn queue_start_by_name(&mut self, name: &str, index: usize) -> bool {
        match self.find_block(name) {
            Some(block) => {
                self.jobs.push_back(Job::Start {
                    block,
                    index,
                    notify: None,
                });
                true
            }
            None => {
                warn!(flowchart = %self.name, block = name, "handler targets unknown block");
                false
            }
        }
    }
}
