//! Core scheduling loop
//!
//! Jobs are processed strictly in FIFO order. A block runs synchronous
//! commands back to back until one suspends, queues effects, ends the block,
//! or the per-pump step budget runs out. Starting a block runs it at once,
//! so a block started by an effect goes before its starter's next command.
//!
//! ## Function Organization
//! 1. drain() - processes the job queue until empty
//! 2. start_block() / run_block() / resume_block() - block lifecycle
//! 3. apply_flow() / suspend_block() / end_block() - continuation handling

use tracing::{debug, warn};

use super::block::{Block, Caller, Pending};
use super::command::{BlockId, Command, Flow, Resume, Ticket, Wait};
use super::context::Context;
use super::flowchart::Flowchart;
use super::handlers::Trigger;
use super::outbox::{Effect, HostRequest, Outbox, Outgoing};
use crate::signals::Signal;
use crate::types::{ExecuteOutcome, ExecutionState, RestartPolicy};

/* ===================== Jobs ===================== */

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Job {
    Start {
        block: BlockId,
        index: usize,
        notify: Option<Ticket>,
    },
    Step {
        block: BlockId,
        epoch: u64,
    },
    Resume {
        ticket: Ticket,
        resume: Resume,
    },
    Stop {
        block: BlockId,
    },
    Message(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Timer {
    pub fire_at: f64,
    pub ticket: Ticket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndReason {
    /// Cursor ran past the last command
    Completed,
    /// The block's own command returned `Flow::Stop`
    Halted,
    /// Stopped from outside; the active command gets `on_stop`
    Stopped,
}

/* ===================== Driver ===================== */

impl Flowchart {
    /// Reset step budgets at the start of a public entry point
    pub(crate) fn begin_pump(&mut self) {
        for block in &mut self.blocks {
            block.steps = 0;
        }
    }

    /// Process queued jobs until none remain
    pub(crate) fn drain(&mut self) {
        while let Some(job) = self.jobs.pop_front() {
            match job {
                Job::Start {
                    block,
                    index,
                    notify,
                } => {
                    self.start_block(block, index, notify.map(Caller::Local));
                }
                Job::Step { block, epoch } => self.run_block(block, epoch),
                Job::Resume { ticket, resume } => {
                    if self.is_current(ticket) {
                        self.resume_block(ticket, resume);
                    } else {
                        debug!(flowchart = %self.name, ?ticket, "dropping stale resume");
                    }
                }
                Job::Stop { block } => {
                    if self.blocks[block.0].is_executing() {
                        self.end_block(block, EndReason::Stopped);
                    }
                }
                Job::Message(message) => {
                    self.dispatch_handlers(&Trigger::Message(message));
                }
            }
        }
        self.public.publish(&self.name, &self.variables);
    }

    /* ===================== Block lifecycle ===================== */

    pub(crate) fn start_block(
        &mut self,
        id: BlockId,
        index: usize,
        notify: Option<Caller>,
    ) -> ExecuteOutcome {
        let mut outcome = ExecuteOutcome::Started;

        if self.blocks[id.0].is_executing() {
            match self.config.restart_policy {
                RestartPolicy::Ignore => {
                    debug!(
                        flowchart = %self.name,
                        block = %self.blocks[id.0].name,
                        "already executing, start ignored"
                    );
                    if let Some(caller) = notify {
                        self.answer_caller(id, caller, Resume::CallRejected);
                    }
                    return ExecuteOutcome::AlreadyExecuting;
                }
                RestartPolicy::Restart => {
                    self.end_block(id, EndReason::Stopped);
                    self.blocks[id.0].reset_commands();
                    outcome = ExecuteOutcome::Restarted;
                }
            }
        }

        let epoch = self.activate(id, index, notify);
        self.directory.record_execution(id);
        // A started block runs ahead of anything queued behind its start
        self.run_block(id, epoch);
        outcome
    }

    /// Put a block into `Executing` at `index`; returns its new epoch
    pub(crate) fn activate(&mut self, id: BlockId, index: usize, caller: Option<Caller>) -> u64 {
        let block = &mut self.blocks[id.0];
        block.epoch += 1;
        block.state = ExecutionState::Executing;
        block.cursor = index;
        block.active = None;
        block.previous_active = None;
        block.jumped = false;
        block.pending = None;
        block.caller = caller;
        let epoch = block.epoch;

        debug!(flowchart = %self.name, block = %block.name, index, "block started");
        self.signals.emit(&Signal::BlockStarted {
            flowchart: self.name.clone(),
            block: block.name.clone(),
        });
        epoch
    }

    /// Run synchronous commands of `id` until it stops making progress
    pub(crate) fn run_block(&mut self, id: BlockId, epoch: u64) {
        loop {
            let block = &self.blocks[id.0];
            if !block.is_executing() || block.epoch != epoch || block.pending.is_some() {
                return;
            }

            let Some(index) = block.next_runnable(block.cursor) else {
                self.end_block(id, EndReason::Completed);
                return;
            };

            if block.steps >= self.config.max_steps_per_pump {
                debug!(
                    flowchart = %self.name,
                    block = %block.name,
                    steps = block.steps,
                    "step budget exhausted, yielding until next tick"
                );
                self.blocks[id.0].cursor = index;
                self.yielded.push((id, epoch));
                return;
            }

            let (flow, outbox) = self.run_command(id, index, |command, ctx| command.on_enter(ctx));
            if !self.apply_flow(id, index, flow, outbox) {
                return;
            }
        }
    }

    pub(crate) fn resume_block(&mut self, ticket: Ticket, resume: Resume) {
        let id = ticket.block;
        let Some(pending) = self.blocks[id.0].pending.take() else {
            return;
        };
        if let Wait::Timer { .. } = pending.wait {
            self.timers.retain(|t| t.ticket != ticket);
        }

        let index = self.blocks[id.0].cursor;
        let (flow, outbox) =
            self.run_command(id, index, |command, ctx| command.on_resume(ctx, resume));
        if self.apply_flow(id, index, flow, outbox) {
            self.jobs.push_back(Job::Step {
                block: id,
                epoch: ticket.epoch,
            });
        }
    }

    /// Call into one command with a fresh context and collect its outbox
    fn run_command<F>(&mut self, id: BlockId, index: usize, f: F) -> (Flow, Outbox)
    where
        F: FnOnce(&mut dyn Command, &mut Context<'_>) -> Flow,
    {
        let mut outbox = Outbox::default();
        let Flowchart {
            name,
            blocks,
            directory,
            variables,
            callbacks,
            signals,
            public,
            clock,
            ..
        } = self;

        let Block {
            commands,
            layout,
            cursor,
            active,
            previous_active,
            jumped,
            steps,
            ..
        } = &mut blocks[id.0];
        *cursor = index;
        *active = Some(index);
        *steps += 1;

        debug!(
            flowchart = %name,
            block = %directory.name(id),
            index,
            command = commands[index].name(),
            "enter command"
        );

        let mut ctx = Context {
            flowchart: name.as_str(),
            block: id,
            index,
            previous_active: *previous_active,
            jumped: *jumped,
            layout: layout.as_slice(),
            directory: &*directory,
            variables,
            callbacks,
            outbox: &mut outbox,
            signals: &*signals,
            public: &*public,
            now: *clock,
        };
        let flow = f(commands[index].as_mut(), &mut ctx);
        (flow, outbox)
    }

    /* ===================== Continuations ===================== */

    /// Apply a command's continuation and queue its effects.
    ///
    /// Returns true when the block can keep running synchronously.
    fn apply_flow(&mut self, id: BlockId, index: usize, flow: Flow, outbox: Outbox) -> bool {
        let yields = outbox.has_effects();
        self.requests.extend(outbox.requests);
        self.outgoing.extend(outbox.outgoing);

        match flow {
            Flow::Continue => self.advance(id, index, index + 1, false),
            Flow::Jump(target) => self.advance(id, index, target, true),
            Flow::Stop => {
                self.blocks[id.0].active = None;
                self.end_block(id, EndReason::Halted);
            }
            Flow::Suspend(wait) => self.suspend_block(id, wait),
        }

        for effect in outbox.effects {
            self.jobs.push_back(match effect {
                Effect::Start { block, index } => Job::Start {
                    block,
                    index,
                    notify: None,
                },
                Effect::Stop(block) => Job::Stop { block },
                Effect::Message(message) => Job::Message(message),
            });
        }

        let block = &self.blocks[id.0];
        let running = block.is_executing() && block.pending.is_none();
        if running && yields {
            // Let the queued effects run before the next command
            self.jobs.push_back(Job::Step {
                block: id,
                epoch: block.epoch,
            });
            return false;
        }
        running
    }

    /// Move the cursor past a command that returned `Continue`/`Jump`
    fn advance(&mut self, id: BlockId, index: usize, next: usize, jumped: bool) {
        let block = &mut self.blocks[id.0];
        block.active = None;
        block.previous_active = Some(index);
        block.jumped = jumped;
        block.cursor = next;

        self.signals.emit(&Signal::CommandExecuted {
            flowchart: self.name.clone(),
            block: block.name.clone(),
            command: block.commands[index].name().to_string(),
            index,
            max_index: block.commands.len().saturating_sub(1),
        });
    }

    fn suspend_block(&mut self, id: BlockId, wait: Wait) {
        self.serial += 1;
        let block = &mut self.blocks[id.0];
        let caller = block.name.clone();
        let ticket = Ticket {
            block: id,
            epoch: block.epoch,
            serial: self.serial,
        };
        block.pending = Some(Pending {
            ticket,
            wait: wait.clone(),
        });
        debug!(flowchart = %self.name, block = %block.name, ?wait, "block suspended");

        match wait {
            Wait::Timer { seconds } => {
                let fire_at = self.clock + seconds.max(0.0);
                let at = self.timers.partition_point(|t| t.fire_at <= fire_at);
                self.timers.insert(at, Timer { fire_at, ticket });
            }
            Wait::Block {
                target,
                start_index,
            } => {
                if target.0 >= self.blocks.len() {
                    warn!(flowchart = %self.name, ?target, "call target out of range");
                    self.jobs.push_back(Job::Resume {
                        ticket,
                        resume: Resume::CallRejected,
                    });
                    return;
                }
                self.jobs.push_back(Job::Start {
                    block: target,
                    index: start_index,
                    notify: Some(ticket),
                });
            }
            Wait::Flowchart {
                flowchart,
                block,
                start_index,
            } => self.outgoing.push(Outgoing::Call {
                flowchart,
                block,
                index: start_index,
                caller: Some(caller),
            }),
            Wait::Host(kind) => self.requests.push(HostRequest {
                ticket: Some(ticket),
                kind,
            }),
        }
    }

    pub(crate) fn end_block(&mut self, id: BlockId, reason: EndReason) {
        let block = &mut self.blocks[id.0];
        if !block.is_executing() {
            return;
        }
        if reason == EndReason::Stopped {
            if let Some(active) = block.active {
                block.commands[active].on_stop(&self.signals);
            }
        }

        let pending = block.pending.take();
        block.state = ExecutionState::Idle;
        block.epoch += 1;
        block.active = None;
        let caller = block.caller.take();
        let was_stopped = reason != EndReason::Completed;
        let name = block.name.clone();

        if let Some(pending) = pending {
            match pending.wait {
                Wait::Timer { .. } => self.timers.retain(|t| t.ticket != pending.ticket),
                Wait::Host(_) => self.requests.retain(|r| r.ticket != Some(pending.ticket)),
                Wait::Block { .. } | Wait::Flowchart { .. } => {}
            }
        }
        self.yielded.retain(|(b, _)| *b != id);

        debug!(flowchart = %self.name, block = %name, was_stopped, "block ended");
        self.signals.emit(&Signal::BlockEnded {
            flowchart: self.name.clone(),
            block: name,
            was_stopped,
        });

        if let Some(caller) = caller {
            self.answer_caller(id, caller, Resume::BlockEnded { was_stopped });
        }
    }

    /// Resume a waiting caller, here or in the flowchart it lives in
    fn answer_caller(&mut self, id: BlockId, caller: Caller, resume: Resume) {
        match caller {
            Caller::Local(ticket) => self.jobs.push_back(Job::Resume { ticket, resume }),
            Caller::Remote { flowchart, block } => self.outgoing.push(Outgoing::Resume {
                flowchart,
                block,
                callee: self.blocks[id.0].name.clone(),
                resume,
            }),
        }
    }
}
