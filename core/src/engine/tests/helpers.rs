//! Test helpers for engine tests
//!
//! Common utilities for building flowcharts from `.flow` source and
//! recording the signals they emit

use std::cell::RefCell;
use std::rc::Rc;

use crate::commands::CommandRegistry;
use crate::config::EngineConfig;
use crate::definition::FlowchartDef;
use crate::engine::{Flowchart, HostRequest, RequestKind, Ticket};
use crate::signals::{NarrationState, Signal, SignalBus, SignalKind, Subscription};
use crate::types::RestartPolicy;

/// A flowchart plus every signal it emitted, rendered as short strings
pub struct Harness {
    pub flowchart: Flowchart,
    events: Rc<RefCell<Vec<String>>>,
    _subscriptions: Vec<Subscription>,
}

/// Parse, validate and build `source` with the default engine config
pub fn build(source: &str) -> Harness {
    build_with(source, EngineConfig::default(), CommandRegistry::default())
}

pub fn build_with_budget(source: &str, max_steps_per_pump: usize) -> Harness {
    let config = EngineConfig {
        max_steps_per_pump,
        ..EngineConfig::default()
    };
    build_with(source, config, CommandRegistry::default())
}

pub fn build_restarting(source: &str) -> Harness {
    let config = EngineConfig {
        restart_policy: RestartPolicy::Restart,
        ..EngineConfig::default()
    };
    build_with(source, config, CommandRegistry::default())
}

pub fn build_with(source: &str, config: EngineConfig, registry: CommandRegistry) -> Harness {
    let def = FlowchartDef::from_source(source).expect("Parse flowchart failed");
    let bus = SignalBus::new();
    let events = Rc::new(RefCell::new(Vec::new()));

    let kinds = [
        SignalKind::BlockStarted,
        SignalKind::BlockEnded,
        SignalKind::CommandExecuted,
        SignalKind::Narration,
        SignalKind::MessageSent,
    ];
    let subscriptions: Vec<Subscription> = kinds
        .into_iter()
        .map(|kind| {
            let events = events.clone();
            bus.subscribe(kind, move |signal| events.borrow_mut().push(render(signal)))
        })
        .collect();

    let flowchart =
        Flowchart::from_def(&def, &registry, bus, config).expect("Build flowchart failed");
    Harness {
        flowchart,
        events,
        _subscriptions: subscriptions,
    }
}

fn render(signal: &Signal) -> String {
    match signal {
        Signal::BlockStarted { block, .. } => format!("start:{}", block),
        Signal::BlockEnded {
            block, was_stopped, ..
        } => {
            if *was_stopped {
                format!("end:{}:stopped", block)
            } else {
                format!("end:{}", block)
            }
        }
        Signal::CommandExecuted { block, index, .. } => format!("exec:{}:{}", block, index),
        Signal::Narration { state, text, .. } => match state {
            NarrationState::Start => format!("say:{}", text),
            NarrationState::End => format!("said:{}", text),
        },
        Signal::MessageSent { message, .. } => format!("message:{}", message),
    }
}

impl Harness {
    /// Signals recorded so far
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    /// Recorded signals whose rendering starts with `prefix`
    pub fn events_with(&self, prefix: &str) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn run(&mut self, block: &str) {
        self.flowchart
            .execute_block(block, 0)
            .expect("Execute block failed");
    }

    pub fn int(&self, key: &str) -> i64 {
        self.flowchart
            .variables()
            .get_as::<i64>(key)
            .unwrap_or_else(|| panic!("no int variable '{}'", key))
    }

    /// Ticket `block` is currently suspended on
    pub fn ticket(&self, block: &str) -> Ticket {
        self.flowchart
            .block(block)
            .and_then(|b| b.pending_ticket())
            .unwrap_or_else(|| panic!("block '{}' is not suspended", block))
    }

    pub fn requests(&mut self) -> Vec<HostRequest> {
        self.flowchart.take_requests()
    }

    /// Texts of the say requests published since the last call
    pub fn say_texts(&mut self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r.kind {
                RequestKind::Say { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}
