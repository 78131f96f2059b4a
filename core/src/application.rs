//! Application: configuration plus every loaded flowchart
//!
//! The application owns the pieces flowcharts are built with (engine
//! config, the shared signal bus and public variables, the command
//! registry) and the loaded flowcharts by name. It is created with
//! [`ApplicationBuilder`].
//!
//! Flowcharts never reach each other directly. Cross-flowchart calls,
//! broadcast messages and the answers to cross-flowchart waits are queued
//! as [`Outgoing`] work, and every application entry point forwards that
//! work with [`Application::route`] before returning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::definition::FlowchartDef;
use crate::engine::{Flowchart, HostRequest, Outgoing, Resume, Ticket, Trigger};
use crate::signals::SignalBus;
use crate::types::ExecuteOutcome;
use crate::variables::{PublicVariables, Value};

/// Forwarding passes per `route` call before the rest waits for the next one
const MAX_ROUTING_PASSES: usize = 256;

pub struct Application {
    config: Config,
    signals: SignalBus,
    public: PublicVariables,
    registry: CommandRegistry,
    flowcharts: BTreeMap<String, Flowchart>,
}

impl Application {
    /// Create an application with no flowcharts loaded (no I/O)
    pub fn new(config: Config, signals: SignalBus, registry: CommandRegistry) -> Self {
        Self {
            config,
            signals,
            public: PublicVariables::new(),
            registry,
            flowcharts: BTreeMap::new(),
        }
    }

    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Public variables of every loaded flowchart
    pub fn public(&self) -> &PublicVariables {
        &self.public
    }

    /// Build and register a flowchart; its name must be unused
    pub fn load_def(&mut self, def: &FlowchartDef) -> Result<&mut Flowchart> {
        if self.flowcharts.contains_key(&def.name) {
            bail!("flowchart '{}' is already loaded", def.name);
        }
        let mut flowchart = Flowchart::from_def(
            def,
            &self.registry,
            self.signals.clone(),
            self.config.engine.clone(),
        )?;
        flowchart.share_public(self.public.clone());
        info!(flowchart = %def.name, blocks = def.blocks.len(), "flowchart loaded");
        Ok(self.flowcharts.entry(def.name.clone()).or_insert(flowchart))
    }

    /// Load a `.flow`, `.json` or `.toml` definition file
    pub fn load_file(&mut self, path: &Path) -> Result<&mut Flowchart> {
        let def = FlowchartDef::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        self.load_def(&def)
    }

    pub fn flowchart(&self, name: &str) -> Option<&Flowchart> {
        self.flowcharts.get(name)
    }

    pub fn flowchart_mut(&mut self, name: &str) -> Option<&mut Flowchart> {
        self.flowcharts.get_mut(name)
    }

    pub fn flowcharts(&self) -> impl Iterator<Item = &Flowchart> {
        self.flowcharts.values()
    }

    pub fn flowchart_names(&self) -> Vec<String> {
        self.flowcharts.keys().cloned().collect()
    }

    /// Fire `FlowchartStarted` handlers in every flowchart
    pub fn start_all(&mut self) -> usize {
        let count = self.flowcharts.values_mut().map(Flowchart::start).sum();
        self.route();
        count
    }

    /// Advance every flowchart's clock by `dt` seconds
    pub fn tick_all(&mut self, dt: f64) {
        for flowchart in self.flowcharts.values_mut() {
            flowchart.tick(dt);
        }
        self.route();
    }

    pub fn stop_all(&mut self) {
        for flowchart in self.flowcharts.values_mut() {
            flowchart.stop_all();
        }
        self.route();
    }

    /// Execute `block` of `flowchart`
    pub fn execute_block(
        &mut self,
        flowchart: &str,
        block: &str,
        start_index: usize,
    ) -> Result<ExecuteOutcome> {
        let outcome = self.loaded(flowchart)?.execute_block(block, start_index)?;
        self.route();
        Ok(outcome)
    }

    /// Answer a ticket handed out by `flowchart`; false when stale
    pub fn resume(&mut self, flowchart: &str, ticket: Ticket, resume: Resume) -> bool {
        let resumed = self
            .flowcharts
            .get_mut(flowchart)
            .is_some_and(|f| f.resume(ticket, resume));
        self.route();
        resumed
    }

    /// Deliver `message` to every flowchart; returns the handlers started
    pub fn send_message(&mut self, message: &str) -> usize {
        let count = self
            .flowcharts
            .values_mut()
            .map(|f| f.send_message(message))
            .sum();
        self.route();
        count
    }

    /// Run `trigger` against every flowchart's handlers
    pub fn dispatch(&mut self, trigger: &Trigger) -> usize {
        let count = self
            .flowcharts
            .values_mut()
            .map(|f| f.dispatch(trigger))
            .sum();
        self.route();
        count
    }

    /// Host requests of every flowchart, tagged with the flowchart name
    pub fn take_requests(&mut self) -> Vec<(String, HostRequest)> {
        self.flowcharts
            .iter_mut()
            .flat_map(|(name, f)| {
                f.take_requests()
                    .into_iter()
                    .map(move |request| (name.clone(), request))
            })
            .collect()
    }

    /// Value of a `public` variable as last published by `flowchart`
    pub fn public_value(&self, flowchart: &str, key: &str) -> Option<Value> {
        self.public.get(flowchart, key)
    }

    pub fn set_public_value(&mut self, flowchart: &str, key: &str, value: Value) -> Result<()> {
        self.loaded(flowchart)?.set_public_value(key, value)?;
        Ok(())
    }

    /// Forward cross-flowchart work until no flowchart has any left.
    ///
    /// Returns the number of items delivered.
    pub fn route(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_ROUTING_PASSES {
            let batch: Vec<(String, Outgoing)> = self
                .flowcharts
                .iter_mut()
                .flat_map(|(name, f)| {
                    f.take_outgoing()
                        .into_iter()
                        .map(move |item| (name.clone(), item))
                })
                .collect();
            if batch.is_empty() {
                return delivered;
            }
            for (source, item) in batch {
                self.deliver(&source, item);
                delivered += 1;
            }
        }
        warn!(delivered, "cross-flowchart work did not settle, continuing on the next call");
        delivered
    }

    fn deliver(&mut self, source: &str, item: Outgoing) {
        debug!(from = source, ?item, "routing");
        match item {
            Outgoing::Call {
                flowchart,
                block,
                index,
                caller,
            } => {
                let result = match self.flowcharts.get_mut(&flowchart) {
                    Some(target) => match &caller {
                        Some(caller) => target.execute_block_for(&block, index, source, caller),
                        None => target.execute_block(&block, index),
                    },
                    None => {
                        warn!(from = source, flowchart = %flowchart, block = %block, "call to unknown flowchart");
                        self.reject(source, caller, &flowchart, &block);
                        return;
                    }
                };
                if let Err(err) = result {
                    warn!(from = source, flowchart = %flowchart, error = %err, "cross-flowchart call failed");
                    self.reject(source, caller, &flowchart, &block);
                }
            }
            Outgoing::Broadcast(message) => {
                for flowchart in self.flowcharts.values_mut() {
                    flowchart.send_message(&message);
                }
            }
            Outgoing::Resume {
                flowchart,
                block,
                callee,
                resume,
            } => {
                if let Some(waiting) = self.flowcharts.get_mut(&flowchart) {
                    waiting.resume_remote_wait(&block, source, &callee, resume);
                }
            }
        }
    }

    /// Let a caller waiting on a call that could not start carry on
    fn reject(&mut self, source: &str, caller: Option<String>, flowchart: &str, block: &str) {
        if let (Some(caller), Some(waiting)) = (caller, self.flowcharts.get_mut(source)) {
            waiting.resume_remote_wait(&caller, flowchart, block, Resume::CallRejected);
        }
    }

    fn loaded(&mut self, name: &str) -> Result<&mut Flowchart> {
        self.flowcharts
            .get_mut(name)
            .with_context(|| format!("Flowchart '{}' is not loaded", name))
    }
}

/// Builder for constructing an [`Application`]
pub struct ApplicationBuilder {
    config: Option<Config>,
    config_path: Option<PathBuf>,
    signals: SignalBus,
    registry: CommandRegistry,
    files: Vec<PathBuf>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            config_path: None,
            signals: SignalBus::new(),
            registry: CommandRegistry::default(),
            files: Vec::new(),
        }
    }

    /// Use this configuration instead of loading one
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the config file path
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Share an existing signal bus
    pub fn signals(mut self, signals: SignalBus) -> Self {
        self.signals = signals;
        self
    }

    pub fn registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Definition file to load during build
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn build(self) -> Result<Application> {
        let config = match self.config {
            Some(config) => config,
            None => Config::builder().config_path(self.config_path).build()?,
        };

        let mut app = Application::new(config, self.signals, self.registry);
        for path in &self.files {
            app.load_file(path)?;
        }
        Ok(app)
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalKind;

    fn write_temp(ext: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("app-{}.{}", uuid::Uuid::new_v4(), ext));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_builder_loads_files() {
        let flow = write_temp("flow", "flowchart \"Story\"\nblock Main on start { log \"hi\" }");
        let json = write_temp("json", r#"{ "name": "Menu", "blocks": [{ "name": "Root" }] }"#);

        let app = Application::builder()
            .config(Config::default())
            .file(&flow)
            .file(&json)
            .build()
            .unwrap();
        std::fs::remove_file(flow).ok();
        std::fs::remove_file(json).ok();

        assert_eq!(app.flowchart_names(), vec!["Menu", "Story"]);
        assert!(app.flowchart("Story").unwrap().block("Main").is_some());
    }

    #[test]
    fn test_duplicate_flowchart_rejected() {
        let mut app = Application::new(Config::default(), SignalBus::new(), CommandRegistry::default());
        let def = FlowchartDef::from_source("flowchart \"Dup\"\nblock A { }").unwrap();
        app.load_def(&def).unwrap();
        assert!(app.load_def(&def).is_err());
    }

    #[test]
    fn test_flowcharts_share_signal_bus() {
        let signals = SignalBus::new();
        let started = std::rc::Rc::new(std::cell::Cell::new(0));
        let count = started.clone();
        let _sub = signals.subscribe(SignalKind::BlockStarted, move |_| count.set(count.get() + 1));

        let mut app = Application::builder()
            .config(Config::default())
            .signals(signals)
            .build()
            .unwrap();
        for name in ["One", "Two"] {
            let def =
                FlowchartDef::from_source(&format!("flowchart \"{}\"\nblock A on start {{ }}", name))
                    .unwrap();
            app.load_def(&def).unwrap();
        }

        assert_eq!(app.start_all(), 2);
        assert_eq!(started.get(), 2);
    }

    const STORY: &str = r#"
flowchart "Story"
var after: int = 0
var heard: int = 0

block Main {
    call Slow in "Credits" and wait
    set after = 1
}
block Handoff {
    call Intro in "Credits"
    set after = 99
}
block Nowhere {
    call Intro in "Missing" and wait
    set after = 2
}
block Ring {
    message "bell" to all
}
block Echo on message "bell" {
    set heard += 1
}
block Greet {
    say "You have {$gold} gold and {$secret} secrets"
}
"#;

    const CREDITS: &str = r#"
flowchart "Credits"
public var gold: int = 7
public var shown: int = 0
var secret: int = 3

block Intro {
    set shown += 1
}
block Slow {
    wait 2.0
}
block Hear on message "bell" {
    set gold += 1
}
"#;

    fn story_app() -> Application {
        let mut app = Application::new(Config::default(), SignalBus::new(), CommandRegistry::default());
        for source in [STORY, CREDITS] {
            app.load_def(&FlowchartDef::from_source(source).unwrap()).unwrap();
        }
        app
    }

    fn int(app: &Application, flowchart: &str, key: &str) -> i64 {
        match app.flowchart(flowchart).unwrap().variables().get(key) {
            Some(crate::variables::Value::Int(n)) => *n,
            other => panic!("{}.{} is {:?}", flowchart, key, other),
        }
    }

    #[test]
    fn test_call_into_other_flowchart_hands_off() {
        let mut app = story_app();
        app.execute_block("Story", "Handoff", 0).unwrap();

        assert_eq!(int(&app, "Credits", "shown"), 1);
        assert_eq!(int(&app, "Story", "after"), 0);
        assert_eq!(app.public_value("Credits", "shown"), Some(Value::Int(1)));
    }

    #[test]
    fn test_call_and_wait_across_flowcharts() {
        let mut app = story_app();
        app.execute_block("Story", "Main", 0).unwrap();

        assert_eq!(int(&app, "Story", "after"), 0);
        assert!(app.flowchart("Credits").unwrap().is_executing("Slow"));

        app.tick_all(1.0);
        assert_eq!(int(&app, "Story", "after"), 0);
        app.tick_all(1.0);
        assert_eq!(int(&app, "Story", "after"), 1);
        assert!(app.flowcharts().all(|f| !f.has_executing_blocks()));
    }

    #[test]
    fn test_cross_flowchart_wait_on_running_block_is_rejected() {
        let mut app = story_app();
        app.execute_block("Credits", "Slow", 0).unwrap();
        app.execute_block("Story", "Main", 0).unwrap();

        assert_eq!(int(&app, "Story", "after"), 1);
        assert_eq!(app.flowchart("Credits").unwrap().execution_count("Slow"), Some(1));
    }

    #[test]
    fn test_call_into_unknown_flowchart_does_not_stall() {
        let mut app = story_app();
        app.execute_block("Story", "Nowhere", 0).unwrap();
        assert_eq!(int(&app, "Story", "after"), 2);
    }

    #[test]
    fn test_message_to_all_flowcharts() {
        let mut app = story_app();
        app.execute_block("Story", "Ring", 0).unwrap();

        assert_eq!(int(&app, "Story", "heard"), 1);
        assert_eq!(int(&app, "Credits", "gold"), 8);
    }

    #[test]
    fn test_public_variables_reach_other_flowcharts() {
        let mut app = story_app();
        app.execute_block("Story", "Greet", 0).unwrap();

        let texts: Vec<String> = app
            .take_requests()
            .into_iter()
            .filter_map(|(owner, request)| match request.kind {
                crate::engine::RequestKind::Say { text, .. } => Some(format!("{}: {}", owner, text)),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Story: You have 7 gold and {$secret} secrets"]);
    }

    #[test]
    fn test_set_public_value() {
        let mut app = story_app();
        app.set_public_value("Credits", "gold", Value::Int(50)).unwrap();
        assert_eq!(app.public_value("Credits", "gold"), Some(Value::Int(50)));
        assert_eq!(
            app.flowchart("Story").unwrap().substitute("{$gold}"),
            "50"
        );

        assert!(app.set_public_value("Credits", "secret", Value::Int(1)).is_err());
        assert!(app.set_public_value("Story", "after", Value::Int(1)).is_err());
        assert_eq!(app.public_value("Credits", "secret"), None);
    }

    #[test]
    fn test_restored_cross_flowchart_wait_stays_linked() {
        let mut app = story_app();
        app.execute_block("Story", "Main", 0).unwrap();
        let story = app.flowchart("Story").unwrap().snapshot().unwrap();
        let credits = app.flowchart("Credits").unwrap().snapshot().unwrap();
        assert_eq!(story.blocks[0].waiting_on.as_deref(), Some("Slow"));
        assert_eq!(story.blocks[0].waiting_in.as_deref(), Some("Credits"));
        assert_eq!(
            credits.blocks[1].called_from.as_ref().map(|c| c.block.as_str()),
            Some("Main")
        );

        let mut restored = story_app();
        restored.flowchart_mut("Story").unwrap().restore(&story).unwrap();
        restored.flowchart_mut("Credits").unwrap().restore(&credits).unwrap();
        restored.route();

        assert_eq!(int(&restored, "Story", "after"), 0);
        assert_eq!(
            restored.flowchart("Credits").unwrap().execution_count("Slow"),
            Some(1)
        );

        restored.tick_all(2.0);
        assert_eq!(int(&restored, "Story", "after"), 1);
    }

    #[test]
    fn test_load_file_reports_path() {
        let mut app = Application::new(Config::default(), SignalBus::new(), CommandRegistry::default());
        let err = app.load_file(Path::new("/nonexistent/story.flow")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/story.flow"));
    }
}
