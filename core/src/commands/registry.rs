//! Factory map for plug-in commands
//!
//! Built-in commands are variants of `CommandDef`. Anything else is looked up
//! here by name and built from its JSON parameters.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tracing::warn;

use crate::engine::{Command, Context, Flow, RequestKind, Resume, Wait};
use crate::error::EngineError;

pub type CommandFactory = Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn Command>, String>>;

pub struct CommandRegistry {
    factories: HashMap<String, CommandFactory>,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("CommandRegistry")
            .field("commands", &names)
            .finish()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("request", |params| {
            HostCall::from_params(params).map(|c| Box::new(c) as Box<dyn Command>)
        });
        registry
    }
}

impl CommandRegistry {
    /// Registry with the bundled plug-ins
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with nothing registered
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `factory` under `name`, replacing any previous entry
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn Command>, String> + 'static,
    {
        let name = name.into();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            warn!(command = %name, "replacing registered command");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn build(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Command>, EngineError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| EngineError::UnknownCommand(name.to_string()))?;
        factory(params).map_err(|message| EngineError::InvalidCommand {
            command: name.to_string(),
            message,
        })
    }
}

/* ===================== Bundled plug-ins ===================== */

#[derive(Debug, Deserialize)]
struct HostCallParams {
    name: String,
    #[serde(default)]
    payload: serde_json::Value,
    /// Variable receiving the host's answer
    #[serde(default)]
    store: Option<String>,
}

/// Suspend on a custom host request, optionally storing the answer
#[derive(Debug, Clone)]
pub struct HostCall {
    pub name: String,
    pub payload: serde_json::Value,
    pub store: Option<String>,
}

impl HostCall {
    fn from_params(params: &serde_json::Value) -> Result<Self, String> {
        let params: HostCallParams =
            serde_json::from_value(params.clone()).map_err(|e| e.to_string())?;
        if params.name.is_empty() {
            return Err("request name must not be empty".to_string());
        }
        Ok(Self {
            name: params.name,
            payload: params.payload,
            store: params.store,
        })
    }
}

impl Command for HostCall {
    fn name(&self) -> &str {
        "Request"
    }

    fn on_enter(&mut self, _ctx: &mut Context<'_>) -> Flow {
        Flow::Suspend(Wait::Host(RequestKind::Custom {
            name: self.name.clone(),
            payload: self.payload.clone(),
        }))
    }

    fn on_resume(&mut self, ctx: &mut Context<'_>, resume: Resume) -> Flow {
        if let (Some(key), Resume::Value(value)) = (&self.store, resume) {
            if let Err(err) = ctx.variables_mut().set(key, value) {
                warn!(request = %self.name, error = %err, "could not store host answer");
            }
        }
        Flow::Continue
    }

    fn summary(&self) -> String {
        match &self.store {
            Some(key) => format!("{} -> {}", self.name, key),
            None => self.name.clone(),
        }
    }
}
