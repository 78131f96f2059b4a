//! Flowchart definitions
//!
//! A [`FlowchartDef`] is the serializable description of a flowchart. It is
//! read from `.flow` source, JSON or TOML and turned into a runnable
//! [`Flowchart`] by [`Flowchart::from_def`], which validates it first.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::commands::{CommandEntry, CommandRegistry};
use crate::config::EngineConfig;
use crate::engine::{Block, Command, EventHandler, Flowchart, TriggerCondition};
use crate::error::{EngineError, Result};
use crate::parser::semantic_validator::validate_flowchart;
use crate::parser::{parse_flowchart, Span};
use crate::signals::SignalBus;
use crate::types::VariableScope;
use crate::variables::{Value, ValueType};

/* ===================== Definition Types ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub scope: VariableScope,
    /// Initial value; the type's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl VariableDef {
    /// Initial value converted to the declared type
    pub fn initial_value(&self) -> Result<Value> {
        match &self.value {
            None => Ok(self.value_type.default_value()),
            Some(value) => {
                let found = value.value_type();
                value
                    .clone()
                    .coerce(self.value_type)
                    .ok_or_else(|| EngineError::VariableType {
                        key: self.name.clone(),
                        expected: self.value_type,
                        found,
                    })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Event that starts this block at index 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerCondition>,
    #[serde(default)]
    pub commands: Vec<CommandEntry>,
    /// Source location of the block header, when parsed from `.flow`
    #[serde(skip)]
    pub span: Span,
}

impl BlockDef {
    pub fn new(name: impl Into<String>, commands: Vec<CommandEntry>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            trigger: None,
            commands,
            span: Span::default(),
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerCondition) -> Self {
        self.trigger = Some(trigger);
        self
    }
}

/// A complete flowchart file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowchartDef {
    pub name: String,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub blocks: Vec<BlockDef>,
}

/* ===================== Loading ===================== */

impl FlowchartDef {
    /// Parse `.flow` source; sources without a `flowchart` header get an
    /// empty name
    pub fn from_source(source: &str) -> Result<Self> {
        Ok(parse_flowchart(source)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a definition, choosing the format by file extension.
    ///
    /// An unnamed definition takes the file stem as its name.
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self> = match extension.as_deref() {
            Some("flow") => Self::from_source,
            Some("json") => Self::from_json,
            Some("toml") => Self::from_toml,
            _ => return Err(EngineError::UnsupportedFormat(path.display().to_string())),
        };
        let mut def = parse(&std::fs::read_to_string(path)?)?;
        if def.name.is_empty() {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                def.name = stem.to_string();
            }
        }
        debug!(path = %path.display(), flowchart = %def.name, blocks = def.blocks.len(), "definition loaded");
        Ok(def)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Hex SHA-256 of the canonical JSON form.
    ///
    /// Source locations are not serialized, so reformatting a `.flow` file
    /// keeps the hash.
    pub fn definition_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }

    pub fn block(&self, name: &str) -> Option<&BlockDef> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDef> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/* ===================== Building ===================== */

impl Flowchart {
    /// Validate `def` and build a runnable flowchart from it.
    ///
    /// Validation warnings are logged; any error rejects the definition.
    pub fn from_def(
        def: &FlowchartDef,
        registry: &CommandRegistry,
        signals: SignalBus,
        config: EngineConfig,
    ) -> Result<Self> {
        let (errors, warnings): (Vec<_>, Vec<_>) = validate_flowchart(def)
            .into_iter()
            .partition(|e| e.is_error());
        for warning in &warnings {
            warn!(flowchart = %def.name, "{}", warning);
        }
        if !errors.is_empty() {
            return Err(EngineError::Validation {
                flowchart: def.name.clone(),
                errors,
            });
        }

        let mut flowchart = Flowchart::new(def.name.clone(), signals, config);

        for var in &def.variables {
            let scope = var.scope;
            flowchart.declare_variable(var.name.clone(), scope, var.initial_value()?)?;
        }

        for block_def in &def.blocks {
            let commands = block_def
                .commands
                .iter()
                .map(|entry| entry.build(registry))
                .collect::<Result<Vec<Box<dyn Command>>>>()?;
            let enabled: Vec<bool> = block_def.commands.iter().map(|e| e.enabled).collect();
            let block = Block::new(block_def.name.clone(), commands, &enabled)
                .with_description(block_def.description.clone());
            flowchart.add_block(block)?;

            if let Some(trigger) = &block_def.trigger {
                flowchart.add_handler(EventHandler::new(block_def.name.clone(), trigger.clone()));
            }
        }

        flowchart.definition_hash = Some(def.definition_hash());
        debug!(flowchart = %def.name, blocks = def.blocks.len(), "flowchart built");
        Ok(flowchart)
    }

    pub fn definition_hash(&self) -> Option<&str> {
        self.definition_hash.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandDef;
    use crate::types::SetOperator;
    use crate::variables::Data;

    const JSON: &str = r#"{
        "name": "Demo",
        "variables": [
            { "name": "score", "type": "int", "value": 2 },
            { "name": "speed", "type": "float", "value": 1 },
            { "name": "hero", "type": "string", "scope": "public" }
        ],
        "blocks": [
            {
                "name": "Start",
                "trigger": { "on": "flowchart_started" },
                "commands": [
                    { "type": "set", "variable": "score", "op": "+=", "value": 1 },
                    { "type": "say", "text": "Score {$score}", "enabled": false },
                    { "type": "call", "block": "Other" }
                ]
            },
            { "name": "Other", "description": "second block" }
        ]
    }"#;

    #[test]
    fn test_json_definition_shape() {
        let def = FlowchartDef::from_json(JSON).unwrap();
        assert_eq!(def.name, "Demo");
        assert_eq!(def.variables.len(), 3);
        assert_eq!(def.variables[2].scope, VariableScope::Public);

        let start = def.block("Start").unwrap();
        assert_eq!(start.trigger, Some(TriggerCondition::FlowchartStarted));
        assert_eq!(
            start.commands[0].def,
            CommandDef::Set {
                variable: "score".into(),
                op: SetOperator::Add,
                value: Data::literal(Value::Int(1)),
            }
        );
        assert!(!start.commands[1].enabled);
        assert_eq!(def.block("Other").unwrap().description, "second block");
    }

    #[test]
    fn test_initial_values_are_coerced() {
        let def = FlowchartDef::from_json(JSON).unwrap();
        assert_eq!(def.variables[0].initial_value().unwrap(), Value::Int(2));
        assert_eq!(def.variables[1].initial_value().unwrap(), Value::Float(1.0));
        assert_eq!(
            def.variables[2].initial_value().unwrap(),
            Value::Str(String::new())
        );
    }

    #[test]
    fn test_mistyped_initial_value_rejected() {
        let var = VariableDef {
            name: "flag".into(),
            value_type: ValueType::Bool,
            scope: VariableScope::Private,
            value: Some(Value::Int(1)),
        };
        assert!(matches!(
            var.initial_value(),
            Err(EngineError::VariableType { .. })
        ));
    }

    #[test]
    fn test_from_def_builds_blocks_and_handlers() {
        let def = FlowchartDef::from_json(JSON).unwrap();
        let flowchart = Flowchart::from_def(
            &def,
            &CommandRegistry::default(),
            SignalBus::new(),
            EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(flowchart.name(), "Demo");
        assert_eq!(flowchart.blocks().count(), 2);
        assert_eq!(flowchart.handlers().len(), 1);
        assert!(!flowchart.block("Start").unwrap().layout()[1].enabled);
        assert_eq!(flowchart.definition_hash(), Some(def.definition_hash().as_str()));
    }

    #[test]
    fn test_from_def_rejects_validation_errors() {
        let mut def = FlowchartDef::from_json(JSON).unwrap();
        def.blocks.pop();
        let err = Flowchart::from_def(
            &def,
            &CommandRegistry::default(),
            SignalBus::new(),
            EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert!(err.to_string().contains("Other"));
    }

    #[test]
    fn test_toml_definition() {
        let def = FlowchartDef::from_toml(
            r#"
name = "Timers"

[[variables]]
name = "ticks"
type = "int"

[[blocks]]
name = "Tick"
trigger = { on = "timer_elapsed", interval = 0.5, repeat = true }
commands = [
    { type = "set", variable = "ticks", op = "+=", value = 1 },
]
"#,
        )
        .unwrap();
        assert_eq!(
            def.blocks[0].trigger,
            Some(TriggerCondition::TimerElapsed {
                interval: 0.5,
                repeat: true
            })
        );
        assert_eq!(def.blocks[0].commands.len(), 1);
    }

    #[test]
    fn test_hash_ignores_source_layout() {
        let a = FlowchartDef::from_source("flowchart \"A\"\nblock Main { say \"hi\" }").unwrap();
        let b = FlowchartDef::from_source(
            "flowchart \"A\"\n\n\nblock Main {\n    say \"hi\"\n}\n",
        )
        .unwrap();
        assert_eq!(a.definition_hash(), b.definition_hash());
        assert_eq!(a.definition_hash().len(), 64);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let err = FlowchartDef::load(Path::new("story.yaml")).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_load_names_from_file_stem() {
        let path = std::env::temp_dir().join(format!("intro-{}.flow", uuid::Uuid::new_v4()));
        std::fs::write(&path, "block Main { stop }").unwrap();
        let def = FlowchartDef::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(def.name.starts_with("intro-"));
    }
}
