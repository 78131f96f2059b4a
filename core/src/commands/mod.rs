//! Built-in commands
//!
//! Commands are described by the serde-tagged [`CommandDef`] enum and turned
//! into runtime [`Command`] objects by [`CommandEntry::build`]. Plug-in
//! commands go through the [`CommandRegistry`].

pub mod actions;
pub mod control;
pub mod flow;
pub mod narrative;
pub mod registry;


use serde::{Deserialize, Serialize};

use crate::engine::Command;
use crate::error::EngineError;
use crate::parser::Span;
use crate::types::SetOperator;
use crate::variables::{Data, Value};

pub use actions::{Invoke, Log, SendMessage, Set};
pub use control::{Break, Condition, Else, ElseIf, End, If, While};
pub use flow::{Call, CallMode, Comment, Jump, Label, Stop, StopBlock, WaitSeconds};
pub use narrative::{Menu, Say};
pub use registry::{CommandFactory, CommandRegistry, HostCall};

/* ===================== Definitions ===================== */

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_show_count() -> u32 {
    1
}

fn default_interactable() -> Data<bool> {
    Data::literal(true)
}

/// Serializable description of one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandDef {
    If {
        condition: Condition,
    },
    ElseIf {
        condition: Condition,
    },
    Else,
    End,
    While {
        condition: Condition,
    },
    Break,
    Label {
        name: String,
    },
    Jump {
        label: String,
    },
    Comment {
        text: String,
    },
    Call {
        block: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flowchart: Option<String>,
        #[serde(default)]
        start_index: usize,
        #[serde(default)]
        mode: CallMode,
    },
    Stop,
    StopBlock {
        block: String,
    },
    Wait {
        seconds: Data<f64>,
    },
    Set {
        variable: String,
        #[serde(default)]
        op: SetOperator,
        value: Data<Value>,
    },
    Say {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        character: Option<String>,
        #[serde(default = "default_true", skip_serializing_if = "is_true")]
        show_always: bool,
        #[serde(default = "default_show_count")]
        show_count: u32,
    },
    Menu {
        text: String,
        target: String,
        #[serde(default)]
        hide_if_visited: bool,
        #[serde(default = "default_interactable")]
        interactable: Data<bool>,
    },
    SendMessage {
        message: String,
        #[serde(default, skip_serializing_if = "is_false")]
        all_flowcharts: bool,
    },
    Invoke {
        callback: String,
    },
    Log {
        message: String,
    },
    /// Registered plug-in command
    Plugin {
        command: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

impl CommandDef {
    /// Display name matching the runtime command's `name()`
    pub fn type_name(&self) -> &str {
        match self {
            CommandDef::If { .. } => "If",
            CommandDef::ElseIf { .. } => "Else If",
            CommandDef::Else => "Else",
            CommandDef::End => "End",
            CommandDef::While { .. } => "While",
            CommandDef::Break => "Break",
            CommandDef::Label { .. } => "Label",
            CommandDef::Jump { .. } => "Jump",
            CommandDef::Comment { .. } => "Comment",
            CommandDef::Call { .. } => "Call",
            CommandDef::Stop => "Stop",
            CommandDef::StopBlock { .. } => "Stop Block",
            CommandDef::Wait { .. } => "Wait",
            CommandDef::Set { .. } => "Set Variable",
            CommandDef::Say { .. } => "Say",
            CommandDef::Menu { .. } => "Menu",
            CommandDef::SendMessage { .. } => "Send Message",
            CommandDef::Invoke { .. } => "Invoke",
            CommandDef::Log { .. } => "Log",
            CommandDef::Plugin { command, .. } => command,
        }
    }

    /// Block names this command refers to
    pub fn referenced_blocks(&self) -> Vec<&str> {
        match self {
            CommandDef::Call {
                block,
                flowchart: None,
                ..
            }
            | CommandDef::StopBlock { block } => vec![block.as_str()],
            CommandDef::Menu { target, .. } => vec![target.as_str()],
            _ => Vec::new(),
        }
    }

    /// Variable names this command reads or writes
    pub fn referenced_variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        match self {
            CommandDef::If { condition }
            | CommandDef::ElseIf { condition }
            | CommandDef::While { condition } => {
                names.push(condition.variable.as_str());
                names.extend(condition.value.variable());
            }
            CommandDef::Set {
                variable, value, ..
            } => {
                names.push(variable.as_str());
                names.extend(value.variable());
            }
            CommandDef::Wait { seconds } => names.extend(seconds.variable()),
            CommandDef::Menu { interactable, .. } => names.extend(interactable.variable()),
            _ => {}
        }
        names
    }

    pub fn build(&self, registry: &CommandRegistry) -> Result<Box<dyn Command>, EngineError> {
        let command: Box<dyn Command> = match self.clone() {
            CommandDef::If { condition } => Box::new(If { condition }),
            CommandDef::ElseIf { condition } => Box::new(ElseIf { condition }),
            CommandDef::Else => Box::new(Else),
            CommandDef::End => Box::new(End),
            CommandDef::While { condition } => Box::new(While { condition }),
            CommandDef::Break => Box::new(Break),
            CommandDef::Label { name } => Box::new(Label { name }),
            CommandDef::Jump { label } => Box::new(Jump { label }),
            CommandDef::Comment { text } => Box::new(Comment { text }),
            CommandDef::Call {
                block,
                flowchart,
                start_index,
                mode,
            } => Box::new(Call {
                block,
                flowchart,
                start_index,
                mode,
            }),
            CommandDef::Stop => Box::new(Stop),
            CommandDef::StopBlock { block } => Box::new(StopBlock { block }),
            CommandDef::Wait { seconds } => Box::new(WaitSeconds { seconds }),
            CommandDef::Set {
                variable,
                op,
                value,
            } => Box::new(Set {
                variable,
                op,
                value,
            }),
            CommandDef::Say {
                text,
                character,
                show_always,
                show_count,
            } => {
                let say = Say::new(text, character);
                Box::new(if show_always { say } else { say.limited(show_count) })
            }
            CommandDef::Menu {
                text,
                target,
                hide_if_visited,
                interactable,
            } => Box::new(Menu {
                text,
                target,
                hide_if_visited,
                interactable,
            }),
            CommandDef::SendMessage {
                message,
                all_flowcharts,
            } => Box::new(SendMessage {
                message,
                all_flowcharts,
            }),
            CommandDef::Invoke { callback } => Box::new(Invoke { callback }),
            CommandDef::Log { message } => Box::new(Log { message }),
            CommandDef::Plugin { command, params } => return registry.build(&command, &params),
        };
        Ok(command)
    }
}

/// A command definition plus its enabled flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    #[serde(flatten)]
    pub def: CommandDef,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(skip)]
    pub span: Span,
}

impl CommandEntry {
    pub fn build(&self, registry: &CommandRegistry) -> Result<Box<dyn Command>, EngineError> {
        self.def.build(registry)
    }
}

impl From<CommandDef> for CommandEntry {
    fn from(def: CommandDef) -> Self {
        Self {
            def,
            enabled: true,
            span: Span::default(),
        }
    }
}
