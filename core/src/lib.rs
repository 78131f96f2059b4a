//! Blockflow: cooperative block/command flowcharts
//!
//! A flowchart is a set of named blocks, each an ordered list of commands,
//! plus typed variables. Blocks run side by side on one thread: a command
//! either finishes immediately or suspends its block until a timer, another
//! block or the host answers. See [`engine`] for the scheduler.

pub mod application;
pub mod cli;
pub mod commands;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod parser;
pub mod save;
pub mod signals;
pub mod types;
pub mod variables;

// Re-export main types
pub use types::*;

pub use application::{Application, ApplicationBuilder};
pub use commands::{CommandDef, CommandEntry, CommandRegistry};
pub use config::{Config, EngineConfig};
pub use definition::{BlockDef, FlowchartDef, VariableDef};
pub use engine::{Flowchart, HostRequest, RequestKind, Resume, Ticket, Trigger};
pub use error::{EngineError, Result};
pub use save::FlowchartSnapshot;
pub use signals::{Signal, SignalBus, SignalKind, Subscription};
pub use variables::{Data, Value, ValueType, VariableStore};
