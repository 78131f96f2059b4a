//! Error types
//!
//! Load-time and API-level failures. Nothing in here is raised from inside
//! the scheduler: misconfigured commands log and continue instead.

use thiserror::Error;

use crate::parser::semantic_validator::ValidationError;
use crate::parser::ParseError;
use crate::variables::ValueType;

/// Errors raised while building, loading or driving a flowchart.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Two blocks in one flowchart share a name.
    #[error("duplicate block name '{0}'")]
    DuplicateBlock(String),

    /// Two variables in one flowchart share a key.
    #[error("duplicate variable '{0}'")]
    DuplicateVariable(String),

    /// A plug-in command name has no registered constructor.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A plug-in constructor rejected its parameters.
    #[error("invalid parameters for command '{command}': {message}")]
    InvalidCommand { command: String, message: String },

    /// A block was looked up by name and is not part of the flowchart.
    #[error("block '{0}' not found")]
    BlockNotFound(String),

    /// A variable initial value does not fit its declared type.
    #[error("variable '{key}' declared as {expected:?} but initialised with a {found:?}")]
    VariableType {
        key: String,
        expected: ValueType,
        found: ValueType,
    },

    /// A variable was accessed from outside its flowchart but is not `public`.
    #[error("variable '{0}' is not public")]
    VariableNotPublic(String),

    #[error(transparent)]
    Variable(#[from] VariableError),

    /// `.flow` source failed to parse.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Semantic validation reported at least one error.
    #[error("flowchart '{flowchart}' failed validation:\n{}", format_validation(.errors))]
    Validation {
        flowchart: String,
        errors: Vec<ValidationError>,
    },

    /// A snapshot could not be applied to this flowchart.
    #[error("snapshot rejected: {0}")]
    Snapshot(String),

    #[error("unsupported definition file '{0}' (expected .flow, .json or .toml)")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors from variable store writes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariableError {
    #[error("variable '{0}' not found")]
    NotFound(String),

    #[error("variable '{key}' is {expected:?}, cannot store a {found:?}")]
    TypeMismatch {
        key: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("operator {op} is not supported for {value_type:?} variable '{key}'")]
    UnsupportedOperator {
        key: String,
        op: &'static str,
        value_type: ValueType,
    },

    #[error("division by zero on variable '{0}'")]
    DivideByZero(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
