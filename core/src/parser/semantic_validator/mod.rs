//! Semantic validation for flowchart definitions
//!
//! Rule-based checks that run after parsing (or after loading JSON/TOML) to
//! catch mistakes the grammar can't: references to blocks, variables and
//! labels that don't exist, unbalanced `If`/`While`/`End` lists, and so on.
//!
//! # Usage
//!
//! ```ignore
//! use blockflow_core::parser::{parse_flowchart, semantic_validator::validate_flowchart};
//!
//! let def = parse_flowchart(source)?;
//! for error in validate_flowchart(&def) {
//!     eprintln!("{}", error);
//! }
//! ```
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `semantic_validator/rules/`
//! 2. Implement `ValidationRule` for your struct
//! 3. Add it to the `Validator::new()` constructor

pub mod rules;

use super::Span;
use crate::definition::{BlockDef, FlowchartDef};

// ============================================================================
// Validation Error Types
// ============================================================================

/// A validation finding produced by semantic analysis.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Source location, when the definition came from `.flow` source
    pub span: Span,
    /// Block the finding belongs to
    pub block: Option<String>,
    /// Command index within `block`
    pub command: Option<usize>,
    pub message: String,
    pub severity: Severity,
    /// Which rule produced this error
    pub rule_id: &'static str,
}

/// Severity levels for validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The flowchart is refused
    Error,
    /// Loaded, but probably a mistake
    Warning,
    Hint,
}

impl ValidationError {
    pub fn error(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            block: None,
            command: None,
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(span, message, rule_id)
        }
    }

    #[allow(dead_code)]
    pub fn hint(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            severity: Severity::Hint,
            ..Self::error(span, message, rule_id)
        }
    }

    /// Attach the block (and optionally command index) this finding is about
    pub fn in_block(mut self, block: &BlockDef, command: Option<usize>) -> Self {
        self.block = Some(block.name.clone());
        self.command = command;
        self
    }

    /// Check if this is an error (not a warning or hint)
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
        };
        if self.span.is_known() {
            return write!(
                f,
                "{} at line {}, col {}: {} [{}]",
                severity,
                self.span.start_line + 1,
                self.span.start_col + 1,
                self.message,
                self.rule_id
            );
        }
        match (&self.block, self.command) {
            (Some(block), Some(index)) => write!(
                f,
                "{} in block '{}' at command {}: {} [{}]",
                severity, block, index, self.message, self.rule_id
            ),
            (Some(block), None) => write!(
                f,
                "{} in block '{}': {} [{}]",
                severity, block, self.message, self.rule_id
            ),
            _ => write!(f, "{}: {} [{}]", severity, self.message, self.rule_id),
        }
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// ValidationRule Trait
// ============================================================================

/// Trait that all validation rules must implement.
///
/// Each rule checks one aspect of the definition and must not depend on the
/// results of other rules.
pub trait ValidationRule: Send + Sync {
    /// Unique identifier for this rule (e.g., "undefined-block")
    fn id(&self) -> &'static str;

    /// Human-readable description of what this rule checks
    fn description(&self) -> &'static str;

    /// Run the validation and return any findings; empty means no issues.
    fn validate(&self, def: &FlowchartDef) -> Vec<ValidationError>;
}

// ============================================================================
// Validator - Runs All Rules
// ============================================================================

/// The main validator that orchestrates all validation rules.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// Create a new validator with all built-in rules.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::DuplicateNameRule),
                Box::new(rules::UndefinedBlockRule),
                Box::new(rules::UndefinedVariableRule),
                Box::new(rules::UndefinedLabelRule),
                Box::new(rules::UnbalancedScopeRule),
                Box::new(rules::BreakOutsideLoopRule),
            ],
        }
    }

    /// Run all validation rules and collect errors.
    pub fn validate(&self, def: &FlowchartDef) -> Vec<ValidationError> {
        self.rules
            .iter()
            .flat_map(|rule| rule.validate(def))
            .collect()
    }

    /// Get a list of all registered rules (useful for documentation)
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Validate a flowchart definition with every built-in rule.
pub fn validate_flowchart(def: &FlowchartDef) -> Vec<ValidationError> {
    Validator::new().validate(def)
}

/// Check if a definition has any validation errors (not just warnings).
pub fn has_errors(def: &FlowchartDef) -> bool {
    validate_flowchart(def).iter().any(|e| e.is_error())
}

#[cfg(test)]
mod tests;
