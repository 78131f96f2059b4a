use serde::{Deserialize, Serialize};

/// Block execution state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    #[default]
    Idle,
    Executing,
}

/// Externally visible block status (Executing split by whether a
/// suspension is pending)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    Idle,
    Running,
    Suspended,
}

/// What `execute_block` does when the block is already executing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Leave the running cursor alone and report `AlreadyExecuting`
    #[default]
    Ignore,
    /// Stop the running cursor (`was_stopped = true`) and start again
    Restart,
}

/// Result of asking a flowchart to execute a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Started,
    Restarted,
    AlreadyExecuting,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    #[default]
    Private,
    Public,
}

/// Comparison used by conditional commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompareOperator {
    #[serde(rename = "==", alias = "eq")]
    Equals,
    #[serde(rename = "!=", alias = "ne")]
    NotEquals,
    #[serde(rename = "<", alias = "lt")]
    LessThan,
    #[serde(rename = ">", alias = "gt")]
    GreaterThan,
    #[serde(rename = "<=", alias = "lte")]
    LessThanOrEquals,
    #[serde(rename = ">=", alias = "gte")]
    GreaterThanOrEquals,
}

impl CompareOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOperator::Equals => "==",
            CompareOperator::NotEquals => "!=",
            CompareOperator::LessThan => "<",
            CompareOperator::GreaterThan => ">",
            CompareOperator::LessThanOrEquals => "<=",
            CompareOperator::GreaterThanOrEquals => ">=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(CompareOperator::Equals),
            "!=" => Some(CompareOperator::NotEquals),
            "<" => Some(CompareOperator::LessThan),
            ">" => Some(CompareOperator::GreaterThan),
            "<=" => Some(CompareOperator::LessThanOrEquals),
            ">=" => Some(CompareOperator::GreaterThanOrEquals),
            _ => None,
        }
    }
}

/// Mutation applied by `Set` commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SetOperator {
    #[default]
    #[serde(rename = "=", alias = "assign")]
    Assign,
    #[serde(rename = "=!", alias = "negate")]
    Negate,
    #[serde(rename = "+=", alias = "add")]
    Add,
    #[serde(rename = "-=", alias = "subtract")]
    Subtract,
    #[serde(rename = "*=", alias = "multiply")]
    Multiply,
    #[serde(rename = "/=", alias = "divide")]
    Divide,
}

impl SetOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            SetOperator::Assign => "=",
            SetOperator::Negate => "=!",
            SetOperator::Add => "+=",
            SetOperator::Subtract => "-=",
            SetOperator::Multiply => "*=",
            SetOperator::Divide => "/=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(SetOperator::Assign),
            "=!" => Some(SetOperator::Negate),
            "+=" => Some(SetOperator::Add),
            "-=" => Some(SetOperator::Subtract),
            "*=" => Some(SetOperator::Multiply),
            "/=" => Some(SetOperator::Divide),
            _ => None,
        }
    }
}
