//! Typed variable store
//!
//! Variables are owned by a flowchart and shared by all of its blocks.
//! Commands never own variables; they reach them by key, either directly or
//! through [`Data`] parameters.

pub mod data;
pub mod public;
pub mod substitute;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, VariableError};
use crate::types::{CompareOperator, SetOperator, VariableScope};

pub use data::Data;
pub use public::PublicVariables;
pub use substitute::substitute;

/* ===================== Values ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Opaque handle to a host-side object (`None` is an unset reference)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object: Option<String>,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            object: Some(id.into()),
        }
    }
}

/// Runtime value held by a variable or a literal parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vec3(Vec3),
    Vec2(Vec2),
    Object(ObjectRef),
}

/// Type tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    #[serde(rename = "bool", alias = "boolean")]
    Bool,
    #[serde(rename = "int", alias = "integer")]
    Int,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "string")]
    Str,
    #[serde(rename = "vec2")]
    Vec2,
    #[serde(rename = "vec3")]
    Vec3,
    #[serde(rename = "object")]
    Object,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "string",
            ValueType::Vec2 => "vec2",
            ValueType::Vec3 => "vec3",
            ValueType::Object => "object",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" | "boolean" => Some(ValueType::Bool),
            "int" | "integer" => Some(ValueType::Int),
            "float" => Some(ValueType::Float),
            "string" => Some(ValueType::Str),
            "vec2" => Some(ValueType::Vec2),
            "vec3" => Some(ValueType::Vec3),
            "object" => Some(ValueType::Object),
            _ => None,
        }
    }

    /// Zero value used when a variable is declared without an initialiser
    pub fn default_value(&self) -> Value {
        match self {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Str => Value::Str(String::new()),
            ValueType::Vec2 => Value::Vec2(Vec2::default()),
            ValueType::Vec3 => Value::Vec3(Vec3::default()),
            ValueType::Object => Value::Object(ObjectRef::default()),
        }
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Vec2(_) => ValueType::Vec2,
            Value::Vec3(_) => ValueType::Vec3,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// Convert to `target`, allowing only lossless int → float widening
    pub fn coerce(self, target: ValueType) -> Option<Value> {
        match (self, target) {
            (value, target) if value.value_type() == target => Some(value),
            (Value::Int(i), ValueType::Float) => Some(Value::Float(i as f64)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Evaluate `self <op> other`; `None` when the pair is not comparable
    pub fn compare(&self, op: CompareOperator, other: &Value) -> Option<bool> {
        use std::cmp::Ordering;

        let ordering: Option<Ordering> = match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        };

        if let Some(ordering) = ordering {
            return Some(match op {
                CompareOperator::Equals => ordering == Ordering::Equal,
                CompareOperator::NotEquals => ordering != Ordering::Equal,
                CompareOperator::LessThan => ordering == Ordering::Less,
                CompareOperator::GreaterThan => ordering == Ordering::Greater,
                CompareOperator::LessThanOrEquals => ordering != Ordering::Greater,
                CompareOperator::GreaterThanOrEquals => ordering != Ordering::Less,
            });
        }

        // Remaining types only support equality, and only against their own type
        if self.value_type() != other.value_type() {
            return None;
        }
        match op {
            CompareOperator::Equals => Some(self == other),
            CompareOperator::NotEquals => Some(self != other),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Vec2(v) => write!(f, "({}, {})", v.x, v.y),
            Value::Vec3(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
            Value::Object(ObjectRef { object: Some(id) }) => write!(f, "{}", id),
            Value::Object(ObjectRef { object: None }) => write!(f, "null"),
        }
    }
}

/* ===================== Typed access ===================== */

/// Rust types that can be read from and written to a variable
pub trait VariableType: Clone {
    fn from_value(value: &Value) -> Option<Self>;
    fn into_value(self) -> Value;
}

impl VariableType for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }

    fn into_value(self) -> Value {
        self
    }
}

impl VariableType for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl VariableType for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl VariableType for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl VariableType for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl VariableType for Vec2 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Vec2(self)
    }
}

impl VariableType for Vec3 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Vec3(self)
    }
}

impl VariableType for ObjectRef {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(o) => Some(o.clone()),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Object(self)
    }
}

/* ===================== Store ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub scope: VariableScope,
    value: Value,
    start_value: Value,
}

impl Variable {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_type(&self) -> ValueType {
        self.start_value.value_type()
    }
}

/// Variables of one flowchart, unique by key, in declaration order
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    vars: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable; the initial value is remembered for `reset`
    pub fn declare(
        &mut self,
        key: impl Into<String>,
        scope: VariableScope,
        value: Value,
    ) -> Result<(), EngineError> {
        let key = key.into();
        if self.index.contains_key(&key) {
            return Err(EngineError::DuplicateVariable(key));
        }
        self.index.insert(key.clone(), self.vars.len());
        self.vars.push(Variable {
            key,
            scope,
            start_value: value.clone(),
            value,
        });
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn variable(&self, key: &str) -> Option<&Variable> {
        self.index.get(key).map(|&i| &self.vars[i])
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variable(key).map(|v| &v.value)
    }

    pub fn get_as<T: VariableType>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::from_value)
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), VariableError> {
        let slot = self
            .index
            .get(key)
            .copied()
            .ok_or_else(|| VariableError::NotFound(key.to_string()))?;
        let variable = &mut self.vars[slot];
        let expected = variable.value_type();
        let found = value.value_type();
        variable.value = value
            .coerce(expected)
            .ok_or_else(|| VariableError::TypeMismatch {
                key: key.to_string(),
                expected,
                found,
            })?;
        Ok(())
    }

    /// Apply a set operator with `operand` on the right-hand side
    pub fn apply(
        &mut self,
        key: &str,
        op: SetOperator,
        operand: Value,
    ) -> Result<(), VariableError> {
        let current = self
            .get(key)
            .cloned()
            .ok_or_else(|| VariableError::NotFound(key.to_string()))?;
        let next = apply_operator(key, op, current, operand)?;
        self.set(key, next)
    }

    /// Restore every variable to its declared value
    pub fn reset(&mut self) {
        for variable in &mut self.vars {
            variable.value = variable.start_value.clone();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Replace `{$Key}` tokens with variable values
    pub fn substitute(&self, template: &str) -> String {
        substitute(template, |key| self.get(key).map(|v| v.to_string()))
    }
}

fn apply_operator(
    key: &str,
    op: SetOperator,
    current: Value,
    operand: Value,
) -> Result<Value, VariableError> {
    let unsupported = |value_type: ValueType| VariableError::UnsupportedOperator {
        key: key.to_string(),
        op: op.symbol(),
        value_type,
    };
    let mismatch = |expected: ValueType, found: ValueType| VariableError::TypeMismatch {
        key: key.to_string(),
        expected,
        found,
    };

    let current_type = current.value_type();
    let operand = operand
        .clone()
        .coerce(current_type)
        .ok_or_else(|| mismatch(current_type, operand.value_type()))?;

    match op {
        SetOperator::Assign => Ok(operand),
        SetOperator::Negate => match operand {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(unsupported(other.value_type())),
        },
        SetOperator::Add => match (current, operand) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::Vec2(a), Value::Vec2(b)) => Ok(Value::Vec2(Vec2 {
                x: a.x + b.x,
                y: a.y + b.y,
            })),
            (Value::Vec3(a), Value::Vec3(b)) => Ok(Value::Vec3(Vec3 {
                x: a.x + b.x,
                y: a.y + b.y,
                z: a.z + b.z,
            })),
            (other, _) => Err(unsupported(other.value_type())),
        },
        SetOperator::Subtract => match (current, operand) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            (Value::Vec2(a), Value::Vec2(b)) => Ok(Value::Vec2(Vec2 {
                x: a.x - b.x,
                y: a.y - b.y,
            })),
            (Value::Vec3(a), Value::Vec3(b)) => Ok(Value::Vec3(Vec3 {
                x: a.x - b.x,
                y: a.y - b.y,
                z: a.z - b.z,
            })),
            (other, _) => Err(unsupported(other.value_type())),
        },
        SetOperator::Multiply => match (current, operand) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            (other, _) => Err(unsupported(other.value_type())),
        },
        SetOperator::Divide => match (current, operand) {
            (_, Value::Int(0)) => Err(VariableError::DivideByZero(key.to_string())),
            (_, Value::Float(f)) if f == 0.0 => Err(VariableError::DivideByZero(key.to_string())),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
            (other, _) => Err(unsupported(other.value_type())),
        },
    }
}
