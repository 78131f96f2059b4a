//! PEST-based parser for `.flow` flowchart scripts
//!
//! Produces a [`FlowchartDef`] whose nested `if`/`while` bodies are
//! flattened into `If`/`ElseIf`/`Else`/`End`/`While` command lists, with
//! span information on every block and command for error reporting.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};

use crate::commands::{CallMode, CommandDef, CommandEntry, Condition};
use crate::definition::{BlockDef, FlowchartDef, VariableDef};
use crate::engine::TriggerCondition;
use crate::types::{CompareOperator, SetOperator, VariableScope};
use crate::variables::{Data, ObjectRef, Value, ValueType, VariableType, Vec2, Vec3};

pub mod semantic_validator;


/* ===================== Span ===================== */

/// Source location span for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Whether this span points into real source (definitions loaded from
    /// JSON or TOML carry the default span)
    pub fn is_known(&self) -> bool {
        *self != Span::default()
    }
}

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/flow.pest"]
struct FlowParser;

/* ===================== Error Types ===================== */

#[derive(Debug)]
pub enum ParseError {
    PestError(String, Option<Span>),
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::PestError(_, span) => *span,
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg, _) => msg,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::PestError(msg, _) => write!(f, "{}", msg),
            ParseError::BuildError(msg, Some(span)) => write!(
                f,
                "{} at line {}, col {}",
                msg,
                span.start_line + 1,
                span.start_col + 1
            ),
            ParseError::BuildError(msg, None) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let span = match err.line_col {
            pest::error::LineColLocation::Pos((line, col)) => Some(Span {
                start: 0,
                end: 0,
                start_line: line.saturating_sub(1),
                start_col: col.saturating_sub(1),
                end_line: line.saturating_sub(1),
                end_col: col,
            }),
            pest::error::LineColLocation::Span((start_line, start_col), (end_line, end_col)) => {
                Some(Span {
                    start: 0,
                    end: 0,
                    start_line: start_line.saturating_sub(1),
                    start_col: start_col.saturating_sub(1),
                    end_line: end_line.saturating_sub(1),
                    end_col: end_col.saturating_sub(1),
                })
            }
        };
        ParseError::PestError(err.to_string(), span)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Span Helpers ===================== */

/// Convert a PEST pair's span to our Span type
fn pair_to_span(pair: &Pair<Rule>, source: &str) -> Span {
    let pest_span = pair.as_span();
    let start = pest_span.start();
    let end = pest_span.end();

    let (start_line, start_col) = offset_to_line_col(source, start);
    let (end_line, end_col) = offset_to_line_col(source, end);

    Span::new(start, end, start_line, start_col, end_line, end_col)
}

/// Convert byte offset to (line, column) - 0-indexed
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 0;
    let mut col = 0;
    let mut current_offset = 0;

    for ch in source.chars() {
        if current_offset >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
        current_offset += ch.len_utf8();
    }

    (line, col)
}

/* ===================== Public API ===================== */

/// Parse `.flow` source into a flowchart definition.
///
/// The name comes from the `flowchart "..."` header and is empty without
/// one.
pub fn parse_flowchart(source: &str) -> ParseResult<FlowchartDef> {
    let mut pairs = FlowParser::parse(Rule::program, source)?;
    let program = pairs.next().unwrap();

    let mut def = FlowchartDef::default();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::header => def.name = build_string(pair.into_inner().next().unwrap()),
            Rule::var_decl => def.variables.push(build_var_decl(pair, source)?),
            Rule::block_def => def.blocks.push(build_block_def(pair, source)?),
            Rule::EOI => {}
            rule => {
                return Err(ParseError::BuildError(
                    format!("Unexpected program content: {:?}", rule),
                    Some(pair_to_span(&pair, source)),
                ))
            }
        }
    }
    Ok(def)
}

/* ===================== Definition Builder ===================== */

fn build_var_decl(pair: Pair<Rule>, source: &str) -> ParseResult<VariableDef> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner().peekable();

    let scope = if inner.peek().map(|p| p.as_rule()) == Some(Rule::public_kw) {
        inner.next();
        VariableScope::Public
    } else {
        VariableScope::Private
    };

    let name = inner.next().unwrap().as_str().to_string();
    let type_pair = inner.next().unwrap();
    let value_type = ValueType::from_name(type_pair.as_str()).ok_or_else(|| {
        ParseError::BuildError(
            format!("Unknown variable type: {}", type_pair.as_str()),
            Some(pair_to_span(&type_pair, source)),
        )
    })?;

    let value = match inner.next() {
        Some(literal_pair) => {
            let value = build_literal(literal_pair, source)?;
            let found = value.value_type();
            let coerced = value.coerce(value_type).ok_or_else(|| {
                ParseError::BuildError(
                    format!(
                        "Variable '{}' is declared {} but initialised with a {}",
                        name,
                        value_type.name(),
                        found.name()
                    ),
                    Some(span),
                )
            })?;
            Some(coerced)
        }
        None => None,
    };

    Ok(VariableDef {
        name,
        value_type,
        scope,
        value,
    })
}

fn build_block_def(pair: Pair<Rule>, source: &str) -> ParseResult<BlockDef> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let name = inner.next().unwrap().as_str().to_string();
    let mut block = BlockDef::new(name, Vec::new());
    block.span = span;

    for part in inner {
        match part.as_rule() {
            Rule::string => block.description = build_string(part),
            Rule::trigger => block.trigger = Some(build_trigger(part, source)?),
            Rule::body => build_body(part, source, &mut block.commands)?,
            rule => {
                return Err(ParseError::BuildError(
                    format!("Unexpected block content: {:?}", rule),
                    Some(pair_to_span(&part, source)),
                ))
            }
        }
    }
    Ok(block)
}

fn build_trigger(pair: Pair<Rule>, source: &str) -> ParseResult<TriggerCondition> {
    let kind = pair.into_inner().next().unwrap();
    let span = pair_to_span(&kind, source);
    let rule = kind.as_rule();
    let mut inner = kind.into_inner();

    let trigger = match rule {
        Rule::trig_start => TriggerCondition::FlowchartStarted,
        Rule::trig_message => TriggerCondition::MessageReceived {
            message: build_string(inner.next().unwrap()),
        },
        Rule::trig_key => TriggerCondition::KeyPressed {
            key: build_string(inner.next().unwrap()),
        },
        Rule::trig_click => TriggerCondition::Clicked {
            object: build_string(inner.next().unwrap()),
        },
        Rule::trig_collision => TriggerCondition::Collision {
            tag: build_string(inner.next().unwrap()),
        },
        Rule::trig_timer => {
            let interval = build_number(inner.next().unwrap(), source)?;
            if interval <= 0.0 {
                return Err(ParseError::BuildError(
                    "Timer interval must be greater than zero".to_string(),
                    Some(span),
                ));
            }
            TriggerCondition::TimerElapsed {
                interval,
                repeat: inner.next().is_some(),
            }
        }
        rule => {
            return Err(ParseError::BuildError(
                format!("Unexpected trigger: {:?}", rule),
                Some(span),
            ))
        }
    };
    Ok(trigger)
}

/* ===================== Command Builder ===================== */

fn entry(def: CommandDef, span: Span) -> CommandEntry {
    CommandEntry {
        def,
        enabled: true,
        span,
    }
}

fn build_body(pair: Pair<Rule>, source: &str, out: &mut Vec<CommandEntry>) -> ParseResult<()> {
    for stmt in pair.into_inner() {
        build_statement(stmt, source, out)?;
    }
    Ok(())
}

fn build_statement(pair: Pair<Rule>, source: &str, out: &mut Vec<CommandEntry>) -> ParseResult<()> {
    match pair.as_rule() {
        Rule::if_stmt => build_if_stmt(pair, source, out),
        Rule::while_stmt => build_while_stmt(pair, source, out),
        Rule::disabled_stmt => {
            let mut disabled = build_simple_stmt(pair.into_inner().next().unwrap(), source)?;
            disabled.enabled = false;
            out.push(disabled);
            Ok(())
        }
        _ => {
            out.push(build_simple_stmt(pair, source)?);
            Ok(())
        }
    }
}

fn build_if_stmt(pair: Pair<Rule>, source: &str, out: &mut Vec<CommandEntry>) -> ParseResult<()> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let condition = build_condition(inner.next().unwrap(), source)?;
    out.push(entry(CommandDef::If { condition }, span));
    build_body(inner.next().unwrap(), source, out)?;

    for clause in inner {
        let clause_span = pair_to_span(&clause, source);
        match clause.as_rule() {
            Rule::elif_clause => {
                let mut clause_inner = clause.into_inner();
                let condition = build_condition(clause_inner.next().unwrap(), source)?;
                out.push(entry(CommandDef::ElseIf { condition }, clause_span));
                build_body(clause_inner.next().unwrap(), source, out)?;
            }
            Rule::else_clause => {
                out.push(entry(CommandDef::Else, clause_span));
                build_body(clause.into_inner().next().unwrap(), source, out)?;
            }
            rule => {
                return Err(ParseError::BuildError(
                    format!("Unexpected if clause: {:?}", rule),
                    Some(clause_span),
                ))
            }
        }
    }

    out.push(entry(CommandDef::End, span));
    Ok(())
}

fn build_while_stmt(
    pair: Pair<Rule>,
    source: &str,
    out: &mut Vec<CommandEntry>,
) -> ParseResult<()> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let condition = build_condition(inner.next().unwrap(), source)?;
    out.push(entry(CommandDef::While { condition }, span));
    build_body(inner.next().unwrap(), source, out)?;
    out.push(entry(CommandDef::End, span));
    Ok(())
}

fn build_condition(pair: Pair<Rule>, source: &str) -> ParseResult<Condition> {
    let mut inner = pair.into_inner();
    let variable = inner.next().unwrap().as_str().to_string();

    let op_pair = inner.next().unwrap();
    let op = CompareOperator::from_symbol(op_pair.as_str()).ok_or_else(|| {
        ParseError::BuildError(
            format!("Unknown comparison operator: {}", op_pair.as_str()),
            Some(pair_to_span(&op_pair, source)),
        )
    })?;

    let value = build_operand(inner.next().unwrap(), source)?;
    Ok(Condition {
        variable,
        op,
        value,
    })
}

fn build_simple_stmt(pair: Pair<Rule>, source: &str) -> ParseResult<CommandEntry> {
    let span = pair_to_span(&pair, source);
    let rule = pair.as_rule();
    let mut inner = pair.into_inner();

    let def = match rule {
        Rule::say_stmt => {
            let mut character = None;
            let mut text = String::new();
            let mut once = false;
            for part in inner {
                match part.as_rule() {
                    Rule::identifier => character = Some(part.as_str().to_string()),
                    Rule::string => text = build_string(part),
                    Rule::once_kw => once = true,
                    _ => {}
                }
            }
            CommandDef::Say {
                text,
                character,
                show_always: !once,
                show_count: 1,
            }
        }
        Rule::set_stmt => {
            let variable = inner.next().unwrap().as_str().to_string();
            let op_pair = inner.next().unwrap();
            let op = SetOperator::from_symbol(op_pair.as_str()).ok_or_else(|| {
                ParseError::BuildError(
                    format!("Unknown set operator: {}", op_pair.as_str()),
                    Some(pair_to_span(&op_pair, source)),
                )
            })?;
            let value = build_operand(inner.next().unwrap(), source)?;
            CommandDef::Set {
                variable,
                op,
                value,
            }
        }
        Rule::break_stmt => CommandDef::Break,
        Rule::label_stmt => CommandDef::Label {
            name: inner.next().unwrap().as_str().to_string(),
        },
        Rule::jump_stmt => CommandDef::Jump {
            label: inner.next().unwrap().as_str().to_string(),
        },
        Rule::call_stmt => {
            let block = inner.next().unwrap().as_str().to_string();
            let mut flowchart = None;
            let mut start_index = 0;
            let mut mode = CallMode::default();
            for part in inner {
                match part.as_rule() {
                    Rule::in_flowchart => {
                        flowchart = Some(build_string(part.into_inner().next().unwrap()));
                    }
                    Rule::at_index => {
                        let index_pair = part.into_inner().next().unwrap();
                        start_index = index_pair.as_str().parse().map_err(|_| {
                            ParseError::BuildError(
                                format!("Invalid start index: {}", index_pair.as_str()),
                                Some(pair_to_span(&index_pair, source)),
                            )
                        })?;
                    }
                    Rule::call_mode => {
                        mode = match part.into_inner().next().unwrap().as_rule() {
                            Rule::mode_continue => CallMode::Continue,
                            Rule::mode_wait => CallMode::Wait,
                            _ => CallMode::Stop,
                        };
                    }
                    _ => {}
                }
            }
            CommandDef::Call {
                block,
                flowchart,
                start_index,
                mode,
            }
        }
        Rule::stop_block_stmt => CommandDef::StopBlock {
            block: inner.next().unwrap().as_str().to_string(),
        },
        Rule::stop_stmt => CommandDef::Stop,
        Rule::wait_stmt => CommandDef::Wait {
            seconds: build_operand(inner.next().unwrap(), source)?,
        },
        Rule::menu_stmt => {
            let text = build_string(inner.next().unwrap());
            let target = inner.next().unwrap().as_str().to_string();
            let mut hide_if_visited = false;
            let mut interactable = Data::literal(true);
            for part in inner {
                match part.as_rule() {
                    Rule::once_kw => hide_if_visited = true,
                    Rule::when_clause => {
                        interactable = build_operand(part.into_inner().next().unwrap(), source)?;
                    }
                    _ => {}
                }
            }
            CommandDef::Menu {
                text,
                target,
                hide_if_visited,
                interactable,
            }
        }
        Rule::message_stmt => CommandDef::SendMessage {
            message: build_string(inner.next().unwrap()),
            all_flowcharts: inner.next().is_some(),
        },
        Rule::invoke_stmt => CommandDef::Invoke {
            callback: inner.next().unwrap().as_str().to_string(),
        },
        Rule::log_stmt => CommandDef::Log {
            message: build_string(inner.next().unwrap()),
        },
        Rule::comment_stmt => CommandDef::Comment {
            text: inner.next().unwrap().as_str().trim().to_string(),
        },
        Rule::plugin_stmt => {
            let command = inner.next().unwrap().as_str().to_string();
            let params = match inner.next() {
                Some(json) => serde_json::from_str(json.as_str()).map_err(|e| {
                    ParseError::BuildError(
                        format!("Invalid parameters for '{}': {}", command, e),
                        Some(pair_to_span(&json, source)),
                    )
                })?,
                None => serde_json::Value::Null,
            };
            CommandDef::Plugin { command, params }
        }
        rule => {
            return Err(ParseError::BuildError(
                format!("Unexpected statement: {:?}", rule),
                Some(span),
            ))
        }
    };

    Ok(entry(def, span))
}

/* ===================== Value Builder ===================== */

/// A literal becomes an inline value, an identifier binds the variable
fn build_operand<T>(pair: Pair<Rule>, source: &str) -> ParseResult<Data<T>>
where
    T: VariableType + Default,
{
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::identifier => Ok(Data::bound(inner.as_str())),
        _ => {
            let span = pair_to_span(&inner, source);
            let value = build_literal(inner, source)?;
            T::from_value(&value).map(Data::literal).ok_or_else(|| {
                ParseError::BuildError(
                    format!("A {} literal is not allowed here", value.value_type().name()),
                    Some(span),
                )
            })
        }
    }
}

fn build_literal(pair: Pair<Rule>, source: &str) -> ParseResult<Value> {
    let inner = pair.into_inner().next().unwrap();
    let span = pair_to_span(&inner, source);

    let value = match inner.as_rule() {
        Rule::vec2 => {
            let mut parts = inner.into_inner();
            let x = build_number(parts.next().unwrap(), source)? as f32;
            let y = build_number(parts.next().unwrap(), source)? as f32;
            Value::Vec2(Vec2 { x, y })
        }
        Rule::vec3 => {
            let mut parts = inner.into_inner();
            let x = build_number(parts.next().unwrap(), source)? as f32;
            let y = build_number(parts.next().unwrap(), source)? as f32;
            let z = build_number(parts.next().unwrap(), source)? as f32;
            Value::Vec3(Vec3 { x, y, z })
        }
        Rule::object_ref => Value::Object(ObjectRef::new(build_string(
            inner.into_inner().next().unwrap(),
        ))),
        Rule::null => Value::Object(ObjectRef::default()),
        Rule::bool => Value::Bool(inner.as_str() == "true"),
        Rule::float => Value::Float(inner.as_str().parse().map_err(|_| {
            ParseError::BuildError(format!("Invalid float: {}", inner.as_str()), Some(span))
        })?),
        Rule::int => Value::Int(inner.as_str().parse().map_err(|_| {
            ParseError::BuildError(
                format!("Integer out of range: {}", inner.as_str()),
                Some(span),
            )
        })?),
        Rule::string => Value::Str(build_string(inner)),
        rule => {
            return Err(ParseError::BuildError(
                format!("Unexpected literal: {:?}", rule),
                Some(span),
            ))
        }
    };
    Ok(value)
}

fn build_number(pair: Pair<Rule>, source: &str) -> ParseResult<f64> {
    pair.as_str().parse().map_err(|_| {
        ParseError::BuildError(
            format!("Invalid number: {}", pair.as_str()),
            Some(pair_to_span(&pair, source)),
        )
    })
}

/// Unescape the contents of a `string` pair
fn build_string(pair: Pair<Rule>) -> String {
    let raw = pair.into_inner().next().map_or("", |p| p.as_str());
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
