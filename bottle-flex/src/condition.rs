//! # Condition Module
//!
//! Filter predicates and the ordered, connector-joined lists they live in.
//!
//! The JSON form of a condition list is an array of single-key objects:
//!
//! ```json
//! [
//!   {"A.id": {"eq": "u1"}},
//!   {"or": {"A.age": {"more": 18}}}
//! ]
//! ```
//!
//! Only the first key of each object is read.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{Error, field::FieldRef, row::Row};

// ============================================================================
// Operators
// ============================================================================

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neg,
    Less,
    LessEq,
    More,
    MoreEq,
    Like,
    In,
    NotIn,
    Is,
    IsNot,
    Null,
    NotNull,
    Between,
    NotBetween,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neg => "neg",
            Operator::Less => "less",
            Operator::LessEq => "less_eq",
            Operator::More => "more",
            Operator::MoreEq => "more_eq",
            Operator::Like => "like",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Is => "is",
            Operator::IsNot => "is_not",
            Operator::Null => "null",
            Operator::NotNull => "not_null",
            Operator::Between => "between",
            Operator::NotBetween => "not_between",
        }
    }

    /// Parses an operator name. `None` for names it does not know.
    pub fn parse(name: &str) -> Option<Self> {
        let operator = match name.to_lowercase().as_str() {
            "eq" => Operator::Eq,
            "neg" => Operator::Neg,
            "less" => Operator::Less,
            "less_eq" => Operator::LessEq,
            "more" => Operator::More,
            "more_eq" => Operator::MoreEq,
            "like" => Operator::Like,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "is" => Operator::Is,
            "is_not" => Operator::IsNot,
            "null" => Operator::Null,
            "not_null" => Operator::NotNull,
            "between" => Operator::Between,
            "not_between" => Operator::NotBetween,
            _ => return None,
        };
        Some(operator)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a condition joins the one before it. The first condition of a list has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Connector {
    #[default]
    None,
    And,
    Or,
}

impl Connector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connector::None => "",
            Connector::And => "and",
            Connector::Or => "or",
        }
    }
}

// ============================================================================
// Condition
// ============================================================================

/// A single predicate: `field operator value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub connector: Connector,
    pub field: FieldRef,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<FieldRef>, operator: Operator, value: impl Into<Value>) -> Self {
        Self { connector: Connector::None, field: field.into(), operator, value: value.into() }
    }

    /// Marks the condition as AND-joined.
    pub fn and(mut self) -> Self {
        self.connector = Connector::And;
        self
    }

    /// Marks the condition as OR-joined.
    pub fn or(mut self) -> Self {
        self.connector = Connector::Or;
        self
    }

    /// `{field: {op: value}}`, wrapped in `{and|or: ...}` when a connector is set.
    pub fn to_json(&self) -> Value {
        let mut predicate = Map::new();
        predicate.insert(self.operator.as_str().to_string(), self.value.clone());

        let mut body = Map::new();
        body.insert(self.field.key(), Value::Object(predicate));

        match self.connector {
            Connector::None => Value::Object(body),
            connector => {
                let mut wrapper = Map::new();
                wrapper.insert(connector.as_str().to_string(), Value::Object(body));
                Value::Object(wrapper)
            }
        }
    }

    /// Decodes one condition object. Returns `None` for empty or non-object
    /// input and for unknown operators.
    pub fn from_json(value: &Value) -> Option<Self> {
        let (key, body) = value.as_object()?.iter().next()?;

        let (connector, key, body) = match key.to_lowercase().as_str() {
            "and" | "or" => {
                let connector = if key.eq_ignore_ascii_case("and") { Connector::And } else { Connector::Or };
                let (inner_key, inner_body) = body.as_object()?.iter().next()?;
                (connector, inner_key, inner_body)
            }
            _ => (Connector::None, key, body),
        };

        let (operator, value) = match body {
            Value::Object(predicate) => {
                let (op, value) = predicate.iter().next()?;
                let Some(operator) = Operator::parse(op) else {
                    log::warn!("unknown operator {} on {}", op, key);
                    return None;
                };
                (operator, value.clone())
            }
            other => (Operator::Eq, other.clone()),
        };

        Some(Self { connector, field: FieldRef::Name(key.clone()), operator, value })
    }
}

// ============================================================================
// Constructors
// ============================================================================

pub fn eq(field: impl Into<FieldRef>, value: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::Eq, value)
}

pub fn neg(field: impl Into<FieldRef>, value: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::Neg, value)
}

pub fn less(field: impl Into<FieldRef>, value: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::Less, value)
}

pub fn less_eq(field: impl Into<FieldRef>, value: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::LessEq, value)
}

pub fn more(field: impl Into<FieldRef>, value: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::More, value)
}

pub fn more_eq(field: impl Into<FieldRef>, value: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::MoreEq, value)
}

pub fn like(field: impl Into<FieldRef>, pattern: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::Like, pattern)
}

pub fn in_list<V: Into<Value>>(field: impl Into<FieldRef>, values: impl IntoIterator<Item = V>) -> Condition {
    Condition::new(field, Operator::In, Value::Array(values.into_iter().map(Into::into).collect()))
}

pub fn not_in<V: Into<Value>>(field: impl Into<FieldRef>, values: impl IntoIterator<Item = V>) -> Condition {
    Condition::new(field, Operator::NotIn, Value::Array(values.into_iter().map(Into::into).collect()))
}

pub fn is(field: impl Into<FieldRef>, value: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::Is, value)
}

pub fn is_not(field: impl Into<FieldRef>, value: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::IsNot, value)
}

pub fn null(field: impl Into<FieldRef>) -> Condition {
    Condition::new(field, Operator::Null, Value::Null)
}

pub fn not_null(field: impl Into<FieldRef>) -> Condition {
    Condition::new(field, Operator::NotNull, Value::Null)
}

pub fn between(field: impl Into<FieldRef>, from: impl Into<Value>, to: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::Between, Value::Array(vec![from.into(), to.into()]))
}

pub fn not_between(field: impl Into<FieldRef>, from: impl Into<Value>, to: impl Into<Value>) -> Condition {
    Condition::new(field, Operator::NotBetween, Value::Array(vec![from.into(), to.into()]))
}

// ============================================================================
// Wheres
// ============================================================================

/// An ordered list of conditions.
///
/// The first condition never carries a connector; any later condition added
/// without one is AND-joined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wheres {
    conditions: Vec<Condition>,
}

impl Wheres {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mut condition: Condition) -> &mut Self {
        if self.conditions.is_empty() {
            condition.connector = Connector::None;
        } else if condition.connector == Connector::None {
            condition.connector = Connector::And;
        }
        self.conditions.push(condition);
        self
    }

    pub fn and(&mut self, condition: Condition) -> &mut Self {
        self.add(condition.and())
    }

    pub fn or(&mut self, condition: Condition) -> &mut Self {
        self.add(condition.or())
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.conditions.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Condition> {
        self.conditions.iter_mut()
    }

    /// Names of conditions whose field could not be resolved.
    pub fn unresolved(&self) -> Vec<String> {
        self.conditions.iter().filter(|c| !c.field.is_resolved()).map(|c| c.field.key()).collect()
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.conditions.iter().map(Condition::to_json).collect())
    }

    /// Decodes an array of condition objects, or a single condition object.
    ///
    /// Fields come back unresolved; the owner resolves them when adopting the list.
    pub fn from_json(value: &Value) -> Result<Self, Error> {
        let mut wheres = Wheres::new();
        let items = match value {
            Value::Null => return Ok(wheres),
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            Value::Object(_) => vec![value],
            other => return Err(Error::InvalidCondition(other.to_string())),
        };

        for item in items {
            let condition = Condition::from_json(item).ok_or_else(|| Error::InvalidCondition(item.to_string()))?;
            wheres.add(condition);
        }
        Ok(wheres)
    }

    /// `fk = data[pk]` for each key pair. `None` when `data` lacks one of the
    /// `pk` columns.
    pub fn by_keys(data: &Row, keys: &IndexMap<String, String>) -> Option<Self> {
        let mut wheres = Wheres::new();
        for (fk, pk) in keys {
            wheres.add(eq(fk.as_str(), data.get(pk)?.clone()));
        }
        Some(wheres)
    }
}

impl IntoIterator for Wheres {
    type Item = Condition;
    type IntoIter = std::vec::IntoIter<Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.into_iter()
    }
}

impl<'a> IntoIterator for &'a Wheres {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}
