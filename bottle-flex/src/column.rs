//! # Column Module
//!
//! Column metadata for schema-driven models: the physical data type, the kind of
//! column (real column, JSON attribute or a virtual relation/computed entry) and
//! the aggregation functions a field reference may carry.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Well-known names
// ============================================================================

/// Default name of the JSON overlay column.
pub const SOURCE: &str = "source";
/// Default primary key column.
pub const ID: &str = "id";
/// Default name of the change-tracking index column.
pub const INDEX: &str = "index";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const STATUS: &str = "status";
pub const PROJECT_ID: &str = "project_id";
/// Status value that moves a tracked record into the recycling bin.
pub const FOR_DELETE: &str = "for_delete";

// ============================================================================
// Data types
// ============================================================================

/// Physical value category of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Any,
    Bytes,
    Int,
    Float,
    Key,
    Text,
    Memo,
    Json,
    DateTime,
    Boolean,
    Geometry,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Any => "any",
            DataType::Bytes => "bytes",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Key => "key",
            DataType::Text => "text",
            DataType::Memo => "memo",
            DataType::Json => "json",
            DataType::DateTime => "datetime",
            DataType::Boolean => "boolean",
            DataType::Geometry => "geometry",
        }
    }

    /// Types stored as JSON documents.
    pub fn is_json(&self) -> bool {
        matches!(self, DataType::Json | DataType::Geometry)
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(DataType::Any),
            "bytes" => Ok(DataType::Bytes),
            "int" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            "key" => Ok(DataType::Key),
            "text" => Ok(DataType::Text),
            "memo" => Ok(DataType::Memo),
            "json" => Ok(DataType::Json),
            "datetime" => Ok(DataType::DateTime),
            "boolean" => Ok(DataType::Boolean),
            "geometry" => Ok(DataType::Geometry),
            other => Err(format!("unknown data type: {}", other)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Column kinds
// ============================================================================

/// How a column is materialized.
///
/// Only `Column` entries exist physically. `Attrib` entries live inside the
/// model's JSON overlay column; the remaining kinds are filled in per row after
/// the main query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    #[default]
    Column,
    Attrib,
    Detail,
    Rollup,
    Relation,
    Calc,
}

impl ColumnKind {
    /// Kinds that a mutation may write.
    pub fn is_writable(&self) -> bool {
        matches!(self, ColumnKind::Column | ColumnKind::Attrib)
    }
}

// ============================================================================
// Aggregations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
    Max,
    Min,
    Exp,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Count => "count",
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
            Aggregation::Exp => "exp",
        }
    }

    /// Parses an aggregation name case-insensitively. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "count" => Some(Aggregation::Count),
            "sum" => Some(Aggregation::Sum),
            "avg" => Some(Aggregation::Avg),
            "max" => Some(Aggregation::Max),
            "min" => Some(Aggregation::Min),
            "exp" => Some(Aggregation::Exp),
            _ => None,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Column
// ============================================================================

/// Metadata for one column of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub kind: ColumnKind,
    #[serde(default)]
    pub data_type: DataType,
    /// Default value; `null` means "use the type default".
    #[serde(default)]
    pub default: Value,
    /// Raw column definition. When present it is emitted verbatim in DDL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    /// Owning JSON column, set for attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind, data_type: DataType) -> Self {
        Self { name: name.into(), kind, data_type, default: Value::Null, definition: None, source: None }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

// ============================================================================
// Relation descriptors
// ============================================================================

/// A one-to-many child collection fetched per row.
///
/// `keys` maps the child's foreign-key column to the parent's column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    pub name: String,
    pub to: String,
    pub keys: IndexMap<String, String>,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub version: i32,
    /// Rows per page when the reference carries no `|page:rows` suffix.
    /// Zero falls back to the database's `detail_rows`.
    #[serde(default)]
    pub rows: usize,
    #[serde(default)]
    pub on_delete_cascade: bool,
    #[serde(default)]
    pub on_update_cascade: bool,
}

/// A foreign key from a detail model to its parent, rendered as a table
/// constraint. `keys` maps the child's column to the parent's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub to: String,
    pub keys: IndexMap<String, String>,
    #[serde(default)]
    pub on_delete_cascade: bool,
    #[serde(default)]
    pub on_update_cascade: bool,
}

/// A single related value or object fetched per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    pub name: String,
    pub from: String,
    pub keys: IndexMap<String, String>,
    #[serde(default)]
    pub select: Vec<String>,
}

/// A join path to another model. Keys map the other model's column to ours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub to: String,
    pub keys: IndexMap<String, String>,
}
