//! # Field Module
//!
//! Resolution of textual field references into concrete [`Field`]s.
//!
//! A reference is looked up against an ordered list of [`FromRef`]s (the
//! tables of a query, each with an alias). The grammar, tried in this order:
//!
//! | form               | meaning                                          |
//! |--------------------|--------------------------------------------------|
//! | `name\|page:rows`  | resolve `name`, then attach pagination           |
//! | `from.name:as`     | column of a specific table, with an alias        |
//! | `from.name`        | column of a specific table                       |
//! | `agg(name):as`     | aggregated column with an alias                  |
//! | `agg(name)`        | aggregated column, aliased by the function name  |
//! | `name:as` / `name` | column of the first table                        |
//!
//! `from` matches a table alias first, then a model name. Resolution never
//! fails loudly: an unknown name simply resolves to `None`.

use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::Regex;

use crate::{
    column::{Aggregation, ColumnKind, DataType},
    model::Model,
};

// ============================================================================
// Grammar
// ============================================================================

static PAGE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| build(r"^(\d+):(\d+)$"));
static QUALIFIED_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| build(r"^([A-Za-z0-9_]+)\.([A-Za-z0-9_]+):([A-Za-z0-9_]+)$"));
static QUALIFIED: LazyLock<Regex> = LazyLock::new(|| build(r"^([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)$"));
static AGGREGATE_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| build(r"^([A-Za-z]+)\((.+)\):([A-Za-z0-9_]+)$"));
static AGGREGATE: LazyLock<Regex> = LazyLock::new(|| build(r"^([A-Za-z]+)\((.+)\)$"));
pub(crate) static NAME_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| build(r"^([A-Za-z0-9_]+):([A-Za-z0-9_]+)$"));
pub(crate) static NAME: LazyLock<Regex> = LazyLock::new(|| build(r"^[A-Za-z0-9_]+$"));

fn build(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static field pattern")
}

// ============================================================================
// Field
// ============================================================================

/// A resolved reference to a column, attribute, relation or computed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub kind: ColumnKind,
    pub data_type: DataType,
    /// Alias of the table the field was resolved against.
    pub from: Option<String>,
    /// Name of the owning model.
    pub model: String,
    pub name: String,
    /// Output name.
    pub alias: String,
    /// JSON column holding the value, for attributes.
    pub source: Option<String>,
    pub aggregation: Option<Aggregation>,
    /// Target model, for details and rollups.
    pub to: Option<String>,
    /// Foreign key to parent key, for details and rollups.
    pub keys: IndexMap<String, String>,
    pub select: Vec<String>,
    pub page: usize,
    /// 0 means the configured default.
    pub rows: usize,
}

impl Field {
    pub fn new(model: impl Into<String>, name: impl Into<String>, kind: ColumnKind, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            kind,
            data_type,
            from: None,
            model: model.into(),
            alias: name.clone(),
            name,
            source: None,
            aggregation: None,
            to: None,
            keys: IndexMap::new(),
            select: Vec::new(),
            page: 0,
            rows: 0,
        }
    }

    pub fn with_from(mut self, alias: impl Into<String>) -> Self {
        self.from = Some(alias.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// True for the synthetic `*` column used by `count(*)`.
    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }

    /// Textual form that resolves back to this field against the same tables.
    pub fn key(&self) -> String {
        let base = match &self.from {
            Some(alias) if !self.is_wildcard() => format!("{}.{}", alias, self.name),
            _ => self.name.clone(),
        };

        match self.aggregation {
            Some(agg) => {
                let call = format!("{}({})", agg, base);
                if self.alias == agg.as_str() { call } else { format!("{}:{}", call, self.alias) }
            }
            None if self.alias == self.name => base,
            None => format!("{}:{}", base, self.alias),
        }
    }
}

// ============================================================================
// Field references
// ============================================================================

/// A field reference in one of its resolution states.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    /// Raw text not yet matched to a column.
    Name(String),
    /// An aggregation over a raw name, built programmatically.
    Aggregation { kind: Aggregation, name: String, alias: Option<String> },
    Resolved(Field),
}

impl FieldRef {
    pub fn aggregate(kind: Aggregation, name: impl Into<String>) -> Self {
        FieldRef::Aggregation { kind, name: name.into(), alias: None }
    }

    /// Textual form, used for JSON serialization and re-resolution.
    pub fn key(&self) -> String {
        match self {
            FieldRef::Name(name) => name.clone(),
            FieldRef::Aggregation { kind, name, alias: None } => format!("{}({})", kind, name),
            FieldRef::Aggregation { kind, name, alias: Some(alias) } => format!("{}({}):{}", kind, name, alias),
            FieldRef::Resolved(field) => field.key(),
        }
    }

    pub fn field(&self) -> Option<&Field> {
        match self {
            FieldRef::Resolved(field) => Some(field),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, FieldRef::Resolved(_))
    }

    /// Attempts resolution with `resolver`; leaves the reference untouched on a miss.
    pub fn resolve(&mut self, resolver: impl Fn(&str) -> Option<Field>) -> bool {
        if self.is_resolved() {
            return true;
        }
        match resolver(&self.key()) {
            Some(field) => {
                *self = FieldRef::Resolved(field);
                true
            }
            None => false,
        }
    }
}

impl From<&str> for FieldRef {
    fn from(value: &str) -> Self {
        FieldRef::Name(value.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(value: String) -> Self {
        FieldRef::Name(value)
    }
}

impl From<&String> for FieldRef {
    fn from(value: &String) -> Self {
        FieldRef::Name(value.clone())
    }
}

impl From<Field> for FieldRef {
    fn from(value: Field) -> Self {
        FieldRef::Resolved(value)
    }
}

// ============================================================================
// Tables
// ============================================================================

/// A table taking part in a query.
#[derive(Clone)]
pub struct FromRef {
    pub model: Arc<Model>,
    pub alias: String,
}

impl FromRef {
    pub fn new(model: Arc<Model>, alias: impl Into<String>) -> Self {
        Self { model, alias: alias.into() }
    }

    /// Resolves `name` or `name:as` against this table.
    pub fn find_field(&self, name: &str) -> Option<Field> {
        self.model.find_field(name).map(|field| field.with_from(self.alias.clone()))
    }
}

impl std::fmt::Debug for FromRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} AS {}", self.model.schema, self.model.name, self.alias)
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves a textual reference against the tables of a query.
pub fn find_field(froms: &[FromRef], name: &str) -> Option<Field> {
    let name = name.trim();

    if let Some((head, suffix)) = name.rsplit_once('|') {
        let mut field = find_field(froms, head)?;
        if let Some(caps) = PAGE_SUFFIX.captures(suffix) {
            field.page = caps[1].parse().unwrap_or(field.page);
            field.rows = caps[2].parse().unwrap_or(field.rows);
        }
        return Some(field);
    }

    if let Some(caps) = QUALIFIED_ALIAS.captures(name) {
        return find_qualified(froms, &caps[1], &caps[2]).map(|field| field.with_alias(&caps[3]));
    }

    if let Some(caps) = QUALIFIED.captures(name) {
        return find_qualified(froms, &caps[1], &caps[2]);
    }

    if let Some(caps) = AGGREGATE_ALIAS.captures(name) {
        return find_aggregate(froms, &caps[1], &caps[2], Some(&caps[3]));
    }

    if let Some(caps) = AGGREGATE.captures(name) {
        return find_aggregate(froms, &caps[1], &caps[2], None);
    }

    froms.first()?.find_field(name)
}

fn find_qualified(froms: &[FromRef], from: &str, name: &str) -> Option<Field> {
    froms
        .iter()
        .filter(|f| f.alias == from)
        .chain(froms.iter().filter(|f| f.alias != from && f.model.name == from))
        .find_map(|f| f.find_field(name))
}

fn find_aggregate(froms: &[FromRef], function: &str, inner: &str, alias: Option<&str>) -> Option<Field> {
    let kind = Aggregation::parse(function)?;
    let inner = inner.trim();

    let mut field = if inner == "*" {
        let first = froms.first()?;
        Field::new(first.model.name.clone(), "*", ColumnKind::Column, DataType::Int).with_from(first.alias.clone())
    } else {
        find_field(froms, inner)?
    };

    if !field.kind.is_writable() {
        return None;
    }

    field.aggregation = Some(kind);
    field.alias = alias.unwrap_or(kind.as_str()).to_string();
    Some(field)
}
