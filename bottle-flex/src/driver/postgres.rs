//! # Postgres Driver
//!
//! Renders models, mutations and queries as PostgreSQL text.
//!
//! Values are inlined as escaped literals: strings are single-quoted with
//! quotes doubled, JSON values are serialized and cast to `jsonb`, bytes are
//! hex-escaped. Identifiers come from model metadata and the field grammar,
//! which only admits `[A-Za-z0-9_]`.
//!
//! Flexible attributes live in the model's source column:
//!
//! - insert packs them into one `jsonb` literal;
//! - update chains one `jsonb_set` per attribute over `COALESCE(source, '{}')`;
//! - read merges the document under the columns, then drops the raw column.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    Error,
    column::{self, Aggregation, ColumnKind, DataType},
    command::{CommandKind, Mutation},
    condition::{Condition, Connector, Operator, Wheres},
    database::{Config, Connection},
    driver::{Driver, executor::PgExecutor},
    field::{Field, NAME},
    model::Model,
    query::{JoinKind, Ql, QueryKind},
};

/// `jsonb_build_object` accepts at most 100 arguments.
const MAX_OBJECT_PAIRS: usize = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(&self, config: &Config) -> Result<Arc<dyn Connection>, Error> {
        Ok(Arc::new(PgExecutor::connect(config).await?))
    }

    fn render_ddl(&self, model: &Model, use_core: bool) -> Result<String, Error> {
        render_ddl(model, use_core)
    }

    fn render_table_exists(&self, model: &Model) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_schema = {} AND table_name = {}) AS exists;",
            quote_text(&model.schema),
            quote_text(&model.name)
        )
    }

    fn render_core(&self) -> String {
        render_core()
    }

    fn render_mutation(&self, mutation: &Mutation<'_>) -> Result<String, Error> {
        match mutation.kind {
            CommandKind::Insert => render_insert(mutation),
            CommandKind::Update => render_update(mutation),
            CommandKind::Delete => render_delete(mutation),
            CommandKind::Upsert => Err(Error::InvalidCommand("upsert renders as insert or update".to_string())),
        }
    }

    fn render_query(&self, ql: &Ql) -> Result<String, Error> {
        render_query(ql)
    }
}

// ============================================================================
// Literals
// ============================================================================

/// `'text'` with embedded quotes doubled.
pub fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// A JSON value as a `jsonb` literal.
pub fn jsonb_literal(value: &Value) -> String {
    format!("{}::jsonb", quote_text(&value.to_string()))
}

/// A value as a SQL literal for a column of `data_type`.
pub fn quoted(value: &Value, data_type: DataType) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if data_type == DataType::Bytes => bytes_literal(s.as_bytes()),
        Value::String(s) => quote_text(s),
        Value::Array(items) if data_type == DataType::Bytes => {
            let bytes: Option<Vec<u8>> = items.iter().map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok())).collect();
            match bytes {
                Some(bytes) => bytes_literal(&bytes),
                None => jsonb_literal(value),
            }
        }
        Value::Array(_) | Value::Object(_) if data_type.is_json() || data_type == DataType::Any => jsonb_literal(value),
        Value::Array(_) | Value::Object(_) => quote_text(&value.to_string()),
    }
}

fn bytes_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(4 + bytes.len() * 2);
    out.push_str("'\\x");
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out.push('\'');
    out
}

// ============================================================================
// DDL
// ============================================================================

fn sql_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Any => "VARCHAR(250)",
        DataType::Bytes => "BYTEA",
        DataType::Int => "BIGINT",
        DataType::Float => "DOUBLE PRECISION",
        DataType::Key => "VARCHAR(80)",
        DataType::Text => "VARCHAR(250)",
        DataType::Memo => "TEXT",
        DataType::Json => "JSONB",
        DataType::DateTime => "TIMESTAMP",
        DataType::Boolean => "BOOLEAN",
        DataType::Geometry => "JSONB",
    }
}

/// `None` for `any`, which has no type default.
fn sql_default(data_type: DataType, default: &Value) -> Option<String> {
    if !default.is_null() {
        return Some(quoted(default, data_type));
    }
    let default = match data_type {
        DataType::Any => return None,
        DataType::Bytes => "''",
        DataType::Int => "0",
        DataType::Float => "0.0",
        DataType::Key | DataType::Text | DataType::Memo => "''",
        DataType::Json | DataType::Geometry => "'{}'",
        DataType::DateTime => "NOW()",
        DataType::Boolean => "FALSE",
    };
    Some(default.to_string())
}

fn render_ddl(model: &Model, use_core: bool) -> Result<String, Error> {
    if model.name.is_empty() || model.schema.is_empty() {
        return Err(Error::NameRequired);
    }

    let table = model.table();
    let mut definitions: Vec<String> = model
        .physical_columns()
        .map(|c| match &c.definition {
            Some(definition) => format!("{} {}", c.name, definition),
            None => match sql_default(c.data_type, &c.default) {
                Some(default) => format!("{} {} DEFAULT {}", c.name, sql_type(c.data_type), default),
                None => format!("{} {}", c.name, sql_type(c.data_type)),
            },
        })
        .collect();
    if definitions.is_empty() {
        return Err(Error::InvalidCommand(format!("model {} has no columns", table)));
    }
    if !model.primary_keys.is_empty() {
        definitions.push(format!(
            "CONSTRAINT pk_{}_{} PRIMARY KEY ({})",
            model.schema,
            model.name,
            model.primary_keys.join(", ")
        ));
    }
    for fk in &model.foreign_keys {
        let columns: Vec<&str> = fk.keys.keys().map(String::as_str).collect();
        let references: Vec<&str> = fk.keys.values().map(String::as_str).collect();
        let mut constraint = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
            fk.name,
            columns.join(", "),
            fk.to,
            references.join(", ")
        );
        if fk.on_delete_cascade {
            constraint.push_str(" ON DELETE CASCADE");
        }
        if fk.on_update_cascade {
            constraint.push_str(" ON UPDATE CASCADE");
        }
        definitions.push(constraint);
    }

    let mut sql = vec![
        format!("CREATE SCHEMA IF NOT EXISTS {};", model.schema),
        format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n);", table, definitions.join(",\n")),
    ];

    for name in &model.indexes {
        if model.unique.contains(name) || model.primary_keys.contains(name) {
            continue;
        }
        let using = if model.source_field.as_deref() == Some(name.as_str()) { " USING GIN" } else { "" };
        sql.push(format!("CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}{}({});", model.name, name, table, using, name));
    }

    for name in &model.unique {
        if model.primary_keys.len() == 1 && model.primary_keys.contains(name) {
            continue;
        }
        sql.push(format!("CREATE UNIQUE INDEX IF NOT EXISTS unique_{}_{} ON {}({});", model.name, name, table, name));
    }

    if use_core && !model.is_core {
        if let Some(index) = &model.index_field {
            sql.push(format!("DROP TRIGGER IF EXISTS records_set ON {} CASCADE;", table));
            sql.push(format!(
                "CREATE TRIGGER records_set\nAFTER INSERT OR UPDATE OR DELETE ON {}\nFOR EACH ROW\nEXECUTE FUNCTION core.after_records('{}');",
                table, index
            ));
        }
    }

    Ok(sql.join("\n"))
}

/// Tables and trigger functions tracking which records exist per table.
///
/// `core.after_records(index_column)` keeps `core.records` in sync with every
/// tracked table and moves records whose status turns `for_delete` into
/// `core.recyclings`.
fn render_core() -> String {
    let status = column::STATUS;
    let for_delete = column::FOR_DELETE;
    format!(
        r#"CREATE SCHEMA IF NOT EXISTS core;
CREATE TABLE IF NOT EXISTS core.tables (
created_at TIMESTAMP DEFAULT NOW(),
updated_at TIMESTAMP DEFAULT NOW(),
table_schema VARCHAR(250) DEFAULT '',
table_name VARCHAR(250) DEFAULT '',
total BIGINT DEFAULT 0,
CONSTRAINT pk_core_tables PRIMARY KEY (table_schema, table_name)
);
CREATE TABLE IF NOT EXISTS core.records (
created_at TIMESTAMP DEFAULT NOW(),
updated_at TIMESTAMP DEFAULT NOW(),
table_schema VARCHAR(250) DEFAULT '',
table_name VARCHAR(250) DEFAULT '',
record_id VARCHAR(80) DEFAULT '',
CONSTRAINT pk_core_records PRIMARY KEY (table_schema, table_name, record_id)
);
CREATE TABLE IF NOT EXISTS core.recyclings (
created_at TIMESTAMP DEFAULT NOW(),
table_schema VARCHAR(250) DEFAULT '',
table_name VARCHAR(250) DEFAULT '',
record_id VARCHAR(80) DEFAULT '',
CONSTRAINT pk_core_recyclings PRIMARY KEY (table_schema, table_name, record_id)
);
CREATE OR REPLACE FUNCTION core.count_tables()
RETURNS TRIGGER AS $$
BEGIN
  IF TG_OP = 'INSERT' THEN
    INSERT INTO core.tables AS t (table_schema, table_name, total)
    VALUES (NEW.table_schema, NEW.table_name, 1)
    ON CONFLICT (table_schema, table_name) DO UPDATE
    SET total = t.total + 1, updated_at = NOW();
    RETURN NEW;
  END IF;
  UPDATE core.tables
  SET total = total - 1, updated_at = NOW()
  WHERE table_schema = OLD.table_schema AND table_name = OLD.table_name;
  RETURN OLD;
END;
$$ LANGUAGE plpgsql;
DROP TRIGGER IF EXISTS records_count ON core.records CASCADE;
CREATE TRIGGER records_count
AFTER INSERT OR DELETE ON core.records
FOR EACH ROW
EXECUTE FUNCTION core.count_tables();
CREATE OR REPLACE FUNCTION core.after_records()
RETURNS TRIGGER AS $$
DECLARE
  index_column TEXT := TG_ARGV[0];
  vnew JSONB := CASE WHEN TG_OP = 'DELETE' THEN '{{}}'::jsonb ELSE to_jsonb(NEW) END;
  vold JSONB := CASE WHEN TG_OP = 'INSERT' THEN '{{}}'::jsonb ELSE to_jsonb(OLD) END;
BEGIN
  IF TG_OP = 'INSERT' AND vnew ? index_column THEN
    INSERT INTO core.records (table_schema, table_name, record_id)
    VALUES (TG_TABLE_SCHEMA, TG_TABLE_NAME, vnew->>index_column)
    ON CONFLICT DO NOTHING;
  ELSIF TG_OP = 'UPDATE' AND vnew ? index_column THEN
    UPDATE core.records SET updated_at = NOW()
    WHERE table_schema = TG_TABLE_SCHEMA AND table_name = TG_TABLE_NAME AND record_id = vnew->>index_column;
    IF vnew->>'{status}' IS DISTINCT FROM vold->>'{status}' THEN
      IF vnew->>'{status}' = '{for_delete}' THEN
        INSERT INTO core.recyclings (table_schema, table_name, record_id)
        VALUES (TG_TABLE_SCHEMA, TG_TABLE_NAME, vnew->>index_column)
        ON CONFLICT DO NOTHING;
      ELSE
        DELETE FROM core.recyclings
        WHERE table_schema = TG_TABLE_SCHEMA AND table_name = TG_TABLE_NAME AND record_id = vnew->>index_column;
      END IF;
    END IF;
  ELSIF TG_OP = 'DELETE' AND vold ? index_column THEN
    DELETE FROM core.records
    WHERE table_schema = TG_TABLE_SCHEMA AND table_name = TG_TABLE_NAME AND record_id = vold->>index_column;
    DELETE FROM core.recyclings
    WHERE table_schema = TG_TABLE_SCHEMA AND table_name = TG_TABLE_NAME AND record_id = vold->>index_column;
  END IF;
  IF TG_OP = 'DELETE' THEN
    RETURN OLD;
  END IF;
  RETURN NEW;
END;
$$ LANGUAGE plpgsql;"#
    )
}

// ============================================================================
// Expressions
// ============================================================================

fn prefix(field: &Field) -> String {
    match &field.from {
        Some(alias) => format!("{}.", alias),
        None => String::new(),
    }
}

/// The value expression of a field. Attributes read as `jsonb` unless `text`.
fn value_expr(field: &Field, text: bool) -> String {
    match field.kind {
        ColumnKind::Attrib => {
            let source = field.source.as_deref().unwrap_or(column::SOURCE);
            let arrow = if text { "->>" } else { "->" };
            format!("{}{}{}{}", prefix(field), source, arrow, quote_text(&field.name))
        }
        _ if field.is_wildcard() => "*".to_string(),
        _ => format!("{}{}", prefix(field), field.name),
    }
}

/// The full expression of a field, aggregation included.
fn field_expr(field: &Field) -> String {
    let attrib = field.kind == ColumnKind::Attrib;
    match field.aggregation {
        None => value_expr(field, false),
        Some(Aggregation::Count) => format!("COUNT({})", value_expr(field, false)),
        Some(kind @ (Aggregation::Sum | Aggregation::Avg)) => {
            let inner = if attrib { format!("({})::numeric", value_expr(field, true)) } else { value_expr(field, false) };
            format!("{}({})", kind.as_str().to_uppercase(), inner)
        }
        Some(kind @ (Aggregation::Max | Aggregation::Min)) => {
            format!("{}({})", kind.as_str().to_uppercase(), value_expr(field, attrib))
        }
        Some(Aggregation::Exp) => value_expr(field, attrib),
    }
}

fn select_item(field: &Field) -> String {
    let expr = field_expr(field);
    if field.aggregation.is_none() && field.kind == ColumnKind::Column && field.alias == field.name {
        expr
    } else {
        format!("{} AS {}", expr, field.alias)
    }
}

/// `jsonb_build_object(...)`, split into `||`-joined chunks when needed.
fn build_object(pairs: &[(String, String)]) -> String {
    pairs
        .chunks(MAX_OBJECT_PAIRS)
        .map(|chunk| {
            let args: Vec<String> = chunk.iter().map(|(key, expr)| format!("{}, {}", quote_text(key), expr)).collect();
            format!("jsonb_build_object({})", args.join(", "))
        })
        .collect::<Vec<_>>()
        .join(" || ")
}

// ============================================================================
// Conditions
// ============================================================================

fn render_condition(condition: &Condition) -> Result<String, Error> {
    let field = condition.field.field().ok_or_else(|| Error::UnresolvedField(condition.field.key()))?;
    let jsonb = field.kind == ColumnKind::Attrib && field.aggregation.is_none();
    let lhs = if condition.operator == Operator::Like && jsonb { value_expr(field, true) } else { field_expr(field) };
    let literal = |value: &Value| if jsonb { jsonb_literal(value) } else { quoted(value, field.data_type) };
    let value = &condition.value;

    let sql = match condition.operator {
        Operator::Eq if value.is_null() => format!("{} IS NULL", lhs),
        Operator::Neg if value.is_null() => format!("{} IS NOT NULL", lhs),
        Operator::Eq => format!("{} = {}", lhs, literal(value)),
        Operator::Neg => format!("{} != {}", lhs, literal(value)),
        Operator::Less => format!("{} < {}", lhs, literal(value)),
        Operator::LessEq => format!("{} <= {}", lhs, literal(value)),
        Operator::More => format!("{} > {}", lhs, literal(value)),
        Operator::MoreEq => format!("{} >= {}", lhs, literal(value)),
        Operator::Like => {
            let pattern = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{} LIKE {}", lhs, quote_text(&pattern))
        }
        Operator::In | Operator::NotIn => {
            let items = match value {
                Value::Array(items) => items.iter().map(literal).collect::<Vec<_>>(),
                other => vec![literal(other)],
            };
            let list = if items.is_empty() { "NULL".to_string() } else { items.join(", ") };
            let op = if condition.operator == Operator::In { "IN" } else { "NOT IN" };
            format!("{} {} ({})", lhs, op, list)
        }
        Operator::Is | Operator::IsNot => {
            let op = if condition.operator == Operator::Is { "IS" } else { "IS NOT" };
            match value {
                Value::Null => format!("{} {} NULL", lhs, op),
                Value::Bool(b) => {
                    let lhs = if jsonb { format!("({})::boolean", value_expr(field, true)) } else { lhs };
                    format!("{} {} {}", lhs, op, if *b { "TRUE" } else { "FALSE" })
                }
                other => return Err(Error::InvalidCondition(format!("{} {} {}", condition.field.key(), op, other))),
            }
        }
        Operator::Null => format!("{} IS NULL", lhs),
        Operator::NotNull => format!("{} IS NOT NULL", lhs),
        Operator::Between | Operator::NotBetween => {
            let (from, to) = match value.as_array().map(Vec::as_slice) {
                Some([from, to]) => (from, to),
                _ => {
                    return Err(Error::InvalidCondition(format!(
                        "{} {} expects [from, to], got {}",
                        condition.field.key(),
                        condition.operator,
                        value
                    )));
                }
            };
            let op = if condition.operator == Operator::Between { "BETWEEN" } else { "NOT BETWEEN" };
            format!("{} {} {} AND {}", lhs, op, literal(from), literal(to))
        }
    };
    Ok(sql)
}

fn render_wheres(wheres: &Wheres) -> Result<String, Error> {
    let mut sql = String::new();
    for (idx, condition) in wheres.iter().enumerate() {
        let rendered = render_condition(condition)?;
        if idx == 0 {
            sql.push_str(&rendered);
            continue;
        }
        let connector = match condition.connector {
            Connector::Or => "OR",
            Connector::And | Connector::None => "AND",
        };
        sql.push_str(&format!("\n{} {}", connector, rendered));
    }
    Ok(sql)
}

// ============================================================================
// Queries
// ============================================================================

fn merged_row(model: &Model, alias: &str) -> String {
    match &model.source_field {
        Some(source) => format!("(COALESCE({alias}.{source}, '{{}}'::jsonb) || to_jsonb({alias}))"),
        None => format!("to_jsonb({})", alias),
    }
}

fn text_array(names: &[String]) -> String {
    let items: Vec<String> = names.iter().map(|n| quote_text(n)).collect();
    format!("ARRAY[{}]::text[]", items.join(", "))
}

fn select_projection(ql: &Ql) -> Result<String, Error> {
    if !ql.selects.is_empty() {
        return Ok(ql.selects.iter().map(select_item).collect::<Vec<_>>().join(", "));
    }

    let main = ql.froms.first().ok_or(Error::FromRequired)?;
    let columns: Vec<String> = main
        .model
        .physical_columns()
        .filter(|c| !ql.hidden.iter().any(|h| h.alias == c.name && h.from.as_deref() == Some(main.alias.as_str())))
        .map(|c| format!("{}.{}", main.alias, c.name))
        .collect();

    if columns.is_empty() { Ok(format!("{}.*", main.alias)) } else { Ok(columns.join(", ")) }
}

fn data_projection(ql: &Ql) -> Result<String, Error> {
    let main = ql.froms.first().ok_or(Error::FromRequired)?;

    if ql.selects.is_empty() {
        let mut removed: Vec<String> = main.model.source_field.iter().cloned().collect();
        for hidden in &ql.hidden {
            if hidden.from.as_deref() == Some(main.alias.as_str()) && !removed.contains(&hidden.alias) {
                removed.push(hidden.alias.clone());
            }
        }
        let merged = merged_row(&main.model, &main.alias);
        return Ok(if removed.is_empty() {
            format!("{} AS result", merged)
        } else {
            format!("{} - {} AS result", merged, text_array(&removed))
        });
    }

    let mut columns = Vec::new();
    let mut attributes = Vec::new();
    for field in &ql.selects {
        let pair = (field.alias.clone(), field_expr(field));
        if field.kind == ColumnKind::Attrib && field.aggregation.is_none() {
            attributes.push(pair);
        } else {
            columns.push(pair);
        }
    }

    let object = match (attributes.is_empty(), columns.is_empty()) {
        (false, false) => format!("{} || {}", build_object(&attributes), build_object(&columns)),
        (false, true) => build_object(&attributes),
        _ => build_object(&columns),
    };
    Ok(format!("{} AS result", object))
}

fn join_keyword(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::Inner => "INNER JOIN",
        JoinKind::Left => "LEFT JOIN",
        JoinKind::Right => "RIGHT JOIN",
        JoinKind::Full => "FULL JOIN",
    }
}

/// FROM, JOIN, WHERE, GROUP BY and HAVING clauses.
fn render_body(ql: &Ql) -> Result<Vec<String>, Error> {
    if ql.froms.is_empty() {
        return Err(Error::FromRequired);
    }
    // Aliases are spliced into the statement text.
    for alias in ql.froms.iter().chain(ql.joins.iter().map(|j| &j.from)).map(|f| &f.alias) {
        if !NAME.is_match(alias) {
            return Err(Error::InvalidName(alias.clone()));
        }
    }

    let froms: Vec<String> = ql.froms.iter().map(|f| format!("{} AS {}", f.model.table(), f.alias)).collect();
    let mut lines = vec![format!("FROM {}", froms.join(", "))];

    for join in &ql.joins {
        let mut line = format!("{} {} AS {}", join_keyword(join.kind), join.from.model.table(), join.from.alias);
        if join.on.is_empty() {
            line.push_str(" ON TRUE");
        } else {
            let keys: Vec<String> =
                join.on.iter().map(|(theirs, ours)| format!("{} = {}", value_expr(theirs, false), value_expr(ours, false))).collect();
            line.push_str(&format!(" ON {}", keys.join(" AND ")));
        }
        lines.push(line);
    }

    if !ql.wheres.is_empty() {
        lines.push(format!("WHERE {}", render_wheres(&ql.wheres)?));
    }

    if !ql.group_by.is_empty() {
        let fields: Vec<String> = ql.group_by.iter().map(field_expr).collect();
        lines.push(format!("GROUP BY {}", fields.join(", ")));
    }

    if !ql.having.is_empty() {
        lines.push(format!("HAVING {}", render_wheres(&ql.having)?));
    }

    Ok(lines)
}

fn render_query(ql: &Ql) -> Result<String, Error> {
    let body = render_body(ql)?;

    let mut lines = match ql.kind {
        QueryKind::Exists => {
            return Ok(format!("SELECT EXISTS(SELECT 1\n{}) AS exists;", body.join("\n")));
        }
        QueryKind::Count => return Ok(format!("SELECT COUNT(*) AS count\n{};", body.join("\n"))),
        QueryKind::Select => vec![format!("SELECT {}", select_projection(ql)?)],
        QueryKind::Data => vec![format!("SELECT {}", data_projection(ql)?)],
    };
    lines.extend(body);

    if !ql.order_by.is_empty() {
        let items: Vec<String> = ql
            .order_by
            .iter()
            .map(|o| format!("{} {}", field_expr(&o.field), if o.desc { "DESC" } else { "ASC" }))
            .collect();
        lines.push(format!("ORDER BY {}", items.join(", ")));
    }

    if let Some(pagination) = &ql.pagination {
        lines.push(pagination.to_sql());
    }

    Ok(format!("{};", lines.join("\n")))
}

// ============================================================================
// Mutations
// ============================================================================

const ALIAS: &str = "A";

fn returning(model: &Model) -> String {
    match &model.source_field {
        Some(source) => format!("RETURNING to_jsonb({}) - {} AS result", ALIAS, quote_text(source)),
        None => format!("RETURNING to_jsonb({}) AS result", ALIAS),
    }
}

/// Splits `new` into physical column assignments and overlay attributes.
fn split_values(model: &Model, new: &Map<String, Value>) -> (Vec<(String, String)>, Map<String, Value>) {
    let mut columns = Vec::new();
    let mut attributes = Map::new();

    for (key, value) in new {
        if model.source_field.as_deref() == Some(key.as_str()) {
            if let Value::Object(inner) = value {
                attributes.extend(inner.clone());
            }
            continue;
        }

        match model.find_column(key) {
            Some(column) if column.kind == ColumnKind::Column => {
                columns.push((key.clone(), quoted(value, column.data_type)));
            }
            Some(column) if column.kind == ColumnKind::Attrib => {
                attributes.insert(key.clone(), value.clone());
            }
            _ => log::warn!("{} is not writable on {}, ignored", key, model.table()),
        }
    }

    (columns, attributes)
}

fn render_insert(mutation: &Mutation<'_>) -> Result<String, Error> {
    let model = mutation.model;
    let (mut columns, attributes) = split_values(model, mutation.new);

    if !attributes.is_empty() {
        if let Some(source) = &model.source_field {
            columns.push((source.clone(), jsonb_literal(&Value::Object(attributes))));
        }
    }

    if columns.is_empty() {
        return Ok(format!("INSERT INTO {} AS {} DEFAULT VALUES\n{};", model.table(), ALIAS, returning(model)));
    }

    let (names, values): (Vec<String>, Vec<String>) = columns.into_iter().unzip();
    Ok(format!(
        "INSERT INTO {} AS {} ({})\nVALUES ({})\n{};",
        model.table(),
        ALIAS,
        names.join(", "),
        values.join(", "),
        returning(model)
    ))
}

fn render_update(mutation: &Mutation<'_>) -> Result<String, Error> {
    let model = mutation.model;
    let (columns, attributes) = split_values(model, mutation.new);

    let mut sets: Vec<String> = columns.into_iter().map(|(name, value)| format!("{} = {}", name, value)).collect();
    if let (Some(source), false) = (&model.source_field, attributes.is_empty()) {
        let mut expr = format!("COALESCE({}.{}, '{{}}'::jsonb)", ALIAS, source);
        for (key, value) in &attributes {
            expr = format!("jsonb_set({}, {}, {}, true)", expr, quote_text(&format!("{{{}}}", key)), jsonb_literal(value));
        }
        sets.push(format!("{} = {}", source, expr));
    }

    if sets.is_empty() {
        return Err(Error::DataRequired);
    }

    let mut sql = format!("UPDATE {} AS {} SET\n{}", model.table(), ALIAS, sets.join(",\n"));
    if !mutation.wheres.is_empty() {
        sql.push_str(&format!("\nWHERE {}", render_wheres(mutation.wheres)?));
    }
    Ok(format!("{}\n{};", sql, returning(model)))
}

fn render_delete(mutation: &Mutation<'_>) -> Result<String, Error> {
    let model = mutation.model;
    let mut sql = format!("DELETE FROM {} AS {}", model.table(), ALIAS);
    if !mutation.wheres.is_empty() {
        sql.push_str(&format!("\nWHERE {}", render_wheres(mutation.wheres)?));
    }
    Ok(format!("{}\n{};", sql, returning(model)))
}
