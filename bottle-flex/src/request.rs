//! # Request Module
//!
//! JSON entry points: define models from JSON definitions and run queries and
//! commands described as JSON documents.
//!
//! A request names its model in `from`, either as a string or as an object
//! `{"<model>": "<alias>"}`:
//!
//! ```json
//! {
//!   "from": {"users": "U"},
//!   "select": ["U.name", "count(U.id):total"],
//!   "where": [{"U.status": {"eq": "active"}}],
//!   "group_by": ["U.name"],
//!   "order_by": ["U.name"],
//!   "page": 1,
//!   "rows": 20
//! }
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
    Error,
    column::{Column, ColumnKind, DataType},
    command::{Cmd, CommandKind},
    condition::Wheres,
    database::Database,
    field::NAME,
    model::Model,
    query::{JoinKind, Ql},
    row::Row,
};

impl Database {
    // ------------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------------

    /// Builds a model from a JSON definition and registers it, along with the
    /// child models of its details. With `"build": true` the models are also
    /// loaded, creating their tables when missing.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let users = db.define(&json!({
    ///     "schema": "app",
    ///     "name": "users",
    ///     "columns": [
    ///         {"name": "id", "data_type": "key"},
    ///         {"name": "name", "data_type": "text"}
    ///     ],
    ///     "source": "source",
    ///     "primary_keys": ["id"],
    ///     "build": true
    /// })).await?;
    /// ```
    pub async fn define(&self, definition: &Value) -> Result<Arc<Model>, Error> {
        let (model, children) = model_from_json(definition)?;
        let build = definition.get("build").and_then(Value::as_bool).unwrap_or(false);

        if !build {
            for child in children {
                self.register(child);
            }
            return Ok(self.register(model));
        }

        // Parent first: cascading details reference its table.
        let model = self.load(model).await?;
        for child in children {
            self.load(child).await?;
        }
        Ok(model)
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Dispatches on `"command"`: `select` (default), `insert`, `update`,
    /// `delete` or `upsert`.
    pub async fn query_json(&self, request: &Value) -> Result<Vec<Row>, Error> {
        let command = request.get("command").and_then(Value::as_str).unwrap_or("select");
        match command.to_lowercase().as_str() {
            "select" | "query" => self.select_json(request).await,
            "insert" => self.insert_json(request).await,
            "update" => self.update_json(request).await,
            "delete" => self.delete_json(request).await,
            "upsert" => self.upsert_json(request).await,
            other => Err(Error::InvalidCommand(other.to_string())),
        }
    }

    pub async fn select_json(&self, request: &Value) -> Result<Vec<Row>, Error> {
        self.ql_from_json(request)?.all().await
    }

    /// Builds the query a select request describes, without running it.
    pub fn ql_from_json(&self, request: &Value) -> Result<Ql, Error> {
        let (model, alias) = self.request_from(request)?;
        let mut ql = self.from(&model, &alias);

        if let Some(joins) = request.get("joins").and_then(Value::as_array) {
            for join in joins {
                ql = self.join_from_json(ql, join)?;
            }
        }

        let select = strings(request, "select");
        if !select.is_empty() {
            ql = ql.select(&as_strs(&select));
        }
        if let Some(where_) = request.get("where") {
            ql = ql.filter_json(where_)?;
        }
        ql = ql.group_by(&as_strs(&strings(request, "group_by")));
        if let Some(having) = request.get("having") {
            for condition in Wheres::from_json(having)? {
                ql = ql.having(condition);
            }
        }
        ql = ql.order_by(&as_strs(&strings(request, "order_by")));
        ql = ql.order_by_desc(&as_strs(&strings(request, "order_by_desc")));
        ql = ql.hidden(&as_strs(&strings(request, "hidden")));

        if let Some(page) = request.get("page").and_then(Value::as_u64) {
            ql = ql.page(page as usize);
        }
        if let Some(rows) = request.get("rows").and_then(Value::as_u64) {
            ql = ql.rows(rows as usize);
        }
        if request.get("debug").and_then(Value::as_bool).unwrap_or(false) {
            ql = ql.debug();
        }
        Ok(ql)
    }

    pub async fn insert_json(&self, request: &Value) -> Result<Vec<Row>, Error> {
        let cmd = self.cmd_from_json(request, CommandKind::Insert)?;
        cmd.exec().await
    }

    /// Requires both `data` and `where`.
    pub async fn update_json(&self, request: &Value) -> Result<Vec<Row>, Error> {
        require_where(request)?;
        let cmd = self.cmd_from_json(request, CommandKind::Update)?;
        cmd.exec().await
    }

    /// Requires `where`.
    pub async fn delete_json(&self, request: &Value) -> Result<Vec<Row>, Error> {
        require_where(request)?;
        let (model, _) = self.request_from(request)?;
        let mut cmd = self.delete(&model);
        if let Some(where_) = request.get("where") {
            cmd = cmd.filter_json(where_)?;
        }
        cmd.exec().await
    }

    pub async fn upsert_json(&self, request: &Value) -> Result<Vec<Row>, Error> {
        let cmd = self.cmd_from_json(request, CommandKind::Upsert)?;
        cmd.exec().await
    }

    fn cmd_from_json(&self, request: &Value, kind: CommandKind) -> Result<Cmd, Error> {
        let (model, _) = self.request_from(request)?;
        let data = match request.get("data") {
            Some(Value::Object(map)) if !map.is_empty() => Value::Object(map.clone()),
            Some(Value::Array(items)) if !items.is_empty() => Value::Array(items.clone()),
            _ => return Err(Error::DataRequired),
        };

        let mut cmd = Cmd::new(self.clone(), model, kind).data_json(&data)?;
        if let Some(where_) = request.get("where") {
            cmd = cmd.filter_json(where_)?;
        }
        if request.get("debug").and_then(Value::as_bool).unwrap_or(false) {
            cmd = cmd.debug();
        }
        Ok(cmd)
    }

    /// The model and alias named by `from`.
    fn request_from(&self, request: &Value) -> Result<(Arc<Model>, String), Error> {
        let (name, alias) = match request.get("from") {
            Some(Value::String(name)) if !name.is_empty() => (name.clone(), "A".to_string()),
            Some(Value::Object(map)) => match map.iter().next() {
                Some((name, Value::String(alias))) => (name.clone(), alias.clone()),
                Some((name, _)) => (name.clone(), "A".to_string()),
                None => return Err(Error::FromRequired),
            },
            _ => return Err(Error::FromRequired),
        };
        if !NAME.is_match(&alias) {
            return Err(Error::InvalidName(alias));
        }
        Ok((self.model(&name)?, alias))
    }

    /// `{"from": <name or {name: alias}>, "kind": "left", "keys": {"<theirs>": "<ours>"}}`
    fn join_from_json(&self, ql: Ql, join: &Value) -> Result<Ql, Error> {
        let (model, alias) = self.request_from(join)?;
        let kind = match join.get("kind").and_then(Value::as_str).map(str::to_lowercase).as_deref() {
            None | Some("inner") => JoinKind::Inner,
            Some("left") => JoinKind::Left,
            Some("right") => JoinKind::Right,
            Some("full") => JoinKind::Full,
            Some(other) => return Err(Error::InvalidCommand(format!("join kind {}", other))),
        };

        let keys: Vec<(String, String)> = join
            .get("keys")
            .and_then(Value::as_object)
            .map(|keys| keys.iter().filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string()))).collect())
            .unwrap_or_default();
        let pairs: Vec<(&str, &str)> = keys.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        Ok(match kind {
            JoinKind::Inner => ql.join(&model, &alias, &pairs),
            JoinKind::Left => ql.left_join(&model, &alias, &pairs),
            JoinKind::Right => ql.right_join(&model, &alias, &pairs),
            JoinKind::Full => ql.full_join(&model, &alias, &pairs),
        })
    }
}

fn require_where(request: &Value) -> Result<(), Error> {
    match request.get("where") {
        Some(Value::Array(items)) if !items.is_empty() => Ok(()),
        Some(Value::Object(map)) if !map.is_empty() => Ok(()),
        _ => Err(Error::DataRequired),
    }
}

fn strings(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

// ============================================================================
// Model definitions
// ============================================================================

/// Parses a JSON definition into a model and the child models of its details.
pub fn model_from_json(definition: &Value) -> Result<(Model, Vec<Model>), Error> {
    let text = |key: &str| definition.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

    let schema = text("schema").ok_or_else(|| Error::AttributeRequired("schema".to_string()))?;
    let name = text("name").ok_or_else(|| Error::AttributeRequired("name".to_string()))?;
    let version = definition.get("version").and_then(Value::as_i64).unwrap_or(1) as i32;
    let mut model = Model::new(schema, name, version);
    model.is_core = flag(definition, "is_core");

    if flag(definition, "preset") {
        model.define_model()?;
    }

    if let Some(source) = text("source") {
        model.define_source_field(source)?;
    }

    let mut hidden = Vec::new();
    for column in definition.get("columns").and_then(Value::as_array).into_iter().flatten() {
        let mut parsed: Column = serde_json::from_value(column.clone())?;
        let data_type = match column.get("type").and_then(Value::as_str) {
            Some(name) => name.parse::<DataType>().map_err(Error::InvalidCommand)?,
            None => parsed.data_type,
        };
        parsed.data_type = data_type;

        let defined = match parsed.kind {
            ColumnKind::Attrib => model.define_attribute(&parsed.name, data_type, parsed.default)?,
            _ => model.define_column(&parsed.name, data_type, parsed.default)?,
        };
        defined.definition = parsed.definition;

        if flag(column, "hidden") {
            hidden.push(parsed.name);
        }
    }

    if let Some(index) = text("index_field") {
        model.define_index_field(index)?;
    }

    let list = |key: &str| strings(definition, key);
    model.define_primary_keys(&as_strs(&list("primary_keys")));
    model.define_unique(&as_strs(&list("unique")));
    model.define_index(&as_strs(&list("indexes")));
    model.define_required(&as_strs(&list("required")));
    model.define_hidden(&as_strs(&list("hidden")));
    model.define_hidden(&as_strs(&hidden));

    let mut children = Vec::new();
    for (name, detail) in objects(definition, "details") {
        let keys = key_pairs(detail.get("keys"));
        let pairs: Vec<(&str, &str)> = keys.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let version = detail.get("version").and_then(Value::as_i64).unwrap_or(1) as i32;
        let mut child = model.define_detail_cascade(
            name,
            &pairs,
            version,
            flag(detail, "on_delete_cascade"),
            flag(detail, "on_update_cascade"),
        )?;
        if let (Some(rows), Some(declared)) = (detail.get("rows").and_then(Value::as_u64), model.details.get_mut(name)) {
            declared.rows = rows as usize;
        }
        if let Some(nested) = detail.get("model") {
            merge_child(&mut child, nested)?;
        }
        children.push(child);
    }

    for (name, rollup) in objects(definition, "rollups") {
        let from = rollup.get("from").and_then(Value::as_str).ok_or_else(|| Error::AttributeRequired("from".to_string()))?;
        let keys = key_pairs(rollup.get("keys"));
        let pairs: Vec<(&str, &str)> = keys.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let select = strings(rollup, "select");
        model.define_rollup(name, from, &pairs, &as_strs(&select))?;
    }

    for (to, relation) in objects(definition, "relations") {
        let keys = key_pairs(relation.get("keys"));
        let pairs: Vec<(&str, &str)> = keys.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        model.define_relation(to, &pairs);
    }

    model.is_locked = flag(definition, "is_locked");
    model.debug = flag(definition, "debug");
    Ok((model, children))
}

/// Applies a nested `{"columns": [...], "source": ..., ...}` to a detail's child model.
///
/// The key columns declared by the detail stay first.
fn merge_child(child: &mut Model, nested: &Value) -> Result<(), Error> {
    let mut definition = match nested {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    definition.insert("schema".to_string(), Value::String(child.schema.clone()));
    definition.insert("name".to_string(), Value::String(child.name.clone()));
    definition.insert("version".to_string(), Value::from(child.version));

    let (mut parsed, _) = model_from_json(&Value::Object(definition))?;
    for key in child.columns.iter().rev() {
        if parsed.columns.iter().all(|c| c.name != key.name) {
            parsed.columns.insert(0, key.clone());
        }
    }
    parsed.foreign_keys = std::mem::take(&mut child.foreign_keys);
    *child = parsed;
    Ok(())
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn objects<'a>(value: &'a Value, key: &str) -> Vec<(&'a str, &'a Value)> {
    value.get(key).and_then(Value::as_object).map(|map| map.iter().map(|(k, v)| (k.as_str(), v)).collect()).unwrap_or_default()
}

fn key_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    value
        .and_then(Value::as_object)
        .map(|map| map.iter().filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string()))).collect())
        .unwrap_or_default()
}
