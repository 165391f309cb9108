//! # Model Module
//!
//! Schema metadata for a table: its columns, keys, indexes and the virtual
//! entries (details, rollups, relations, computed values) filled in per row.
//!
//! A model may carry a JSON *source* column. When it does, names that are not
//! declared columns are accepted as flexible attributes stored inside that
//! document, unless the model is locked.
//!
//! Models are defined with `&mut self` methods, then shared behind an `Arc`
//! once registered with a [`Database`](crate::Database). Hooks can still be
//! attached after registration.

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use heck::ToSnakeCase;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Error,
    column::{self, Column, ColumnKind, DataType, Detail, ForeignKey, Relation, Rollup},
    command::CommandKind,
    condition::{Wheres, eq},
    field::{Field, NAME, NAME_ALIAS},
    row::Row,
    transaction::Tx,
};

// ============================================================================
// Hooks
// ============================================================================

/// A row hook: receives the old row and may rewrite the new one.
///
/// Returning an error aborts the command.
pub type TriggerFn = Arc<dyn Fn(Option<&Tx>, &Row, &mut Row) -> Result<(), Error> + Send + Sync>;

/// A computed-value handler. Mutates the row in place.
pub type CalcFn = Arc<dyn Fn(Option<&Tx>, &mut Row) + Send + Sync>;

/// The six hook lists of a model or command.
#[derive(Clone, Default)]
pub struct Triggers {
    pub before_insert: Vec<TriggerFn>,
    pub before_update: Vec<TriggerFn>,
    pub before_delete: Vec<TriggerFn>,
    pub after_insert: Vec<TriggerFn>,
    pub after_update: Vec<TriggerFn>,
    pub after_delete: Vec<TriggerFn>,
}

impl Triggers {
    pub fn before(&self, kind: CommandKind) -> &[TriggerFn] {
        match kind {
            CommandKind::Insert => &self.before_insert,
            CommandKind::Update => &self.before_update,
            CommandKind::Delete => &self.before_delete,
            CommandKind::Upsert => &[],
        }
    }

    pub fn after(&self, kind: CommandKind) -> &[TriggerFn] {
        match kind {
            CommandKind::Insert => &self.after_insert,
            CommandKind::Update => &self.after_update,
            CommandKind::Delete => &self.after_delete,
            CommandKind::Upsert => &[],
        }
    }
}

// ============================================================================
// Model
// ============================================================================

/// Table metadata.
#[derive(Serialize, Deserialize)]
pub struct Model {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub columns: Vec<Column>,
    /// JSON column holding flexible attributes.
    #[serde(default)]
    pub source_field: Option<String>,
    /// Surrogate key mirrored into the change-tracking store.
    #[serde(default)]
    pub index_field: Option<String>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub hidden: Vec<String>,
    #[serde(default)]
    pub details: IndexMap<String, Detail>,
    #[serde(default)]
    pub rollups: IndexMap<String, Rollup>,
    #[serde(default)]
    pub relations: IndexMap<String, Relation>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Locked models reject undeclared attributes.
    #[serde(default)]
    pub is_locked: bool,
    /// Core models skip the change-tracking trigger.
    #[serde(default)]
    pub is_core: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(skip)]
    calcs: IndexMap<String, CalcFn>,
    #[serde(skip)]
    triggers: RwLock<Triggers>,
}

impl Model {
    pub fn new(schema: impl AsRef<str>, name: impl AsRef<str>, version: i32) -> Self {
        Self {
            schema: schema.as_ref().to_snake_case(),
            name: name.as_ref().to_snake_case(),
            version,
            columns: Vec::new(),
            source_field: None,
            index_field: None,
            primary_keys: Vec::new(),
            unique: Vec::new(),
            indexes: Vec::new(),
            required: Vec::new(),
            hidden: Vec::new(),
            details: IndexMap::new(),
            rollups: IndexMap::new(),
            relations: IndexMap::new(),
            foreign_keys: Vec::new(),
            is_locked: false,
            is_core: false,
            debug: false,
            calcs: IndexMap::new(),
            triggers: RwLock::new(Triggers::default()),
        }
    }

    /// Builds a model from a typed entity description.
    pub fn of<T: crate::Entity>() -> Result<Self, Error> {
        let mut model = Model::new(T::schema(), T::name(), T::version());
        T::define(&mut model)?;
        Ok(model)
    }

    /// `schema.name`
    pub fn table(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    // ------------------------------------------------------------------------
    // Definition
    // ------------------------------------------------------------------------

    fn define(
        &mut self,
        name: &str,
        kind: ColumnKind,
        data_type: DataType,
        default: Value,
    ) -> Result<&mut Column, Error> {
        if name.is_empty() {
            return Err(Error::NameRequired);
        }
        if !NAME.is_match(name) {
            return Err(Error::InvalidName(name.to_string()));
        }

        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                let mut column = Column::new(name, kind, data_type).with_default(default);
                if kind == ColumnKind::Attrib {
                    column.source = self.source_field.clone();
                }
                self.columns.push(column);
                self.columns.len() - 1
            }
        };

        Ok(&mut self.columns[idx])
    }

    /// Declares a physical column. Redefining an existing name returns it unchanged.
    pub fn define_column(&mut self, name: &str, data_type: DataType, default: Value) -> Result<&mut Column, Error> {
        self.define(name, ColumnKind::Column, data_type, default)
    }

    /// Declares the JSON overlay column and indexes it.
    pub fn define_source_field(&mut self, name: &str) -> Result<(), Error> {
        self.define(name, ColumnKind::Column, DataType::Json, Value::Null)?;
        self.source_field = Some(name.to_string());
        for column in self.columns.iter_mut().filter(|c| c.kind == ColumnKind::Attrib) {
            column.source = Some(name.to_string());
        }
        self.define_index(&[name]);
        Ok(())
    }

    /// Declares the surrogate key mirrored into the change-tracking store.
    pub fn define_index_field(&mut self, name: &str) -> Result<(), Error> {
        self.define(name, ColumnKind::Column, DataType::Key, Value::Null)?;
        self.index_field = Some(name.to_string());
        self.define_index(&[name]);
        Ok(())
    }

    /// Declares a typed attribute, creating the default source column if needed.
    pub fn define_attribute(&mut self, name: &str, data_type: DataType, default: Value) -> Result<&mut Column, Error> {
        if self.source_field.is_none() {
            self.define_source_field(column::SOURCE)?;
        }
        self.define(name, ColumnKind::Attrib, data_type, default)
    }

    /// Each helper below only accepts names already declared as columns.
    pub fn define_primary_keys(&mut self, names: &[&str]) {
        for name in names {
            if self.column_index(name).is_none() || self.primary_keys.iter().any(|k| k == name) {
                continue;
            }
            self.define_required(&[name]);
            self.primary_keys.push(name.to_string());
        }
    }

    pub fn define_unique(&mut self, names: &[&str]) {
        Self::push_declared(&self.columns, &mut self.unique, names);
    }

    pub fn define_index(&mut self, names: &[&str]) {
        Self::push_declared(&self.columns, &mut self.indexes, names);
    }

    pub fn define_required(&mut self, names: &[&str]) {
        Self::push_declared(&self.columns, &mut self.required, names);
    }

    pub fn define_hidden(&mut self, names: &[&str]) {
        Self::push_declared(&self.columns, &mut self.hidden, names);
    }

    fn push_declared(columns: &[Column], list: &mut Vec<String>, names: &[&str]) {
        for name in names {
            if columns.iter().any(|c| c.name == *name) && !list.iter().any(|n| n == name) {
                list.push(name.to_string());
            }
        }
    }

    /// Declares a child collection and returns the child model, named
    /// `<parent>_<name>`, for further definition and registration.
    ///
    /// `keys` maps the child's foreign key to this model's key. Both sides are
    /// declared as `key` columns.
    pub fn define_detail(&mut self, name: &str, keys: &[(&str, &str)], version: i32) -> Result<Model, Error> {
        self.define_detail_cascade(name, keys, version, false, false)
    }

    /// Like [`Model::define_detail`], and when either flag is set the child
    /// also gets a foreign key to this model with the matching `ON DELETE` /
    /// `ON UPDATE CASCADE` actions. The parent's key columns must be its
    /// primary key or unique.
    pub fn define_detail_cascade(
        &mut self,
        name: &str,
        keys: &[(&str, &str)],
        version: i32,
        on_delete_cascade: bool,
        on_update_cascade: bool,
    ) -> Result<Model, Error> {
        self.define(name, ColumnKind::Detail, DataType::Json, Value::Array(Vec::new()))?;

        let mut child = Model::new(&self.schema, format!("{}_{}", self.name, name), version);
        let mut mapping = IndexMap::new();
        for (fk, pk) in keys {
            self.define_column(pk, DataType::Key, Value::String(String::new()))?;
            child.define_column(fk, DataType::Key, Value::String(String::new()))?;
            mapping.insert(fk.to_string(), pk.to_string());
        }

        if on_delete_cascade || on_update_cascade {
            child.foreign_keys.push(ForeignKey {
                name: format!("fk_{}_{}", child.name, self.name),
                to: self.table(),
                keys: mapping.clone(),
                on_delete_cascade,
                on_update_cascade,
            });
        }

        self.details.insert(
            name.to_string(),
            Detail {
                name: name.to_string(),
                to: child.table(),
                keys: mapping,
                select: Vec::new(),
                version,
                rows: 0,
                on_delete_cascade,
                on_update_cascade,
            },
        );
        Ok(child)
    }

    /// Declares a single related value pulled from model `from`.
    pub fn define_rollup(&mut self, name: &str, from: &str, keys: &[(&str, &str)], select: &[&str]) -> Result<(), Error> {
        self.define(name, ColumnKind::Rollup, DataType::Json, Value::Null)?;
        self.rollups.insert(
            name.to_string(),
            Rollup {
                name: name.to_string(),
                from: from.to_string(),
                keys: keys.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                select: select.iter().map(|s| s.to_string()).collect(),
            },
        );
        Ok(())
    }

    /// Declares a join path to model `to`.
    pub fn define_relation(&mut self, to: &str, keys: &[(&str, &str)]) {
        self.relations.insert(
            to.to_string(),
            Relation { to: to.to_string(), keys: keys.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() },
        );
    }

    /// Declares a computed value filled in per row by `handler`.
    pub fn define_calc<F>(&mut self, name: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Option<&Tx>, &mut Row) + Send + Sync + 'static,
    {
        self.define(name, ColumnKind::Calc, DataType::Any, Value::Null)?;
        self.calcs.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    /// Standard layout: timestamps, status, `id` primary key, the source
    /// overlay and the change-tracking index.
    pub fn define_model(&mut self) -> Result<&mut Self, Error> {
        self.define_column(column::CREATED_AT, DataType::DateTime, Value::Null)?;
        self.define_column(column::UPDATED_AT, DataType::DateTime, Value::Null)?;
        self.define_column(column::STATUS, DataType::Key, Value::Null)?;
        self.define_column(column::ID, DataType::Key, Value::Null)?;
        self.define_primary_keys(&[column::ID]);
        self.define_source_field(column::SOURCE)?;
        self.define_index_field(column::INDEX)?;
        Ok(self)
    }

    /// [`define_model`](Self::define_model) plus an indexed `project_id`.
    pub fn define_project_model(&mut self) -> Result<&mut Self, Error> {
        self.define_model()?;
        self.define_column(column::PROJECT_ID, DataType::Key, Value::Null)?;
        self.define_index(&[column::PROJECT_ID]);
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------------

    pub fn before_insert<F>(&self, hook: F)
    where
        F: Fn(Option<&Tx>, &Row, &mut Row) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.with_triggers(|t| t.before_insert.push(Arc::new(hook)));
    }

    pub fn before_update<F>(&self, hook: F)
    where
        F: Fn(Option<&Tx>, &Row, &mut Row) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.with_triggers(|t| t.before_update.push(Arc::new(hook)));
    }

    pub fn before_delete<F>(&self, hook: F)
    where
        F: Fn(Option<&Tx>, &Row, &mut Row) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.with_triggers(|t| t.before_delete.push(Arc::new(hook)));
    }

    pub fn after_insert<F>(&self, hook: F)
    where
        F: Fn(Option<&Tx>, &Row, &mut Row) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.with_triggers(|t| t.after_insert.push(Arc::new(hook)));
    }

    pub fn after_update<F>(&self, hook: F)
    where
        F: Fn(Option<&Tx>, &Row, &mut Row) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.with_triggers(|t| t.after_update.push(Arc::new(hook)));
    }

    pub fn after_delete<F>(&self, hook: F)
    where
        F: Fn(Option<&Tx>, &Row, &mut Row) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.with_triggers(|t| t.after_delete.push(Arc::new(hook)));
    }

    fn with_triggers(&self, f: impl FnOnce(&mut Triggers)) {
        let mut guard = self.triggers.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }

    /// Copy of the hook lists as they are right now.
    pub fn triggers(&self) -> Triggers {
        self.triggers.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn calc(&self, name: &str) -> Option<CalcFn> {
        self.calcs.get(name).cloned()
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Finds a declared column. On an unlocked model with a source column,
    /// any other well-formed name resolves to a transient attribute.
    pub fn find_column(&self, name: &str) -> Option<Column> {
        if let Some(idx) = self.column_index(name) {
            return Some(self.columns[idx].clone());
        }

        match &self.source_field {
            Some(source) if !self.is_locked && NAME.is_match(name) => {
                let mut column = Column::new(name, ColumnKind::Attrib, DataType::Any);
                column.source = Some(source.clone());
                Some(column)
            }
            _ => None,
        }
    }

    /// Resolves `name` or `name:as` against this model.
    pub fn find_field(&self, name: &str) -> Option<Field> {
        let name = name.trim();
        if let Some(caps) = NAME_ALIAS.captures(name) {
            let column = self.find_column(&caps[1])?;
            return Some(self.field_of(&column).with_alias(&caps[2]));
        }

        let column = self.find_column(name)?;
        Some(self.field_of(&column))
    }

    fn field_of(&self, column: &Column) -> Field {
        let mut field = Field::new(self.name.clone(), column.name.clone(), column.kind, column.data_type);
        match column.kind {
            ColumnKind::Attrib => field.source = column.source.clone(),
            ColumnKind::Detail => {
                if let Some(detail) = self.details.get(&column.name) {
                    field.to = Some(detail.to.clone());
                    field.keys = detail.keys.clone();
                    field.select = detail.select.clone();
                    field.page = 1;
                    field.rows = detail.rows;
                }
            }
            ColumnKind::Rollup => {
                if let Some(rollup) = self.rollups.get(&column.name) {
                    field.to = Some(rollup.from.clone());
                    field.keys = rollup.keys.clone();
                    field.select = rollup.select.clone();
                }
            }
            _ => {}
        }
        field
    }

    /// Physical columns, in declaration order.
    pub fn physical_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.kind == ColumnKind::Column)
    }

    /// True when `name` may be written by a mutation.
    pub fn is_writable(&self, name: &str) -> bool {
        if self.source_field.as_deref() == Some(name) {
            return false;
        }
        self.find_column(name).is_some_and(|c| c.kind.is_writable())
    }

    /// Equality conditions on the primary keys, taking values from `data`.
    ///
    /// Keys absent from `data` are skipped.
    pub fn where_by_primary_keys(&self, data: &Row) -> Wheres {
        let mut wheres = Wheres::new();
        for key in &self.primary_keys {
            if let Some(value) = data.get(key) {
                wheres.add(eq(key.as_str(), value.clone()));
            }
        }
        wheres
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("schema", &self.schema)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("columns", &self.columns)
            .field("source_field", &self.source_field)
            .field("primary_keys", &self.primary_keys)
            .field("calcs", &self.calcs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A Rust type that describes a model. Usually derived with `#[derive(Entity)]`.
pub trait Entity {
    fn schema() -> &'static str;
    fn name() -> &'static str;
    fn version() -> i32 {
        1
    }
    fn define(model: &mut Model) -> Result<(), Error>;
}
