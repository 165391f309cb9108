//! # Command Module
//!
//! `Cmd` is the write builder: insert, update, delete and upsert against one
//! model, with before/after hooks around every row.
//!
//! The hook lists are copied from the model when the command is created, so
//! hooks attached to the model later do not affect commands already built.
//!
//! Update and delete first re-select the rows matching the command's
//! conditions (the *current* rows) and then issue one statement per row,
//! keyed by that row's primary key.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    Error,
    condition::{Condition, Wheres},
    database::Database,
    field::{self, FromRef},
    model::{Model, Triggers},
    row::{self, Row},
    transaction::Tx,
};

// ============================================================================
// Command kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Insert => "insert",
            CommandKind::Update => "update",
            CommandKind::Delete => "delete",
            CommandKind::Upsert => "upsert",
        }
    }
}

/// One statement to render: the kind, the values to write and the rows to touch.
#[derive(Debug, Clone, Copy)]
pub struct Mutation<'a> {
    pub kind: CommandKind,
    pub model: &'a Model,
    pub new: &'a Row,
    pub wheres: &'a Wheres,
}

// ============================================================================
// Cmd
// ============================================================================

pub struct Cmd {
    db: Database,
    kind: CommandKind,
    model: Arc<Model>,
    data: Vec<Row>,
    wheres: Wheres,
    triggers: Triggers,
    debug: bool,
}

impl Cmd {
    pub(crate) fn new(db: Database, model: Arc<Model>, kind: CommandKind) -> Self {
        let triggers = model.triggers();
        let debug = model.debug;
        Self { db, kind, model, data: Vec::new(), wheres: Wheres::new(), triggers, debug }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn wheres(&self) -> &Wheres {
        &self.wheres
    }

    /// Appends a row to write.
    pub fn data(mut self, row: Row) -> Self {
        self.data.push(row);
        self
    }

    /// Appends rows from a JSON object or array of objects.
    pub fn data_json(mut self, value: &Value) -> Result<Self, Error> {
        match value {
            Value::Object(map) => self.data.push(map.clone()),
            Value::Array(items) => {
                for item in items {
                    self.data.push(row::as_row(item).ok_or(Error::DataRequired)?);
                }
            }
            _ => return Err(Error::DataRequired),
        }
        Ok(self)
    }

    /// Statements address the target table as `A`, like queries do.
    fn resolve(&self, mut condition: Condition) -> Condition {
        let froms = [FromRef::new(self.model.clone(), "A")];
        if !condition.field.resolve(|name| field::find_field(&froms, name)) {
            log::warn!("condition field {} unresolved on {}", condition.field.key(), self.model.table());
        }
        condition
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        let condition = self.resolve(condition);
        self.wheres.add(condition);
        self
    }

    pub fn and(self, condition: Condition) -> Self {
        self.filter(condition.and())
    }

    pub fn or(self, condition: Condition) -> Self {
        self.filter(condition.or())
    }

    pub fn filter_json(mut self, value: &Value) -> Result<Self, Error> {
        for condition in Wheres::from_json(value)? {
            self = self.filter(condition);
        }
        Ok(self)
    }

    /// Adds a hook run before each row of this command only.
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&Tx>, &Row, &mut Row) -> Result<(), Error> + Send + Sync + 'static,
    {
        let hook: crate::model::TriggerFn = Arc::new(hook);
        match self.kind {
            CommandKind::Insert => self.triggers.before_insert.push(hook),
            CommandKind::Update => self.triggers.before_update.push(hook),
            CommandKind::Delete => self.triggers.before_delete.push(hook),
            CommandKind::Upsert => {
                self.triggers.before_insert.push(hook.clone());
                self.triggers.before_update.push(hook);
            }
        }
        self
    }

    /// Adds a hook run after each row of this command only.
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&Tx>, &Row, &mut Row) -> Result<(), Error> + Send + Sync + 'static,
    {
        let hook: crate::model::TriggerFn = Arc::new(hook);
        match self.kind {
            CommandKind::Insert => self.triggers.after_insert.push(hook),
            CommandKind::Update => self.triggers.after_update.push(hook),
            CommandKind::Delete => self.triggers.after_delete.push(hook),
            CommandKind::Upsert => {
                self.triggers.after_insert.push(hook.clone());
                self.triggers.after_update.push(hook);
            }
        }
        self
    }

    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// SQL of the first statement this command would issue, without hooks.
    pub fn to_sql(&self) -> Result<String, Error> {
        let empty = Row::new();
        let new = self.data.first().unwrap_or(&empty);
        let kind = match self.kind {
            CommandKind::Upsert => CommandKind::Insert,
            kind => kind,
        };
        self.db.driver.render_mutation(&Mutation { kind, model: &self.model, new, wheres: &self.wheres })
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    pub async fn exec(self) -> Result<Vec<Row>, Error> {
        self.run(None).await
    }

    pub async fn exec_tx(self, tx: &Tx) -> Result<Vec<Row>, Error> {
        self.run(Some(tx)).await
    }

    /// First affected row, if any.
    pub async fn one(self) -> Result<Option<Row>, Error> {
        Ok(self.exec().await?.into_iter().next())
    }

    async fn run(mut self, tx: Option<&Tx>) -> Result<Vec<Row>, Error> {
        self.db.connection()?;

        match self.kind {
            CommandKind::Insert => self.insert(tx).await,
            CommandKind::Update => self.update(tx).await,
            CommandKind::Delete => self.delete(tx).await,
            CommandKind::Upsert => {
                let first = self.data.first().ok_or(Error::DataRequired)?.clone();
                let keys = self.model.where_by_primary_keys(&first);
                let exists = !keys.is_empty()
                    && self.db.from(&self.model, "A").filters(keys.clone()).exists_in(tx).await?;

                if exists {
                    self.kind = CommandKind::Update;
                    self.wheres = Wheres::new();
                    for condition in keys {
                        self = self.filter(condition);
                    }
                    self.update(tx).await
                } else {
                    self.kind = CommandKind::Insert;
                    self.insert(tx).await
                }
            }
        }
    }

    async fn statement(&self, tx: Option<&Tx>, kind: CommandKind, new: &Row, wheres: &Wheres) -> Result<Option<Row>, Error> {
        let sql = self.db.driver.render_mutation(&Mutation { kind, model: &self.model, new, wheres })?;
        if self.debug {
            log::info!("{}", sql);
        }
        Ok(self.db.fetch_all(tx, &sql).await?.into_iter().next())
    }

    async fn insert(&mut self, tx: Option<&Tx>) -> Result<Vec<Row>, Error> {
        let old = Row::new();
        let mut result = Vec::with_capacity(self.data.len());

        for data in std::mem::take(&mut self.data) {
            let mut new = data;
            for hook in &self.triggers.before_insert {
                hook(tx, &old, &mut new)?;
            }
            if new.is_empty() {
                continue;
            }
            if let Some(missing) = self.model.required.iter().find(|name| new.get(*name).is_none_or(Value::is_null)) {
                return Err(Error::AttributeRequired(missing.clone()));
            }

            let Some(mut returned) = self.statement(tx, CommandKind::Insert, &new, &Wheres::new()).await? else {
                continue;
            };
            for hook in &self.triggers.after_insert {
                hook(tx, &old, &mut returned)?;
            }
            result.push(returned);
        }

        Ok(result)
    }

    /// Rows matching the command's conditions, with hidden columns included.
    async fn current(&self, tx: Option<&Tx>) -> Result<Vec<Row>, Error> {
        let ql = self.db.from(&self.model, "A").show_hidden().filters(self.wheres.clone()).unbounded().prepared();
        self.db.query(&ql, tx).await
    }

    /// Conditions targeting exactly `old`.
    fn row_wheres(&self, old: &Row) -> Wheres {
        let keys = self.model.where_by_primary_keys(old);
        if keys.len() == self.model.primary_keys.len() && !keys.is_empty() {
            let mut resolved = Wheres::new();
            for condition in keys {
                resolved.add(self.resolve(condition));
            }
            return resolved;
        }
        self.wheres.clone()
    }

    async fn update(&mut self, tx: Option<&Tx>) -> Result<Vec<Row>, Error> {
        let changes = self.data.first().cloned().ok_or(Error::DataRequired)?;
        let current = self.current(tx).await?;
        let mut result = Vec::with_capacity(current.len());

        for old in current {
            let mut new = old.clone();
            new.extend(changes.clone());
            for hook in &self.triggers.before_update {
                hook(tx, &old, &mut new)?;
            }

            let diff: Row = new
                .iter()
                .filter(|(key, value)| old.get(*key) != Some(*value) && self.model.is_writable(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if diff.is_empty() {
                result.push(new);
                continue;
            }

            let wheres = self.row_wheres(&old);
            let Some(mut returned) = self.statement(tx, CommandKind::Update, &diff, &wheres).await? else {
                continue;
            };
            for hook in &self.triggers.after_update {
                hook(tx, &old, &mut returned)?;
            }
            result.push(returned);
        }

        Ok(result)
    }

    async fn delete(&mut self, tx: Option<&Tx>) -> Result<Vec<Row>, Error> {
        let current = self.current(tx).await?;
        let mut result = Vec::with_capacity(current.len());

        for old in current {
            let mut new = Row::new();
            for hook in &self.triggers.before_delete {
                hook(tx, &old, &mut new)?;
            }

            let wheres = self.row_wheres(&old);
            let Some(mut returned) = self.statement(tx, CommandKind::Delete, &new, &wheres).await? else {
                continue;
            };
            for hook in &self.triggers.after_delete {
                hook(tx, &old, &mut returned)?;
            }
            result.push(returned);
        }

        Ok(result)
    }
}

impl std::fmt::Debug for Cmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cmd")
            .field("kind", &self.kind)
            .field("model", &self.model.table())
            .field("data", &self.data)
            .field("wheres", &self.wheres)
            .finish()
    }
}
