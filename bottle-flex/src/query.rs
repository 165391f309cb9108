//! # Query Module
//!
//! `Ql` is the read builder. It collects tables, selections, conditions,
//! grouping, ordering and pagination, classifying each selected field:
//!
//! - columns, attributes and aggregations go into the SQL projection;
//! - details, rollups and computed values are resolved per row afterwards.
//!
//! Models with a JSON source column default to *data* mode, where each row
//! comes back as one merged JSON object.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    Error,
    column::ColumnKind,
    condition::{Condition, Wheres},
    database::Database,
    field::{self, Field, FromRef},
    model::Model,
    pagination::{Paginated, Pagination},
    row::Row,
    transaction::Tx,
};

// ============================================================================
// Query parts
// ============================================================================

/// Output shape of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Plain column projection.
    Select,
    /// One merged JSON object per row.
    Data,
    Count,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

/// A joined table and its equality keys, `(theirs, ours)`.
#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub from: FromRef,
    pub on: Vec<(Field, Field)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: Field,
    pub desc: bool,
}

// ============================================================================
// Ql
// ============================================================================

#[derive(Clone)]
pub struct Ql {
    db: Database,
    pub kind: QueryKind,
    pub froms: Vec<FromRef>,
    pub joins: Vec<Join>,
    pub selects: Vec<Field>,
    pub details: Vec<Field>,
    pub rollups: Vec<Field>,
    pub calcs: Vec<Field>,
    pub hidden: Vec<Field>,
    pub wheres: Wheres,
    pub group_by: Vec<Field>,
    pub having: Wheres,
    pub order_by: Vec<OrderBy>,
    /// `None` renders no `LIMIT`.
    pub pagination: Option<Pagination>,
    pub debug: bool,
}

impl Ql {
    pub(crate) fn new(db: Database, model: Arc<Model>, alias: &str) -> Self {
        let max_rows = db.config.max_rows;
        let kind = if model.source_field.is_some() { QueryKind::Data } else { QueryKind::Select };
        let from = FromRef::new(model.clone(), alias);
        let hidden = model.hidden.iter().filter_map(|name| from.find_field(name)).collect();
        let debug = model.debug;

        Self {
            db,
            kind,
            froms: vec![from],
            joins: Vec::new(),
            selects: Vec::new(),
            details: Vec::new(),
            rollups: Vec::new(),
            calcs: Vec::new(),
            hidden,
            wheres: Wheres::new(),
            group_by: Vec::new(),
            having: Wheres::new(),
            order_by: Vec::new(),
            pagination: Some(Pagination::new_with_limit(0, max_rows, max_rows)),
            debug,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Main table, then joined tables, in resolution order.
    fn tables(&self) -> Vec<FromRef> {
        self.froms.iter().cloned().chain(self.joins.iter().map(|j| j.from.clone())).collect()
    }

    /// Resolves a textual reference against this query's tables.
    pub fn find_field(&self, name: &str) -> Option<Field> {
        field::find_field(&self.tables(), name)
    }

    fn resolve_all(&self, names: &[&str], what: &str) -> Vec<Field> {
        names
            .iter()
            .filter_map(|name| {
                let found = self.find_field(name);
                if found.is_none() {
                    log::warn!("{} {} not found, ignored", what, name);
                }
                found
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------------

    /// Joins `model` under `alias` on `(theirs, ours)` key pairs.
    pub fn join(self, model: &Arc<Model>, alias: &str, keys: &[(&str, &str)]) -> Self {
        self.join_kind(JoinKind::Inner, model, alias, keys)
    }

    pub fn left_join(self, model: &Arc<Model>, alias: &str, keys: &[(&str, &str)]) -> Self {
        self.join_kind(JoinKind::Left, model, alias, keys)
    }

    pub fn right_join(self, model: &Arc<Model>, alias: &str, keys: &[(&str, &str)]) -> Self {
        self.join_kind(JoinKind::Right, model, alias, keys)
    }

    pub fn full_join(self, model: &Arc<Model>, alias: &str, keys: &[(&str, &str)]) -> Self {
        self.join_kind(JoinKind::Full, model, alias, keys)
    }

    /// Joins `model` using the relation the main model declares for it.
    pub fn join_relation(self, model: &Arc<Model>, alias: &str) -> Self {
        let keys = self.froms.first().and_then(|f| f.model.relations.get(&model.name)).map(|r| r.keys.clone());
        match keys {
            Some(keys) => {
                let pairs: Vec<(&str, &str)> = keys.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                self.join_kind(JoinKind::Inner, model, alias, &pairs)
            }
            None => {
                log::warn!("no relation to {} declared, join ignored", model.name);
                self
            }
        }
    }

    fn join_kind(mut self, kind: JoinKind, model: &Arc<Model>, alias: &str, keys: &[(&str, &str)]) -> Self {
        let from = FromRef::new(model.clone(), alias);
        let mut on = Vec::new();
        for (theirs, ours) in keys {
            match (from.find_field(theirs), self.find_field(ours)) {
                (Some(theirs), Some(ours)) => on.push((theirs, ours)),
                _ => log::warn!("join key {} = {} not found, ignored", theirs, ours),
            }
        }
        self.joins.push(Join { kind, from, on });
        self
    }

    // ------------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------------

    /// Adds fields to the result. `*` expands to the physical columns of the
    /// main table, except its source column.
    pub fn select(mut self, names: &[&str]) -> Self {
        for name in names {
            if name.trim() == "*" {
                if let Some(from) = self.froms.first().cloned() {
                    let source = from.model.source_field.as_deref();
                    for column in from.model.physical_columns().filter(|c| Some(c.name.as_str()) != source) {
                        if let Some(field) = from.find_field(&column.name) {
                            self.push_select(field);
                        }
                    }
                }
                continue;
            }

            match self.find_field(name) {
                Some(field) => self.push_select(field),
                None => log::warn!("select {} not found, ignored", name),
            }
        }
        self
    }

    fn push_select(&mut self, field: Field) {
        match field.kind {
            ColumnKind::Detail => self.details.push(field),
            ColumnKind::Rollup => self.rollups.push(field),
            ColumnKind::Calc => self.calcs.push(field),
            ColumnKind::Column | ColumnKind::Attrib => self.selects.push(field),
            ColumnKind::Relation => {}
        }
    }

    /// Removes fields from the result.
    pub fn hidden(mut self, names: &[&str]) -> Self {
        let fields = self.resolve_all(names, "hidden");
        self.hidden.extend(fields);
        self
    }

    /// Shows every column, including those the model hides.
    pub fn show_hidden(mut self) -> Self {
        self.hidden.clear();
        self
    }

    pub fn kind(mut self, kind: QueryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    // ------------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------------

    fn resolve_condition(&self, mut condition: Condition) -> Condition {
        let tables = self.tables();
        if !condition.field.resolve(|name| field::find_field(&tables, name)) {
            log::warn!("condition field {} unresolved", condition.field.key());
        }
        condition
    }

    /// Adds a condition, AND-joined unless it carries its own connector.
    pub fn filter(mut self, condition: Condition) -> Self {
        let condition = self.resolve_condition(condition);
        self.wheres.add(condition);
        self
    }

    pub fn and(self, condition: Condition) -> Self {
        self.filter(condition.and())
    }

    pub fn or(self, condition: Condition) -> Self {
        self.filter(condition.or())
    }

    /// Adopts conditions decoded from JSON.
    pub fn filter_json(mut self, value: &Value) -> Result<Self, Error> {
        for condition in Wheres::from_json(value)? {
            self = self.filter(condition);
        }
        Ok(self)
    }

    /// Adopts an already built list, keeping its connectors.
    pub fn filters(mut self, wheres: Wheres) -> Self {
        for condition in wheres {
            self = self.filter(condition);
        }
        self
    }

    pub fn group_by(mut self, names: &[&str]) -> Self {
        let fields = self.resolve_all(names, "group by");
        self.group_by.extend(fields);
        self
    }

    pub fn having(mut self, condition: Condition) -> Self {
        let condition = self.resolve_condition(condition);
        self.having.add(condition);
        self
    }

    pub fn order_by(mut self, names: &[&str]) -> Self {
        for field in self.resolve_all(names, "order by") {
            self.order_by.push(OrderBy { field, desc: false });
        }
        self
    }

    pub fn order_by_desc(mut self, names: &[&str]) -> Self {
        for field in self.resolve_all(names, "order by") {
            self.order_by.push(OrderBy { field, desc: true });
        }
        self
    }

    // ------------------------------------------------------------------------
    // Pagination
    // ------------------------------------------------------------------------

    /// 0 and 1 both address the first page.
    pub fn page(mut self, page: usize) -> Self {
        let max_rows = self.db.config.max_rows;
        let rows = self.pagination.map(|p| p.rows).unwrap_or(max_rows);
        self.pagination = Some(Pagination::new_with_limit(page, rows, max_rows));
        self
    }

    /// Clamped to `1..=max_rows`.
    pub fn rows(mut self, rows: usize) -> Self {
        let max_rows = self.db.config.max_rows;
        let page = self.pagination.map(|p| p.page).unwrap_or(0);
        self.pagination = Some(Pagination::new_with_limit(page, rows, max_rows));
        self
    }

    pub(crate) fn unbounded(mut self) -> Self {
        self.pagination = None;
        self
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Drops hidden fields from the projection, matched by table and alias.
    pub fn prepared(mut self) -> Self {
        let hidden = std::mem::take(&mut self.hidden);
        self.selects.retain(|s| !hidden.iter().any(|h| h.from == s.from && h.alias == s.alias));
        self.hidden = hidden;
        self
    }

    pub(crate) fn has_nested(&self) -> bool {
        matches!(self.kind, QueryKind::Select | QueryKind::Data)
            && !(self.details.is_empty() && self.rollups.is_empty() && self.calcs.is_empty())
    }

    pub fn to_sql(&self) -> Result<String, Error> {
        self.db.driver.render_query(self)
    }

    pub async fn all(self) -> Result<Vec<Row>, Error> {
        let ql = self.prepared();
        ql.db.query(&ql, None).await
    }

    pub async fn all_tx(self, tx: &Tx) -> Result<Vec<Row>, Error> {
        let ql = self.prepared();
        ql.db.query(&ql, Some(tx)).await
    }

    pub async fn first(self) -> Result<Option<Row>, Error> {
        Ok(self.rows(1).all().await?.into_iter().next())
    }

    /// Number of matching rows.
    pub async fn count(self) -> Result<i64, Error> {
        let ql = self.kind(QueryKind::Count).unbounded();
        let rows = ql.db.query(&ql, None).await?;
        Ok(rows.first().and_then(|r| r.get("count")).and_then(Value::as_i64).unwrap_or(0))
    }

    pub async fn exists(self) -> Result<bool, Error> {
        self.exists_in(None).await
    }

    pub(crate) async fn exists_in(self, tx: Option<&Tx>) -> Result<bool, Error> {
        let ql = self.kind(QueryKind::Exists).unbounded();
        let rows = ql.db.query(&ql, tx).await?;
        Ok(rows.first().and_then(|r| r.get("exists")).and_then(Value::as_bool).unwrap_or(false))
    }

    /// Count plus one page of rows.
    pub async fn paginate(self, page: usize, rows: usize) -> Result<Paginated<Row>, Error> {
        let max_rows = self.db.config.max_rows;
        Pagination::new_with_limit(page, rows, max_rows).paginate(self).await
    }
}

impl std::fmt::Debug for Ql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ql")
            .field("kind", &self.kind)
            .field("froms", &self.froms)
            .field("selects", &self.selects)
            .field("wheres", &self.wheres)
            .field("pagination", &self.pagination)
            .finish()
    }
}
