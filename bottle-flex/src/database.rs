//! # Database Module
//!
//! Connection management, the model registry and the execution layer.
//!
//! A `Database` pairs a [`Driver`] (which renders SQL) with a [`Connection`]
//! (which runs it). Every statement goes through [`Database::fetch_all`],
//! which logs it, runs it inside the caller's [`Tx`] when one is given, and
//! collapses single-object result rows. Query results are then enriched per
//! row with details, rollups and computed values.

// ============================================================================
// External Crate Imports
// ============================================================================

use futures::future::{BoxFuture, join_all};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, RwLock};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    Error,
    command::{Cmd, CommandKind},
    condition::Wheres,
    driver::{Driver, DriverRegistry},
    field::Field,
    migration::Migrator,
    model::Model,
    query::Ql,
    row::{self, Row},
    transaction::Tx,
};

// ============================================================================
// Connection Traits
// ============================================================================

/// Raw statement execution against a server.
///
/// Implementations return each result row as a column-name to value map.
pub trait Connection: Send + Sync {
    fn fetch_all<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<Row>, sqlx::Error>>;
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn Session>, sqlx::Error>>;
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// An open server-side transaction.
pub trait Session: Send {
    fn fetch_all<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<Vec<Row>, sqlx::Error>>;
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), sqlx::Error>>;
    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), sqlx::Error>>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings shared by every builder created from a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: Option<String>,
    pub driver: String,
    pub max_connections: u32,
    /// Upper bound for rows per page.
    pub max_rows: usize,
    /// Rows per page for details without explicit pagination.
    pub detail_rows: usize,
    /// Install and maintain the `core` change-tracking objects.
    pub use_core: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: None,
            driver: "postgres".to_string(),
            max_connections: 5,
            max_rows: 100,
            detail_rows: 30,
            use_core: false,
        }
    }
}

// ============================================================================
// Database Struct
// ============================================================================

/// A named database: driver, optional live connection, config and models.
///
/// Cheap to clone; clones share the connection and the model registry.
#[derive(Clone)]
pub struct Database {
    pub(crate) name: String,
    pub(crate) conn: Option<Arc<dyn Connection>>,
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) config: Config,
    pub(crate) models: Arc<RwLock<IndexMap<String, Arc<Model>>>>,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Connects with default settings using the built-in drivers.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        DatabaseBuilder::new().connect(url).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn connection(&self) -> Result<&Arc<dyn Connection>, Error> {
        self.conn.as_ref().ok_or(Error::DatabaseRequired)
    }

    pub fn migrator(&self) -> Migrator<'_> {
        Migrator::new(self)
    }

    /// Starts a transaction. Nothing is sent until the first statement.
    pub fn begin(&self) -> Tx {
        Tx::new()
    }

    pub async fn close(&self) {
        if let Some(conn) = &self.conn {
            conn.close().await;
            log::info!("database {} closed", self.name);
        }
    }

    // ------------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------------

    /// Adds a model to the registry, keyed by `schema.name`, without touching
    /// the server.
    pub fn register(&self, model: Model) -> Arc<Model> {
        let model = Arc::new(model);
        let mut models = self.models.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        models.insert(model.table(), model.clone());
        model
    }

    /// Looks a model up by `schema.name`, or by bare `name` when exactly one
    /// schema holds a model with that name.
    pub fn model(&self, name: &str) -> Result<Arc<Model>, Error> {
        let models = self.models.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if name.contains('.') {
            return models.get(name).cloned().ok_or_else(|| Error::ModelNotFound(name.to_string()));
        }

        let mut found = models.values().filter(|m| m.name == name);
        match (found.next(), found.next()) {
            (Some(model), None) => Ok(model.clone()),
            (Some(_), Some(_)) => {
                log::warn!("model {} exists in several schemas, qualify it", name);
                Err(Error::ModelNotFound(name.to_string()))
            }
            _ => Err(Error::ModelNotFound(name.to_string())),
        }
    }

    pub fn models(&self) -> Vec<Arc<Model>> {
        let models = self.models.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        models.values().cloned().collect()
    }

    /// Checks whether the model's table already exists.
    pub async fn table_exists(&self, model: &Model) -> Result<bool, Error> {
        let sql = self.driver.render_table_exists(model);
        let rows = self.fetch_all(None, &sql).await?;
        Ok(rows.first().and_then(|r| r.get("exists")).and_then(Value::as_bool).unwrap_or(false))
    }

    /// Creates the model's schema objects if the table is missing, then registers it.
    pub async fn load(&self, model: Model) -> Result<Arc<Model>, Error> {
        if self.table_exists(&model).await? {
            log::debug!("model {} already present", model.table());
            return Ok(self.register(model));
        }

        let ddl = self.driver.render_ddl(&model, self.config.use_core)?;
        self.fetch_all(None, &ddl).await?;
        log::info!("model {} loaded", model.table());
        Ok(self.register(model))
    }

    /// Installs the `core` change-tracking schema.
    pub async fn init_core(&self) -> Result<(), Error> {
        let sql = self.driver.render_core();
        self.fetch_all(None, &sql).await?;
        log::info!("core schema ready on {}", self.name);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    /// Starts a query over `model` under `alias`.
    pub fn from(&self, model: &Arc<Model>, alias: &str) -> Ql {
        Ql::new(self.clone(), model.clone(), alias)
    }

    /// Starts a query over `model` (alias `A`) selecting `fields`.
    pub fn select(&self, model: &Arc<Model>, fields: &[&str]) -> Ql {
        self.from(model, "A").select(fields)
    }

    pub fn insert(&self, model: &Arc<Model>, data: Row) -> Cmd {
        Cmd::new(self.clone(), model.clone(), CommandKind::Insert).data(data)
    }

    pub fn update(&self, model: &Arc<Model>, data: Row) -> Cmd {
        Cmd::new(self.clone(), model.clone(), CommandKind::Update).data(data)
    }

    pub fn delete(&self, model: &Arc<Model>) -> Cmd {
        Cmd::new(self.clone(), model.clone(), CommandKind::Delete)
    }

    pub fn upsert(&self, model: &Arc<Model>, data: Row) -> Cmd {
        Cmd::new(self.clone(), model.clone(), CommandKind::Upsert).data(data)
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Runs one statement, inside `tx` when given.
    ///
    /// A failure inside a transaction rolls it back before the error returns.
    pub async fn fetch_all(&self, tx: Option<&Tx>, sql: &str) -> Result<Vec<Row>, Error> {
        let conn = self.connection()?;
        log::debug!("{}", sql);

        let rows = match tx {
            Some(tx) => match tx.fetch_all(conn.as_ref(), sql).await {
                Ok(rows) => rows,
                Err(err) => {
                    if let Err(rollback) = tx.rollback().await {
                        log::error!("rollback {} failed: {}", tx.id, rollback);
                    }
                    return Err(err);
                }
            },
            None => conn.fetch_all(sql).await.map_err(|source| Error::Sql { sql: sql.to_string(), source })?,
        };

        Ok(rows.into_iter().map(row::collapse).collect())
    }

    /// Runs a prepared query and fills in details, rollups and calcs per row.
    ///
    /// Rows are enriched concurrently; output order matches the main query.
    pub fn query<'a>(&'a self, ql: &'a Ql, tx: Option<&'a Tx>) -> BoxFuture<'a, Result<Vec<Row>, Error>> {
        Box::pin(async move {
            let sql = self.driver.render_query(ql)?;
            if ql.debug {
                log::info!("{}", sql);
            }

            let rows = self.fetch_all(tx, &sql).await?;
            if !ql.has_nested() {
                return Ok(rows);
            }

            let tasks = rows.into_iter().map(|mut row| async move {
                self.resolve_nested(ql, tx, &mut row).await;
                row
            });
            Ok(join_all(tasks).await)
        })
    }

    async fn resolve_nested(&self, ql: &Ql, tx: Option<&Tx>, row: &mut Row) {
        for detail in &ql.details {
            match self.fetch_detail(detail, tx, row).await {
                Ok(items) => {
                    row.insert(detail.alias.clone(), Value::Array(items.into_iter().map(Value::Object).collect()));
                }
                Err(err) => log::error!("detail {} failed: {}", detail.alias, err),
            }
        }

        for rollup in &ql.rollups {
            match self.fetch_rollup(rollup, tx, row).await {
                Ok(value) => {
                    row.insert(rollup.alias.clone(), value);
                }
                Err(err) => log::error!("rollup {} failed: {}", rollup.alias, err),
            }
        }

        for calc in &ql.calcs {
            let handler = ql.froms.iter().find(|f| Some(&f.alias) == calc.from.as_ref()).and_then(|f| f.model.calc(&calc.name));
            match handler {
                Some(handler) => handler(tx, row),
                None => log::warn!("calc {} has no handler", calc.name),
            }
        }
    }

    /// `None` when the row does not carry the parent side of the keys, so
    /// no related rows can be told apart.
    fn nested_query(&self, field: &Field, row: &Row) -> Result<Option<Ql>, Error> {
        let to = field.to.as_deref().ok_or_else(|| Error::ModelNotFound(field.name.clone()))?;
        let model = self.model(to)?;

        let Some(keys) = Wheres::by_keys(row, &field.keys) else {
            log::debug!("{} skipped, parent keys not selected", field.alias);
            return Ok(None);
        };

        let select: Vec<&str> = field.select.iter().map(String::as_str).collect();
        let mut ql = self.from(&model, "A");
        if !select.is_empty() {
            ql = ql.select(&select);
        }
        for condition in keys {
            ql = ql.filter(condition);
        }
        Ok(Some(ql))
    }

    async fn fetch_detail(&self, field: &Field, tx: Option<&Tx>, row: &Row) -> Result<Vec<Row>, Error> {
        let Some(ql) = self.nested_query(field, row)? else {
            return Ok(Vec::new());
        };
        let rows = if field.rows == 0 { self.config.detail_rows } else { field.rows };
        let ql = ql.page(field.page).rows(rows).prepared();
        self.query(&ql, tx).await
    }

    async fn fetch_rollup(&self, field: &Field, tx: Option<&Tx>, row: &Row) -> Result<Value, Error> {
        let first = match self.nested_query(field, row)? {
            Some(ql) => {
                let ql = ql.page(0).rows(1).prepared();
                self.query(&ql, tx).await?.into_iter().next()
            }
            None => None,
        };

        if field.select.len() == 1 {
            let value = first.and_then(|r| r.into_iter().next().map(|(_, v)| v));
            return Ok(value.unwrap_or_else(|| Value::String(String::new())));
        }
        Ok(Value::Object(first.unwrap_or_default()))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .field("connected", &self.conn.is_some())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// DatabaseBuilder Struct
// ============================================================================

pub struct DatabaseBuilder {
    name: String,
    config: Config,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self { name: "default".to_string(), config: Config::default() }
    }

    /// Reads `DATABASE_URL`, `DB_DRIVER`, `DB_MAX_CONNECTIONS`, `MAX_ROWS`,
    /// `DETAIL_ROWS` and `DB_USE_CORE`. Missing or malformed values keep defaults.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        let config = &mut builder.config;
        config.url = std::env::var("DATABASE_URL").ok();
        if let Ok(driver) = std::env::var("DB_DRIVER") {
            config.driver = driver;
        }
        config.max_connections = env_parse("DB_MAX_CONNECTIONS", config.max_connections);
        config.max_rows = env_parse("MAX_ROWS", config.max_rows);
        config.detail_rows = env_parse("DETAIL_ROWS", config.detail_rows);
        config.use_core = env_parse("DB_USE_CORE", config.use_core);
        builder
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn driver(mut self, driver: &str) -> Self {
        self.config.driver = driver.to_string();
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.config.url = Some(url.to_string());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn max_rows(mut self, max: usize) -> Self {
        self.config.max_rows = max.max(1);
        self
    }

    pub fn detail_rows(mut self, rows: usize) -> Self {
        self.config.detail_rows = rows.max(1);
        self
    }

    pub fn use_core(mut self, enabled: bool) -> Self {
        self.config.use_core = enabled;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connects to `url` using the built-in driver registry.
    pub async fn connect(self, url: &str) -> Result<Database, Error> {
        self.url(url).connect_with(&DriverRegistry::with_defaults()).await
    }

    /// Connects using a driver looked up in `registry`.
    pub async fn connect_with(self, registry: &DriverRegistry) -> Result<Database, Error> {
        let driver = registry.get(&self.config.driver)?;
        let conn = driver.connect(&self.config).await?;
        log::info!("database {} connected with {}", self.name, driver.name());

        let db = self.build(Some(conn), driver);
        if db.config.use_core {
            db.init_core().await?;
        }
        Ok(db)
    }

    /// A database over an existing connection.
    pub fn with_connection(self, conn: Arc<dyn Connection>, driver: Arc<dyn Driver>) -> Database {
        self.build(Some(conn), driver)
    }

    /// A database that can render SQL but not execute it.
    pub fn detached(self, driver: Arc<dyn Driver>) -> Database {
        self.build(None, driver)
    }

    fn build(self, conn: Option<Arc<dyn Connection>>, driver: Arc<dyn Driver>) -> Database {
        Database { name: self.name, conn, driver, config: self.config, models: Arc::new(RwLock::new(IndexMap::new())) }
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
