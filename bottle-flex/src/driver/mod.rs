//! # Driver Module
//!
//! A driver turns models, commands and queries into SQL text for one database
//! engine, and opens connections for it. Drivers are looked up by name in a
//! [`DriverRegistry`].

pub mod executor;
pub mod postgres;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    Error,
    command::Mutation,
    database::{Config, Connection},
    model::Model,
    query::Ql,
};

pub use executor::PgExecutor;
pub use postgres::PostgresDriver;

/// SQL rendering and connection factory for one engine.
#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self, config: &Config) -> Result<Arc<dyn Connection>, Error>;

    /// Guarded DDL creating the model's schema, table, indexes and triggers.
    fn render_ddl(&self, model: &Model, use_core: bool) -> Result<String, Error>;

    /// A statement returning one row with a boolean `exists` column.
    fn render_table_exists(&self, model: &Model) -> String;

    /// DDL for the change-tracking schema.
    fn render_core(&self) -> String;

    fn render_mutation(&self, mutation: &Mutation<'_>) -> Result<String, Error>;

    fn render_query(&self, ql: &Ql) -> Result<String, Error>;
}

/// Named drivers available to an application.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in drivers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PostgresDriver::new()));
        registry
    }

    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.insert(driver.name().to_string(), driver);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>, Error> {
        self.drivers.get(name).cloned().ok_or_else(|| Error::DriverNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }
}
