//! # Context Module
//!
//! An application-level registry of drivers and named databases. Replaces
//! process-wide state: create one `Context` at startup and pass it (or the
//! databases it hands out) to the code that needs them.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{
    Error,
    database::{Database, DatabaseBuilder},
    driver::{Driver, DriverRegistry},
};

#[derive(Default)]
pub struct Context {
    drivers: DriverRegistry,
    databases: RwLock<HashMap<String, Database>>,
}

impl Context {
    /// A context with the built-in drivers registered.
    pub fn init() -> Self {
        Self { drivers: DriverRegistry::with_defaults(), databases: RwLock::new(HashMap::new()) }
    }

    pub fn register_driver(&mut self, driver: Arc<dyn Driver>) {
        log::debug!("driver {} registered", driver.name());
        self.drivers.register(driver);
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Connects a database under `name`. Returns the existing one when the
    /// name is already taken.
    pub async fn connect(&self, name: &str, builder: DatabaseBuilder) -> Result<Database, Error> {
        if let Some(db) = self.databases.read().await.get(name) {
            return Ok(db.clone());
        }

        let db = builder.name(name).connect_with(&self.drivers).await?;
        let mut databases = self.databases.write().await;
        Ok(databases.entry(name.to_string()).or_insert(db).clone())
    }

    /// Adds an already built database, replacing any with the same name.
    pub async fn attach(&self, db: Database) {
        self.databases.write().await.insert(db.name().to_string(), db);
    }

    pub async fn database(&self, name: &str) -> Result<Database, Error> {
        self.databases.read().await.get(name).cloned().ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
    }

    pub async fn names(&self) -> Vec<String> {
        self.databases.read().await.keys().cloned().collect()
    }

    /// Closes every database and forgets them.
    pub async fn shutdown(&self) {
        let databases: Vec<Database> = self.databases.write().await.drain().map(|(_, db)| db).collect();
        for db in databases {
            db.close().await;
        }
        log::info!("context shut down");
    }
}
