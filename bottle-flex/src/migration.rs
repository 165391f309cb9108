//! # Migration Module
//!
//! Queues models and loads them in registration order. Loading creates the
//! schema objects of any model whose table is missing and registers every
//! model with the database, existing table or not.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{Error, database::Database, model::{Entity, Model}};

/// A queued migration step.
///
/// Each task receives a clone of the database and resolves to the registered model.
pub type MigrationTask = Box<dyn FnOnce(Database) -> BoxFuture<'static, Result<Arc<Model>, Error>> + Send>;

/// Schema migration manager.
pub struct Migrator<'a> {
    pub(crate) db: &'a Database,
    pub(crate) tasks: Vec<MigrationTask>,
}

impl<'a> Migrator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db, tasks: Vec::new() }
    }

    /// Queues a model built by hand.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let mut users = Model::new("app", "users", 1);
    /// users.define_model()?;
    ///
    /// db.migrator().register(users).register_entity::<Order>().run().await?;
    /// ```
    pub fn register(mut self, model: Model) -> Self {
        self.tasks.push(Box::new(move |db: Database| -> BoxFuture<'static, Result<Arc<Model>, Error>> {
            Box::pin(async move { db.load(model).await })
        }));
        self
    }

    /// Queues the model described by `T`.
    pub fn register_entity<T>(mut self) -> Self
    where
        T: Entity + 'static,
    {
        self.tasks.push(Box::new(|db: Database| -> BoxFuture<'static, Result<Arc<Model>, Error>> {
            Box::pin(async move { db.load(Model::of::<T>()?).await })
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every queued task in order. Stops at the first failure.
    pub async fn run(self) -> Result<Vec<Arc<Model>>, Error> {
        let mut loaded = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            loaded.push(task(self.db.clone()).await?);
        }
        log::info!("{} models migrated on {}", loaded.len(), self.db.name());
        Ok(loaded)
    }
}
