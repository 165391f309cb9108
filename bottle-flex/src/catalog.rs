//! # Catalog Module
//!
//! Persistent storage for definitions keyed by `(type, id)`.
//!
//! Model definitions are saved as their serde JSON form. Hooks and calc
//! handlers are code and are not persisted; attach them again after a
//! restore.

// ============================================================================
// External Crate Imports
// ============================================================================

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    Error,
    column::{CREATED_AT, DataType, UPDATED_AT},
    condition::eq,
    database::Database,
    model::Model,
    row::Row,
};

/// Catalog entry type for model definitions.
pub const MODEL: &str = "model";

/// Keyed definition storage.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get(&self, kind: &str, id: &str) -> Result<Option<Value>, Error>;

    async fn set(&self, kind: &str, id: &str, version: i32, definition: Value) -> Result<(), Error>;

    /// Returns whether an entry was removed.
    async fn delete(&self, kind: &str, id: &str) -> Result<bool, Error>;
}

// ============================================================================
// MemoryCatalog
// ============================================================================

/// Process-local catalog, mostly for tests and detached databases.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get(&self, kind: &str, id: &str) -> Result<Option<Value>, Error> {
        Ok(self.entries.read().await.get(&(kind.to_string(), id.to_string())).cloned())
    }

    async fn set(&self, kind: &str, id: &str, _version: i32, definition: Value) -> Result<(), Error> {
        self.entries.write().await.insert((kind.to_string(), id.to_string()), definition);
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<bool, Error> {
        Ok(self.entries.write().await.remove(&(kind.to_string(), id.to_string())).is_some())
    }
}

// ============================================================================
// TableCatalog
// ============================================================================

/// Catalog stored in the `core.catalog` table of a database.
#[derive(Debug, Clone)]
pub struct TableCatalog {
    db: Database,
    model: Arc<Model>,
}

impl TableCatalog {
    /// The `core.catalog` model definition.
    pub fn definition() -> Result<Model, Error> {
        let mut model = Model::new("core", "catalog", 1);
        model.define_column(CREATED_AT, DataType::DateTime, Value::Null)?;
        model.define_column(UPDATED_AT, DataType::DateTime, Value::Null)?;
        model.define_column("type", DataType::Key, Value::Null)?;
        model.define_column("id", DataType::Key, Value::Null)?;
        model.define_column("version", DataType::Int, Value::Null)?;
        model.define_column("definition", DataType::Json, Value::Null)?;
        model.define_primary_keys(&["type", "id"]);
        model.is_locked = true;
        model.is_core = true;
        Ok(model)
    }

    /// Loads the catalog table, creating it when missing.
    pub async fn open(db: &Database) -> Result<Self, Error> {
        let model = db.load(Self::definition()?).await?;
        Ok(Self { db: db.clone(), model })
    }

    /// Uses an already registered catalog model without touching the server.
    pub fn attach(db: &Database) -> Result<Self, Error> {
        let model = match db.model("core.catalog") {
            Ok(model) => model,
            Err(_) => db.register(Self::definition()?),
        };
        Ok(Self { db: db.clone(), model })
    }
}

#[async_trait]
impl Catalog for TableCatalog {
    async fn get(&self, kind: &str, id: &str) -> Result<Option<Value>, Error> {
        let row = self
            .db
            .select(&self.model, &["definition", "version"])
            .filter(eq("type", kind))
            .and(eq("id", id))
            .first()
            .await?;
        Ok(row.and_then(|mut r| r.remove("definition")))
    }

    async fn set(&self, kind: &str, id: &str, version: i32, definition: Value) -> Result<(), Error> {
        let mut data = Row::new();
        data.insert("type".to_string(), json!(kind));
        data.insert("id".to_string(), json!(id));
        data.insert("version".to_string(), json!(version));
        data.insert("definition".to_string(), definition);
        self.db
            .upsert(&self.model, data)
            .before(|_, _, new| {
                new.insert(UPDATED_AT.to_string(), json!(chrono::Utc::now().naive_utc().to_string()));
                Ok(())
            })
            .exec()
            .await?;
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<bool, Error> {
        let removed = self.db.delete(&self.model).filter(eq("type", kind)).and(eq("id", id)).exec().await?;
        Ok(!removed.is_empty())
    }
}

// ============================================================================
// Database helpers
// ============================================================================

impl Database {
    /// Stores the definition of `model` under its table name.
    pub async fn save_model(&self, catalog: &dyn Catalog, model: &Model) -> Result<(), Error> {
        let definition = serde_json::to_value(model)?;
        catalog.set(MODEL, &model.table(), model.version, definition).await?;
        log::info!("model {} saved to catalog", model.table());
        Ok(())
    }

    /// Reads a definition saved with [`save_model`](Self::save_model) and
    /// registers it. `table` is `schema.name`.
    pub async fn restore_model(&self, catalog: &dyn Catalog, table: &str) -> Result<Arc<Model>, Error> {
        let definition = catalog.get(MODEL, table).await?.ok_or_else(|| Error::ModelNotFound(table.to_string()))?;
        let model: Model = serde_json::from_value(definition)?;
        log::info!("model {} restored from catalog", model.table());
        Ok(self.register(model))
    }
}
