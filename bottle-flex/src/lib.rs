//! # Bottle Flex
//!
//! A schema-driven query and command layer on top of sqlx.
//!
//! Declare a [`Model`] (columns, keys, indexes, nested details and rollups,
//! computed values), register it with a [`Database`], then build reads with
//! [`Ql`] and writes with [`Cmd`]. Models with a JSON *source* column accept
//! attributes that were never declared: they are stored inside the document
//! on write and merged back into each row on read.
//!
//! # Example
//!
//! ```rust,ignore
//! use bottle_flex::{Database, DataType, Model, eq, json};
//!
//! let db = Database::connect("postgres://localhost/app").await?;
//!
//! let mut users = Model::new("app", "users", 1);
//! users.define_column("id", DataType::Key, json!(null))?;
//! users.define_column("name", DataType::Text, json!(null))?;
//! users.define_source_field("source")?;
//! users.define_primary_keys(&["id"]);
//! let users = db.load(users).await?;
//!
//! db.insert(&users, json!({"id": "u1", "name": "Ann", "tag": "vip"}).as_object().cloned().unwrap_or_default())
//!     .exec()
//!     .await?;
//!
//! let rows = db.from(&users, "A").filter(eq("id", "u1")).all().await?;
//! ```

pub mod catalog;
pub mod column;
pub mod command;
pub mod condition;
pub mod context;
pub mod database;
pub mod driver;
pub mod error;
pub mod field;
pub mod migration;
pub mod model;
pub mod pagination;
pub mod query;
pub mod request;
pub mod row;
pub mod transaction;

pub use bottle_flex_macro::Entity;
pub use serde_json::{Value, json};

pub use catalog::{Catalog, MemoryCatalog, TableCatalog};
pub use column::{Aggregation, Column, ColumnKind, DataType};
pub use command::{Cmd, CommandKind, Mutation};
pub use condition::{
    Condition, Connector, Operator, Wheres, between, eq, in_list, is, is_not, less, less_eq, like, more, more_eq, neg,
    not_between, not_in, not_null, null,
};
pub use context::Context;
pub use database::{Config, Connection, Database, DatabaseBuilder, Session};
pub use driver::{Driver, DriverRegistry, PgExecutor, PostgresDriver};
pub use error::Error;
pub use field::{Field, FieldRef, FromRef};
pub use migration::Migrator;
pub use model::{Entity, Model, Triggers};
pub use pagination::{Paginated, Pagination};
pub use query::{JoinKind, QueryKind, Ql};
pub use row::{Row, from_row, scan_as, to_row};
pub use transaction::Tx;
