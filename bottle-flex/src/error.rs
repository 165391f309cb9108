//! # Error Module
//!
//! Crate-wide error type. Resolution misses are not errors and are reported
//! through `Option` or unresolved field references; everything that aborts an
//! operation ends up here.

use thiserror::Error;

/// Errors produced by bottle-flex.
#[derive(Debug, Error)]
pub enum Error {
    #[error("name required")]
    NameRequired,

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("attribute {0} required")]
    AttributeRequired(String),

    #[error("driver not found: {0}")]
    DriverNotFound(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// The builder has no backing connection to execute against.
    #[error("database required")]
    DatabaseRequired,

    #[error("from required")]
    FromRequired,

    #[error("data required")]
    DataRequired,

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A condition still references a name that matched no column.
    #[error("unresolved field: {0}")]
    UnresolvedField(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// A hook rejected the row.
    #[error("hook failed: {0}")]
    Hook(String),

    /// Statement failed on the server. Carries the rendered SQL.
    #[error("{source}\nsql: {sql}")]
    Sql {
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Convenience constructor for hook rejections.
    pub fn hook(message: impl Into<String>) -> Self {
        Error::Hook(message.into())
    }
}
