//! # Postgres Executor
//!
//! Runs rendered SQL on a `PgPool` and decodes result rows into JSON maps.
//!
//! Statements go through `sqlx::raw_sql`, which uses the simple query
//! protocol: a rendered script may hold several statements (DDL batches) and
//! values come back in text format.

use futures::future::BoxFuture;
use serde_json::{Number, Value};
use sqlx::{
    Column, Postgres, Row as _, TypeInfo, ValueRef,
    postgres::{PgPool, PgPoolOptions, PgRow},
};

use crate::{
    Error,
    database::{Config, Connection, Session},
    row::Row,
};

// ============================================================================
// Pool
// ============================================================================

/// A pooled Postgres connection.
#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let url = config.url.as_deref().ok_or(Error::AttributeRequired("url".to_string()))?;
        let pool = PgPoolOptions::new().max_connections(config.max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Connection for PgExecutor {
    fn fetch_all<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<Row>, sqlx::Error>> {
        Box::pin(async move {
            let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
            rows.iter().map(decode_row).collect()
        })
    }

    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn Session>, sqlx::Error>> {
        Box::pin(async move {
            let tx = self.pool.begin().await?;
            Ok(Box::new(PgSession { tx }) as Box<dyn Session>)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.pool.close().await })
    }
}

// ============================================================================
// Transactions
// ============================================================================

struct PgSession {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl Session for PgSession {
    fn fetch_all<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<Vec<Row>, sqlx::Error>> {
        Box::pin(async move {
            let rows = sqlx::Executor::fetch_all(&mut *self.tx, sqlx::raw_sql(sql)).await?;
            rows.iter().map(decode_row).collect()
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
        Box::pin(async move { self.tx.commit().await })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
        Box::pin(async move { self.tx.rollback().await })
    }
}

// ============================================================================
// Row decoding
// ============================================================================

fn decode_row(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut result = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = if row.try_get_raw(idx)?.is_null() {
            Value::Null
        } else {
            decode_value(row, idx, column.type_info().name())?
        };
        result.insert(column.name().to_string(), value);
    }
    Ok(result)
}

fn decode_value(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "INT2" => Value::from(row.try_get::<i16, _>(idx)?),
        "INT4" => Value::from(row.try_get::<i32, _>(idx)?),
        "INT8" => Value::from(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => float(row.try_get::<f32, _>(idx)? as f64),
        "FLOAT8" => float(row.try_get::<f64, _>(idx)?),
        "NUMERIC" => numeric(&row.try_get_unchecked::<String, _>(idx)?),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx)?,
        "TIMESTAMPTZ" => Value::String(row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)?.to_rfc3339()),
        "TIMESTAMP" => Value::String(row.try_get::<chrono::NaiveDateTime, _>(idx)?.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        "DATE" => Value::String(row.try_get::<chrono::NaiveDate, _>(idx)?.to_string()),
        "UUID" => Value::String(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        "BYTEA" => Value::String(hex(&row.try_get::<Vec<u8>, _>(idx)?)),
        _ => Value::String(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn numeric(text: &str) -> Value {
    if let Ok(int) = text.parse::<i64>() {
        return Value::from(int);
    }
    text.parse::<f64>().map(float).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
