//! # Row Module
//!
//! Rows travel through the crate as ordered JSON objects. This module holds the
//! type alias plus the conversions between rows and serde types.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::Error;

/// A single record: column or attribute name to JSON value.
pub type Row = Map<String, Value>;

/// Collapses a row that holds exactly one JSON-object column into that object.
///
/// Data-mode statements return `SELECT ... AS result`; callers want the object
/// itself, not `{"result": {...}}`.
pub fn collapse(row: Row) -> Row {
    if row.len() != 1 {
        return row;
    }

    match row.into_iter().next() {
        Some((_, Value::Object(inner))) => inner,
        Some((key, other)) => {
            let mut row = Row::new();
            row.insert(key, other);
            row
        }
        None => Row::new(),
    }
}

/// Serializes a value into a row. Non-object values are rejected.
pub fn to_row<T: Serialize>(value: &T) -> Result<Row, Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidCommand(format!("expected an object, found {}", other))),
    }
}

/// Deserializes a row into a typed value.
pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, Error> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Deserializes a list of rows.
pub fn scan_as<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, Error> {
    rows.into_iter().map(from_row).collect()
}

/// Turns a JSON value into a row when it is an object.
pub(crate) fn as_row(value: &Value) -> Option<Row> {
    value.as_object().cloned()
}
