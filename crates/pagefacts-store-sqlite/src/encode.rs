//! Conversions between core values and what SQLite columns hold.
//!
//! Timestamps are RFC 3339 strings. Booleans are stored as 0/1 integers;
//! temporal classes as normalised text.

use chrono::{DateTime, Utc};
use pagefacts_core::types::{StorageClass, TypedValue};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn now() -> String { encode_dt(Utc::now()) }

// ─── Storage classes ─────────────────────────────────────────────────────────

pub fn decode_class(id: i64) -> Result<StorageClass> {
  StorageClass::from_id(id).ok_or(Error::UnknownStorageClass(id))
}

// ─── Values ──────────────────────────────────────────────────────────────────

pub fn encode_value(value: &TypedValue) -> SqlValue {
  match value {
    TypedValue::Text(s) => SqlValue::Text(s.clone()),
    TypedValue::Integer(i) => SqlValue::Integer(*i),
    TypedValue::Numeric(f) => SqlValue::Real(*f),
    TypedValue::Boolean(b) => SqlValue::Integer(i64::from(*b)),
  }
}

/// Turn a stored column value back into JSON for its class.
pub fn decode_value(class: StorageClass, value: SqlValue) -> Value {
  match (class, value) {
    (_, SqlValue::Null) => Value::Null,
    (StorageClass::Boolean, SqlValue::Integer(i)) => Value::Bool(i != 0),
    (_, SqlValue::Integer(i)) => Value::from(i),
    (_, SqlValue::Real(f)) => Value::from(f),
    (class, SqlValue::Text(s)) => class.decode_text(&s),
    (_, SqlValue::Blob(b)) => Value::String(String::from_utf8_lossy(&b).into_owned()),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn booleans_round_trip_through_integers() {
    let stored = encode_value(&TypedValue::Boolean(true));
    assert_eq!(stored, SqlValue::Integer(1));
    assert_eq!(decode_value(StorageClass::Boolean, stored), json!(true));
  }

  #[test]
  fn unknown_class_id_is_an_error() {
    assert!(matches!(decode_class(9), Err(Error::UnknownStorageClass(9))));
    assert_eq!(decode_class(3).unwrap(), StorageClass::Date);
  }
}
