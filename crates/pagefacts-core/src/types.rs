//! Storage classes (the eight physical value tables) and the casts between
//! JSON values, condition strings and stored values.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::ScalarType;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const TIME_FORMAT: &str = "%H:%M:%S";

// ─── StorageClass ────────────────────────────────────────────────────────────

/// Physical value table a property is stored in. The discriminant is the
/// `table_id` persisted in `props` and `prop_tables`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
  Text     = 1,
  Textarea = 2,
  Date     = 3,
  Datetime = 4,
  Time     = 5,
  Integer  = 6,
  Numeric  = 7,
  Boolean  = 8,
}

impl StorageClass {
  pub const ALL: [StorageClass; 8] = [
    Self::Text,
    Self::Textarea,
    Self::Date,
    Self::Datetime,
    Self::Time,
    Self::Integer,
    Self::Numeric,
    Self::Boolean,
  ];

  pub fn id(self) -> i64 { self as i64 }

  pub fn from_id(id: i64) -> Option<Self> {
    Self::ALL.into_iter().find(|c| c.id() == id)
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::Text => "text",
      Self::Textarea => "textarea",
      Self::Date => "date",
      Self::Datetime => "datetime",
      Self::Time => "time",
      Self::Integer => "integer",
      Self::Numeric => "numeric",
      Self::Boolean => "boolean",
    }
  }

  /// Name of the value table holding facts of this class.
  pub fn table(self) -> &'static str {
    match self {
      Self::Text => "values_text",
      Self::Textarea => "values_textarea",
      Self::Date => "values_date",
      Self::Datetime => "values_datetime",
      Self::Time => "values_time",
      Self::Integer => "values_integer",
      Self::Numeric => "values_numeric",
      Self::Boolean => "values_boolean",
    }
  }

  /// Whether condition values are compared as quoted strings.
  pub fn is_textual(self) -> bool { matches!(self, Self::Text | Self::Textarea) }
}

impl fmt::Display for StorageClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Map a JSON-Schema `(type, format)` pair to a storage class.
///
/// For strings the format decides; unknown string formats fall back to text.
/// `month` and `week` land in the integer table as calendar positions (see
/// [`calendar_position`]). `None` means the property cannot be stored.
pub fn map_type(json_type: &str, format: Option<&str>) -> Option<StorageClass> {
  use StorageClass::*;

  match json_type {
    "string" => Some(match format {
      Some("number") => Numeric,
      Some("textarea") => Textarea,
      Some("date") => Date,
      Some("datetime" | "datetime-local" | "date-time") => Datetime,
      Some("time") => Time,
      Some("month" | "week") => Integer,
      Some("color" | "email" | "password" | "tel" | "url") => Text,
      _ => Text,
    }),
    "boolean" => Some(Boolean),
    "text" => Some(Text),
    "textarea" => Some(Textarea),
    "date" => Some(Date),
    "datetime" => Some(Datetime),
    "time" => Some(Time),
    "integer" => Some(Integer),
    "number" | "numeric" => Some(Numeric),
    _ => None,
  }
}

/// [`map_type`] for a parsed schema scalar.
pub fn map_scalar(scalar: &ScalarType) -> Option<StorageClass> {
  map_type(&scalar.json_type, scalar.format.as_deref())
}

// ─── TypedValue ──────────────────────────────────────────────────────────────

/// A value cast to the representation its storage class persists.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
  Text(String),
  Integer(i64),
  Numeric(f64),
  Boolean(bool),
}

impl TypedValue {
  pub fn to_json(&self) -> Value {
    match self {
      Self::Text(s) => Value::String(s.clone()),
      Self::Integer(i) => Value::from(*i),
      Self::Numeric(f) => Value::from(*f),
      Self::Boolean(b) => Value::Bool(*b),
    }
  }
}

impl StorageClass {
  /// Cast a flattened JSON value for writing. `None` means the value does not
  /// fit the class and must be skipped.
  pub fn cast(self, value: &Value) -> Option<TypedValue> {
    use StorageClass::*;

    match (self, value) {
      (_, Value::Null | Value::Array(_) | Value::Object(_)) => None,
      (Text | Textarea, Value::String(s)) => Some(TypedValue::Text(s.clone())),
      (Text | Textarea, other) => Some(TypedValue::Text(other.to_string())),
      (Integer, Value::Number(n)) => n
        .as_i64()
        .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
        .map(TypedValue::Integer),
      (Integer, Value::String(s)) => parse_integer(s).map(TypedValue::Integer),
      (Integer, Value::Bool(b)) => Some(TypedValue::Integer(i64::from(*b))),
      (Numeric, Value::Number(n)) => n.as_f64().map(TypedValue::Numeric),
      (Numeric, Value::String(s)) => {
        s.trim().parse().ok().map(TypedValue::Numeric)
      }
      (Numeric, Value::Bool(b)) => {
        Some(TypedValue::Numeric(if *b { 1.0 } else { 0.0 }))
      }
      (Boolean, Value::Bool(b)) => Some(TypedValue::Boolean(*b)),
      (Boolean, Value::Number(n)) => {
        n.as_f64().map(|f| TypedValue::Boolean(f != 0.0))
      }
      (Boolean, Value::String(s)) => parse_bool(s).map(TypedValue::Boolean),
      (Date | Datetime | Time, Value::String(s)) => {
        self.normalize_temporal(s).map(TypedValue::Text)
      }
      (Date | Datetime | Time, _) => None,
    }
  }

  /// Cast a query condition value.
  ///
  /// Unparsable temporal values fall back to the epoch (`1970-01-01`,
  /// `1970-01-01 00:00:00`, `00:00:00`) and are logged; unparsable numbers
  /// become zero and unparsable booleans `false`.
  pub fn cast_condition(self, raw: &str) -> TypedValue {
    use StorageClass::*;

    match self {
      Text | Textarea => TypedValue::Text(raw.to_owned()),
      Integer => TypedValue::Integer(parse_integer(raw).unwrap_or(0)),
      Numeric => TypedValue::Numeric(raw.trim().parse().unwrap_or(0.0)),
      Boolean => TypedValue::Boolean(parse_bool(raw).unwrap_or(false)),
      Date | Datetime | Time => {
        TypedValue::Text(self.normalize_temporal(raw).unwrap_or_else(|| {
          tracing::warn!(
            class = %self,
            value = raw,
            "unparsable condition value, falling back to epoch"
          );
          self.epoch().to_owned()
        }))
      }
    }
  }

  /// Convert a value read back as text (e.g. out of an aggregated JSON
  /// pair) into JSON.
  pub fn decode_text(self, raw: &str) -> Value {
    use StorageClass::*;

    match self {
      Integer => raw
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_owned())),
      Numeric => raw
        .parse::<f64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_owned())),
      Boolean => match raw {
        "1" | "true" => Value::Bool(true),
        "0" | "false" => Value::Bool(false),
        other => Value::String(other.to_owned()),
      },
      Text | Textarea | Date | Datetime | Time => Value::String(raw.to_owned()),
    }
  }

  fn epoch(self) -> &'static str {
    match self {
      Self::Date => "1970-01-01",
      Self::Time => "00:00:00",
      _ => "1970-01-01 00:00:00",
    }
  }

  fn normalize_temporal(self, raw: &str) -> Option<String> {
    let raw = raw.trim();
    match self {
      Self::Date => parse_datetime(raw)
        .map(|dt| dt.date())
        .map(|d| d.format(DATE_FORMAT).to_string()),
      Self::Datetime => {
        parse_datetime(raw).map(|dt| dt.format(DATETIME_FORMAT).to_string())
      }
      Self::Time => parse_time(raw).map(|t| t.format(TIME_FORMAT).to_string()),
      _ => None,
    }
  }
}

// ─── Parsing helpers ─────────────────────────────────────────────────────────

const NAIVE_DATETIME_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M",
  "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.naive_utc());
  }
  NAIVE_DATETIME_FORMATS
    .iter()
    .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
    .or_else(|| {
      DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
    })
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
  TIME_FORMATS
    .iter()
    .find_map(|f| NaiveTime::parse_from_str(raw, f).ok())
    .or_else(|| parse_datetime(raw).map(|dt| dt.time()))
}

fn parse_bool(raw: &str) -> Option<bool> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "true" | "1" | "yes" | "on" => Some(true),
    "false" | "0" | "no" | "off" | "" => Some(false),
    _ => None,
  }
}

fn parse_integer(raw: &str) -> Option<i64> {
  let raw = raw.trim();
  raw
    .parse::<i64>()
    .ok()
    .or_else(|| calendar_position(raw))
    .or_else(|| raw.parse::<f64>().ok().map(|f| f.trunc() as i64))
}

/// Encode `month` (`YYYY-MM`) and `week` (`YYYY-Www`) input values as
/// sortable integers: `YYYY * 100 + MM` and `YYYY * 100 + ww`.
pub fn calendar_position(raw: &str) -> Option<i64> {
  let (year, rest) = raw.split_once('-')?;
  let year: i64 = year.parse().ok()?;
  let (number, max) = match rest.strip_prefix('W') {
    Some(week) => (week, 53),
    None => (rest, 12),
  };
  let number: i64 = number.parse().ok()?;
  (1..=max).contains(&number).then_some(year * 100 + number)
}
