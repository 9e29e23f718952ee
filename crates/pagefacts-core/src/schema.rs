//! Schema documents: a closed model of the JSON-Schema subset that drives
//! flattening.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// The declared type of a scalar node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarType {
  /// JSON-Schema `type`, e.g. `"string"` or `"integer"`.
  pub json_type: String,
  /// JSON-Schema `format`, e.g. `"date"` or `"email"`.
  pub format:    Option<String>,
}

impl ScalarType {
  pub fn new(json_type: impl Into<String>, format: Option<&str>) -> Self {
    Self { json_type: json_type.into(), format: format.map(str::to_owned) }
  }
}

/// One node of a schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaNode {
  Object {
    properties: BTreeMap<String, SchemaNode>,
  },
  /// Tuple-typed `items` collapse to their first entry; every element is
  /// flattened against the same item schema.
  Array {
    items: Option<Box<SchemaNode>>,
  },
  Scalar(ScalarType),
}

impl SchemaNode {
  /// Build a node tree from a JSON-Schema document.
  pub fn from_json(doc: &Value) -> Result<Self> {
    let Value::Object(map) = doc else {
      return Err(Error::InvalidSchema(format!(
        "expected a schema object, found {doc}"
      )));
    };

    let declared = match map.get("type") {
      Some(Value::String(t)) => Some(t.as_str()),
      // `["string", "null"]`: the first non-null entry wins.
      Some(Value::Array(types)) => types
        .iter()
        .filter_map(Value::as_str)
        .find(|t| *t != "null"),
      Some(other) => {
        return Err(Error::InvalidSchema(format!("invalid `type`: {other}")));
      }
      None => None,
    };

    let is_object = declared == Some("object")
      || (declared.is_none() && map.contains_key("properties"));
    let is_array = declared == Some("array")
      || (declared.is_none() && map.contains_key("items"));

    if is_object {
      let mut properties = BTreeMap::new();
      if let Some(Value::Object(props)) = map.get("properties") {
        for (key, child) in props {
          properties.insert(key.clone(), Self::from_json(child)?);
        }
      }
      return Ok(Self::Object { properties });
    }

    if is_array {
      let items = match map.get("items") {
        Some(Value::Array(tuple)) => tuple.first(),
        Some(other) => Some(other),
        None => None,
      }
      .map(Self::from_json)
      .transpose()?
      .map(Box::new);
      return Ok(Self::Array { items });
    }

    let format = map.get("format").and_then(Value::as_str);
    Ok(Self::Scalar(ScalarType::new(declared.unwrap_or("string"), format)))
  }

  /// Child node for an object key.
  pub fn property(&self, key: &str) -> Option<&SchemaNode> {
    match self {
      Self::Object { properties } => properties.get(key),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn parses_nested_document() {
    let doc = json!({
      "type": "object",
      "properties": {
        "title": { "type": "string" },
        "published": { "type": "string", "format": "date" },
        "authors": {
          "type": "array",
          "items": {
            "type": "object",
            "properties": { "first_name": { "type": "string" } }
          }
        }
      }
    });
    let node = SchemaNode::from_json(&doc).unwrap();

    assert_eq!(
      node.property("published"),
      Some(&SchemaNode::Scalar(ScalarType::new("string", Some("date"))))
    );
    let Some(SchemaNode::Array { items: Some(items) }) = node.property("authors")
    else {
      panic!("authors should be an array");
    };
    assert!(items.property("first_name").is_some());
  }

  #[test]
  fn nullable_type_list_uses_first_concrete_type() {
    let node =
      SchemaNode::from_json(&json!({ "type": ["null", "integer"] })).unwrap();
    assert_eq!(node, SchemaNode::Scalar(ScalarType::new("integer", None)));
  }

  #[test]
  fn tuple_items_use_first_entry() {
    let node = SchemaNode::from_json(&json!({
      "type": "array",
      "items": [{ "type": "integer" }, { "type": "string" }]
    }))
    .unwrap();
    assert_eq!(node, SchemaNode::Array {
      items: Some(Box::new(SchemaNode::Scalar(ScalarType::new("integer", None)))),
    });
  }

  #[test]
  fn untyped_defaults_to_string() {
    let node = SchemaNode::from_json(&json!({})).unwrap();
    assert_eq!(node, SchemaNode::Scalar(ScalarType::new("string", None)));
  }

  #[test]
  fn rejects_non_object_document() {
    assert!(SchemaNode::from_json(&json!("string")).is_err());
  }
}
