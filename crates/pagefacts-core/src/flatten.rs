//! Schema flattener and its inverse.
//!
//! [`flatten`] walks a `(schema, data)` pair and emits one [`FlatFact`] per
//! scalar leaf, keyed by concrete path. [`plain_to_nested`] rebuilds the
//! nested document from such a path map.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
  path::{self, index_free_path},
  schema::{ScalarType, SchemaNode},
};

/// One scalar leaf of a flattened document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatFact {
  pub path_no_index: String,
  /// The schema fragment the value was flattened against.
  pub scalar:        ScalarType,
  pub value:         Value,
}

/// Flattened facts keyed by concrete path. The first segment of every path is
/// the (escaped) schema name.
pub type PropertySet = BTreeMap<String, FlatFact>;

/// Flatten `data` against `schema` under a schema name, e.g. `Book`.
pub fn flatten_document(
  schema_name: &str,
  schema: &SchemaNode,
  data: &Value,
) -> PropertySet {
  let root = path::escape(schema_name);
  flatten(schema, data, &root, &root)
}

/// Flatten `data` below the given path prefixes.
///
/// Keys absent from an object schema are skipped; empty arrays and nulls
/// produce nothing.
pub fn flatten(
  schema: &SchemaNode,
  data: &Value,
  path_prefix: &str,
  path_no_index_prefix: &str,
) -> PropertySet {
  let mut walker = Walker {
    no_index_prefix: path_no_index_prefix,
    arrays:          BTreeSet::new(),
    out:             PropertySet::new(),
  };
  walker.walk(schema, data, path_prefix, "");
  walker.out
}

struct Walker<'a> {
  no_index_prefix: &'a str,
  /// Concrete relative paths of every array descended into.
  arrays:          BTreeSet<String>,
  out:             PropertySet,
}

impl Walker<'_> {
  fn walk(&mut self, node: &SchemaNode, data: &Value, full: &str, rel: &str) {
    match (node, data) {
      (SchemaNode::Object { properties }, Value::Object(map)) => {
        for (key, value) in map {
          if let Some(child) = properties.get(key) {
            self.walk(child, value, &path::join(full, key), &path::join(rel, key));
          }
        }
      }
      (SchemaNode::Object { .. }, _) => {}
      (SchemaNode::Array { items: Some(items) }, Value::Array(elements)) => {
        self.walk_elements(items, elements, full, rel);
      }
      (SchemaNode::Array { .. }, _) => {}
      // Undeclared substructure below a scalar: keep walking with the same
      // scalar schema, keyed by the literal keys.
      (SchemaNode::Scalar(_), Value::Array(elements)) => {
        self.walk_elements(node, elements, full, rel);
      }
      (SchemaNode::Scalar(_), Value::Object(map)) => {
        for (key, value) in map {
          self.walk(node, value, &path::join(full, key), &path::join(rel, key));
        }
      }
      (SchemaNode::Scalar(_), Value::Null) => {}
      (SchemaNode::Scalar(scalar), leaf) => {
        let rel_no_index = index_free_path(rel, &self.arrays);
        let path_no_index = match (self.no_index_prefix, rel_no_index.as_str()) {
          (prefix, "") => prefix.to_owned(),
          ("", rest) => rest.to_owned(),
          (prefix, rest) => format!("{prefix}/{rest}"),
        };
        self.out.insert(full.to_owned(), FlatFact {
          path_no_index,
          scalar: scalar.clone(),
          value: leaf.clone(),
        });
      }
    }
  }

  fn walk_elements(
    &mut self,
    item: &SchemaNode,
    elements: &[Value],
    full: &str,
    rel: &str,
  ) {
    self.arrays.insert(rel.to_owned());
    for (i, element) in elements.iter().enumerate() {
      let index = i.to_string();
      self.walk(item, element, &path::join(full, &index), &path::join(rel, &index));
    }
  }
}

// ─── plain_to_nested ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Key {
  Index(u64),
  Name(String),
}

#[derive(Debug)]
enum Node {
  Leaf(Value),
  Branch(BTreeMap<Key, Node>),
}

/// Rebuild a nested document from `path → value` pairs.
///
/// `strip` leading segments are dropped from every path (pass `1` to drop
/// the schema name). Numeric segments become array positions. Arrays are
/// compacted, so `authors/1/first_name` alone yields a one-element array.
/// Other segments become (unescaped) object keys.
pub fn plain_to_nested<'a, I>(entries: I, strip: usize) -> Value
where
  I: IntoIterator<Item = (&'a str, Value)>,
{
  let mut root = BTreeMap::new();
  for (full, value) in entries {
    let segments: Vec<&str> = full.split(path::SEP).skip(strip).collect();
    if segments.is_empty() {
      continue;
    }
    insert(&mut root, &segments, value);
  }
  render(Node::Branch(root))
}

fn key_of(segment: &str) -> Key {
  if path::is_index(segment)
    && let Ok(i) = segment.parse()
  {
    return Key::Index(i);
  }
  Key::Name(path::unescape_segment(segment))
}

fn insert(branch: &mut BTreeMap<Key, Node>, segments: &[&str], value: Value) {
  let key = key_of(segments[0]);
  if segments.len() == 1 {
    // A branch already at this key keeps its children.
    branch.entry(key).or_insert(Node::Leaf(value));
    return;
  }
  let child = branch
    .entry(key)
    .or_insert_with(|| Node::Branch(BTreeMap::new()));
  if let Node::Leaf(_) = child {
    *child = Node::Branch(BTreeMap::new());
  }
  if let Node::Branch(children) = child {
    insert(children, &segments[1..], value);
  }
}

fn render(node: Node) -> Value {
  match node {
    Node::Leaf(value) => value,
    Node::Branch(children) => {
      let all_indices = !children.is_empty()
        && children.keys().all(|k| matches!(k, Key::Index(_)));
      if all_indices {
        Value::Array(children.into_values().map(render).collect())
      } else {
        let map: Map<String, Value> = children
          .into_iter()
          .map(|(k, v)| {
            let name = match k {
              Key::Index(i) => i.to_string(),
              Key::Name(n) => n,
            };
            (name, render(v))
          })
          .collect();
        Value::Object(map)
      }
    }
  }
}
