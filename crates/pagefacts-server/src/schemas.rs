//! [`DirSchemaSource`]: schema documents read from `<dir>/<Name>.json`.

use std::{
  collections::HashMap,
  path::PathBuf,
  sync::{Arc, RwLock},
};

use pagefacts_core::{schema::SchemaNode, store::SchemaSource};
use serde_json::Value;

use crate::{Error, Result};

/// Loads schemas lazily from a directory and keeps them for the process
/// lifetime. [`DirSchemaSource::reload`] forgets everything loaded so far.
#[derive(Debug)]
pub struct DirSchemaSource {
  dir:   PathBuf,
  cache: RwLock<HashMap<String, Arc<SchemaNode>>>,
}

impl DirSchemaSource {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into(), cache: RwLock::default() }
  }

  /// Read and parse `name`, bypassing the cache.
  pub fn load(&self, name: &str) -> Result<SchemaNode> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
      return Err(pagefacts_core::Error::SchemaNotFound(name.to_owned()).into());
    }
    let path = self.dir.join(format!("{name}.json"));
    let raw = match std::fs::read_to_string(&path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(pagefacts_core::Error::SchemaNotFound(name.to_owned()).into());
      }
      Err(source) => return Err(Error::Io { path, source }),
    };
    let doc: Value = serde_json::from_str(&raw).map_err(pagefacts_core::Error::from)?;
    Ok(SchemaNode::from_json(&doc)?)
  }

  pub fn reload(&self) {
    self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
  }
}

impl SchemaSource for DirSchemaSource {
  fn schema(&self, name: &str) -> Option<Arc<SchemaNode>> {
    if let Some(hit) = self.cache.read().unwrap_or_else(|e| e.into_inner()).get(name) {
      return Some(hit.clone());
    }
    match self.load(name) {
      Ok(node) => {
        let node = Arc::new(node);
        self
          .cache
          .write()
          .unwrap_or_else(|e| e.into_inner())
          .insert(name.to_owned(), node.clone());
        tracing::debug!(schema = name, dir = %self.dir.display(), "loaded schema");
        Some(node)
      }
      Err(Error::Core(pagefacts_core::Error::SchemaNotFound(_))) => None,
      Err(e) => {
        tracing::warn!(schema = name, error = %e, "failed to load schema");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pagefacts-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn loads_and_caches_schema_files() {
    let dir = temp_dir("schemas");
    std::fs::write(
      dir.join("Book.json"),
      r#"{"type":"object","properties":{"title":{"type":"string"}}}"#,
    )
    .unwrap();

    let source = DirSchemaSource::new(&dir);
    let node = source.schema("Book").unwrap();
    assert!(node.property("title").is_some());

    std::fs::remove_file(dir.join("Book.json")).unwrap();
    assert!(source.schema("Book").is_some());
    source.reload();
    assert!(source.schema("Book").is_none());
  }

  #[test]
  fn rejects_names_escaping_the_directory() {
    let source = DirSchemaSource::new(temp_dir("escape"));
    assert!(matches!(
      source.load("../etc/passwd"),
      Err(Error::Core(pagefacts_core::Error::SchemaNotFound(_)))
    ));
    assert!(source.schema("").is_none());
  }

  #[test]
  fn malformed_documents_are_errors() {
    let dir = temp_dir("malformed");
    std::fs::write(dir.join("Bad.json"), "not json").unwrap();
    let source = DirSchemaSource::new(&dir);
    assert!(matches!(source.load("Bad"), Err(Error::Core(_))));
    assert!(source.schema("Bad").is_none());
  }
}
