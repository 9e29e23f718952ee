//! Batch rebuild of the fact store from a directory of page documents.
//!
//! Each `*.json` file holds one [`PageDocument`]. Pages are processed in file
//! name order, one at a time, with no transaction spanning pages; an
//! interrupted run is resumed by running it again (optionally with `skip`).

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use pagefacts_core::{
  page::{PageId, PageRef},
  store::{FactStore, SchemaSource, record_document},
};
use pagefacts_store_sqlite::SqliteStore;
use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

/// A page as exported by the host: identity, categories and the data of
/// every schema bound to it.
#[derive(Debug, Deserialize)]
pub struct PageDocument {
  pub page_id:    PageId,
  pub title:      String,
  #[serde(default)]
  pub categories: Vec<String>,
  #[serde(default)]
  pub schemas:    BTreeMap<String, Value>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RebuildStats {
  pub pages:           usize,
  pub facts:           usize,
  pub warnings:        usize,
  /// Schema data skipped because no schema document was found.
  pub missing_schemas: usize,
}

/// Page documents under `dir`, sorted by file name.
pub fn page_files(dir: &Path) -> Result<Vec<PathBuf>> {
  let io = |source| Error::Io { path: dir.to_path_buf(), source };
  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir).map_err(io)? {
    let path = entry.map_err(io)?.path();
    if path.extension().is_some_and(|ext| ext == "json") {
      files.push(path);
    }
  }
  files.sort();
  Ok(files)
}

pub fn read_page(path: &Path) -> Result<PageDocument> {
  let raw = std::fs::read_to_string(path)
    .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
  serde_json::from_str(&raw)
    .map_err(|source| Error::PageDocument { path: path.to_path_buf(), source })
}

/// Record one page document, replacing what the store held for it.
pub async fn rebuild_page(
  store: &SqliteStore,
  schemas: &dyn SchemaSource,
  doc: PageDocument,
  stats: &mut RebuildStats,
) -> Result<()> {
  store
    .register_page(PageRef { page_id: doc.page_id, title: doc.title })
    .await?;
  store.set_page_categories(doc.page_id, doc.categories).await?;

  for (name, data) in &doc.schemas {
    let Some(schema) = schemas.schema(name) else {
      tracing::warn!(page_id = doc.page_id, schema = %name, "schema not found, skipping");
      stats.missing_schemas += 1;
      continue;
    };
    let outcome = record_document(store, doc.page_id, name, &schema, data).await?;
    stats.facts += outcome.facts_written;
    stats.warnings += outcome.warnings.len();
  }
  stats.pages += 1;
  Ok(())
}

/// Rebuild every page under `dir`, skipping the first `skip` files and
/// stopping after `limit` pages.
pub async fn rebuild(
  store: &SqliteStore,
  schemas: &dyn SchemaSource,
  dir: &Path,
  skip: usize,
  limit: Option<usize>,
) -> Result<RebuildStats> {
  let files = page_files(dir)?;
  let total = files.len();
  let mut stats = RebuildStats::default();

  let batch = files.into_iter().skip(skip).take(limit.unwrap_or(usize::MAX));
  for (i, path) in batch.enumerate() {
    let doc = read_page(&path)?;
    tracing::info!(
      file = %path.display(),
      page_id = doc.page_id,
      position = skip + i + 1,
      total,
      "rebuilding page"
    );
    rebuild_page(store, schemas, doc, &mut stats).await?;
  }

  tracing::info!(
    pages = stats.pages,
    facts = stats.facts,
    warnings = stats.warnings,
    missing_schemas = stats.missing_schemas,
    "rebuild finished"
  );
  Ok(stats)
}
