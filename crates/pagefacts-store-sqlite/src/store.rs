//! [`SqliteStore`], the SQLite implementation of [`FactStore`].

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
  sync::Arc,
};

use rusqlite::{OptionalExtension as _, Transaction, params};
use serde_json::Value;

use pagefacts_core::{
  flatten::PropertySet,
  page::{PageId, PageRef},
  path,
  query::{Query, QueryResult},
  store::{
    FactStore, LinkType, NoopInvalidator, PageInvalidator, PropertyTemplate, RecordOutcome,
    RecordWarning, WarningKind,
  },
  types::{StorageClass, map_scalar},
};

use crate::{
  Result,
  encode::{decode_class, encode_value, now},
  query::QueryProcessor,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A pagefacts store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection and the invalidator are
/// reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:        tokio_rusqlite::Connection,
  invalidator: Arc<dyn PageInvalidator>,
}

/// A flattened fact whose storage class is known, waiting to be written.
struct PendingFact {
  path:          String,
  path_no_index: String,
  path_parent:   String,
  class:         StorageClass,
  value:         Value,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, invalidator: Arc::new(NoopInvalidator) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, invalidator: Arc::new(NoopInvalidator) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Purge pages through `invalidator` whenever facts they query change.
  pub fn with_invalidator(mut self, invalidator: Arc<dyn PageInvalidator>) -> Self {
    self.invalidator = invalidator;
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Every page id that has facts for at least one schema.
  pub async fn page_ids(&self) -> Result<Vec<PageId>> {
    let ids = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT DISTINCT page_id FROM schema_pages ORDER BY page_id")?;
        let ids = stmt
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<PageId>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

/// Insert the schema row if missing and return its id.
fn upsert_schema(tx: &Transaction<'_>, name: &str, now: &str) -> rusqlite::Result<i64> {
  tx.query_row(
    "INSERT INTO schemas (name, created_at, updated_at) VALUES (?1, ?2, ?2)
     ON CONFLICT(name) DO UPDATE SET updated_at = excluded.updated_at
     RETURNING id",
    params![name, now],
    |r| r.get(0),
  )
}

/// Remove every value of `schema_id` recorded for `page_id`.
fn delete_facts(tx: &Transaction<'_>, page_id: PageId, schema_id: i64) -> rusqlite::Result<()> {
  for class in StorageClass::ALL {
    tx.execute(
      &format!(
        "DELETE FROM {} WHERE page_id = ?1
         AND prop_id IN (SELECT id FROM props WHERE schema_id = ?2)",
        class.table()
      ),
      params![page_id, schema_id],
    )?;
  }
  Ok(())
}

fn schema_ids_of_page(tx: &Transaction<'_>, page_id: PageId) -> rusqlite::Result<Vec<i64>> {
  let mut stmt = tx.prepare("SELECT schema_id FROM schema_pages WHERE page_id = ?1")?;
  let ids = stmt
    .query_map([page_id], |r| r.get(0))?
    .collect::<rusqlite::Result<Vec<i64>>>()?;
  Ok(ids)
}

/// Write one schema's facts for a page, replacing what was there.
fn replace_schema_facts(
  tx: &Transaction<'_>,
  page_id: PageId,
  schema: &str,
  facts: &[PendingFact],
  now: &str,
) -> rusqlite::Result<(i64, RecordOutcome)> {
  let schema_id = upsert_schema(tx, schema, now)?;
  tx.execute(
    "INSERT INTO schema_pages (page_id, schema_id, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?3)
     ON CONFLICT(page_id, schema_id) DO UPDATE SET updated_at = excluded.updated_at",
    params![page_id, schema_id, now],
  )?;
  delete_facts(tx, page_id, schema_id)?;

  let mut outcome = RecordOutcome::default();
  for fact in facts {
    // The first registration of a shape fixes its class for every index.
    tx.execute(
      "INSERT INTO prop_tables (schema_id, table_id, path_no_index, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?4)
       ON CONFLICT(schema_id, path_no_index) DO NOTHING",
      params![schema_id, fact.class.id(), fact.path_no_index, now],
    )?;
    let table_id: i64 = tx.query_row(
      "SELECT table_id FROM prop_tables WHERE schema_id = ?1 AND path_no_index = ?2",
      params![schema_id, fact.path_no_index],
      |r| r.get(0),
    )?;
    let class = StorageClass::from_id(table_id).unwrap_or(fact.class);

    let prop_id: i64 = tx.query_row(
      "INSERT INTO props
         (schema_id, path, path_no_index, path_parent, table_id, created_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
       ON CONFLICT(schema_id, path) DO UPDATE SET table_id = excluded.table_id
       RETURNING id",
      params![
        schema_id,
        fact.path,
        fact.path_no_index,
        fact.path_parent,
        class.id(),
        now
      ],
      |r| r.get(0),
    )?;

    let Some(typed) = class.cast(&fact.value) else {
      tracing::warn!(page_id, path = %fact.path, %class, "value does not fit storage class");
      outcome.warnings.push(RecordWarning {
        path: fact.path.clone(),
        kind: WarningKind::UncastableValue { class, value: fact.value.clone() },
      });
      continue;
    };
    tx.execute(
      &format!(
        "INSERT INTO {} (page_id, prop_id, value, created_at) VALUES (?1, ?2, ?3, ?4)",
        class.table()
      ),
      params![page_id, prop_id, encode_value(&typed), now],
    )?;
    outcome.facts_written += 1;
  }

  Ok((schema_id, outcome))
}

// ─── FactStore impl ──────────────────────────────────────────────────────────

impl FactStore for SqliteStore {
  type Error = crate::Error;

  async fn record_properties(
    &self,
    page_id: PageId,
    schema_names: Vec<String>,
    facts: PropertySet,
  ) -> Result<RecordOutcome> {
    let mut outcome = RecordOutcome::default();
    // Named schemas are replaced even when they contribute no facts.
    let mut groups: BTreeMap<String, Vec<PendingFact>> =
      schema_names.into_iter().map(|name| (name, Vec::new())).collect();

    for (fact_path, fact) in facts {
      let schema = fact_path
        .split(path::SEP)
        .next()
        .map(path::unescape_segment)
        .unwrap_or_default();
      let pending = groups.entry(schema).or_default();

      let Some(class) = map_scalar(&fact.scalar) else {
        tracing::warn!(
          page_id,
          path = %fact_path,
          json_type = %fact.scalar.json_type,
          "no storage class for declared type"
        );
        outcome.warnings.push(RecordWarning {
          path: fact_path,
          kind: WarningKind::UnmappedType { scalar: fact.scalar },
        });
        continue;
      };
      pending.push(PendingFact {
        path_parent: path::parent_instance_path(&fact_path, &fact.path_no_index),
        path: fact_path,
        path_no_index: fact.path_no_index,
        class,
        value: fact.value,
      });
    }

    if groups.is_empty() {
      return Ok(outcome);
    }

    let (schema_ids, written) = self
      .conn
      .call(move |conn| {
        let now = now();
        let tx = conn.transaction()?;
        let mut schema_ids = Vec::with_capacity(groups.len());
        let mut written = RecordOutcome::default();
        for (schema, facts) in &groups {
          let (schema_id, partial) = replace_schema_facts(&tx, page_id, schema, facts, &now)?;
          schema_ids.push(schema_id);
          written.merge(partial);
        }
        tx.commit()?;
        Ok((schema_ids, written))
      })
      .await?;
    outcome.merge(written);

    tracing::info!(
      page_id,
      facts = outcome.facts_written,
      warnings = outcome.warnings.len(),
      "recorded page facts"
    );
    self.invalidate_pages_with_queries(schema_ids).await?;
    Ok(outcome)
  }

  async fn delete_page(&self, page_id: PageId) -> Result<()> {
    let schema_ids = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let schema_ids = schema_ids_of_page(&tx, page_id)?;
        for class in StorageClass::ALL {
          tx.execute(&format!("DELETE FROM {} WHERE page_id = ?1", class.table()), [page_id])?;
        }
        tx.execute("DELETE FROM schema_pages WHERE page_id = ?1", [page_id])?;
        tx.execute("DELETE FROM links WHERE page_id = ?1", [page_id])?;
        tx.execute("DELETE FROM page_categories WHERE page_id = ?1", [page_id])?;
        tx.execute("DELETE FROM pages WHERE page_id = ?1", [page_id])?;
        tx.commit()?;
        Ok(schema_ids)
      })
      .await?;

    tracing::info!(page_id, schemas = schema_ids.len(), "deleted page");
    self.invalidate_pages_with_queries(schema_ids).await?;
    Ok(())
  }

  async fn delete_article_schemas(&self, page_id: PageId, schema_names: Vec<String>) -> Result<()> {
    let schema_ids = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut schema_ids = Vec::new();
        for name in &schema_names {
          let id: Option<i64> = tx
            .query_row("SELECT id FROM schemas WHERE name = ?1", [name], |r| r.get(0))
            .optional()?;
          let Some(id) = id else { continue };
          delete_facts(&tx, page_id, id)?;
          tx.execute(
            "DELETE FROM schema_pages WHERE page_id = ?1 AND schema_id = ?2",
            params![page_id, id],
          )?;
          tx.execute(
            "DELETE FROM links WHERE page_id = ?1 AND schema_id = ?2",
            params![page_id, id],
          )?;
          schema_ids.push(id);
        }
        tx.commit()?;
        Ok(schema_ids)
      })
      .await?;

    tracing::info!(page_id, schemas = schema_ids.len(), "deleted page schema data");
    self.invalidate_pages_with_queries(schema_ids).await?;
    Ok(())
  }

  async fn store_link(
    &self,
    page_id: PageId,
    link_type: LinkType,
    schema_names: Vec<String>,
  ) -> Result<()> {
    let names: BTreeSet<String> = schema_names.into_iter().collect();
    let count = names.len();
    self
      .conn
      .call(move |conn| {
        let now = now();
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM links WHERE page_id = ?1 AND type = ?2",
          params![page_id, link_type.as_str()],
        )?;
        if names.is_empty() {
          tx.execute(
            "INSERT INTO links (page_id, type, schema_id, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?3)",
            params![page_id, link_type.as_str(), now],
          )?;
        }
        for name in &names {
          let schema_id = upsert_schema(&tx, name, &now)?;
          tx.execute(
            "INSERT INTO links (page_id, type, schema_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![page_id, link_type.as_str(), schema_id, now],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(page_id, link_type = link_type.as_str(), schemas = count, "stored links");
    Ok(())
  }

  async fn invalidate_pages_with_queries(&self, schema_ids: Vec<i64>) -> Result<Vec<PageId>> {
    if schema_ids.is_empty() {
      return Ok(Vec::new());
    }
    let pages = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT page_id FROM links WHERE type = ?1 AND schema_id = ?2",
        )?;
        let mut pages = BTreeSet::new();
        for schema_id in &schema_ids {
          let rows = stmt
            .query_map(params![LinkType::Query.as_str(), schema_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<PageId>>>()?;
          pages.extend(rows);
        }
        Ok(pages.into_iter().collect::<Vec<_>>())
      })
      .await?;

    for &page_id in &pages {
      self.invalidator.invalidate(page_id);
    }
    if !pages.is_empty() {
      tracing::info!(pages = pages.len(), "invalidated querying pages");
    }
    Ok(pages)
  }

  async fn get_schema_id<'a>(&'a self, name: &'a str) -> Result<Option<i64>> {
    let name = name.to_owned();
    let id = self
      .conn
      .call(move |conn| {
        let id = conn
          .query_row("SELECT id FROM schemas WHERE name = ?1", [name], |r| r.get(0))
          .optional()?;
        Ok(id)
      })
      .await?;
    Ok(id)
  }

  async fn get_schema_name(&self, id: i64) -> Result<Option<String>> {
    let name = self
      .conn
      .call(move |conn| {
        let name = conn
          .query_row("SELECT name FROM schemas WHERE id = ?1", [id], |r| r.get(0))
          .optional()?;
        Ok(name)
      })
      .await?;
    Ok(name)
  }

  async fn schema_properties<'a>(&'a self, name: &'a str) -> Result<Vec<PropertyTemplate>> {
    let name = name.to_owned();
    let raw: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT pt.path_no_index, pt.table_id
           FROM prop_tables pt
           JOIN schemas s ON s.id = pt.schema_id
           WHERE s.name = ?1
           ORDER BY pt.path_no_index",
        )?;
        let rows = stmt
          .query_map([name], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raw
      .into_iter()
      .map(|(path_no_index, table_id)| {
        Ok(PropertyTemplate { path_no_index, class: decode_class(table_id)? })
      })
      .collect()
  }

  async fn rename_schema<'a>(&'a self, old: &'a str, new: &'a str) -> Result<bool> {
    let (old_name, new_name) = (old.to_owned(), new.to_owned());
    let changed = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE schemas SET name = ?1, updated_at = ?2 WHERE name = ?3",
          params![new_name, now(), old_name],
        )?;
        Ok(changed > 0)
      })
      .await?;

    if changed {
      tracing::info!(old, new, "renamed schema");
    }
    Ok(changed)
  }

  async fn delete_schema<'a>(&'a self, name: &'a str) -> Result<()> {
    let Some(schema_id) = self.get_schema_id(name).await? else {
      return Ok(());
    };

    let dependents = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let dependents = {
          let mut stmt = tx.prepare(
            "SELECT DISTINCT page_id FROM links WHERE type = ?1 AND schema_id = ?2",
          )?;
          stmt
            .query_map(params![LinkType::Query.as_str(), schema_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<PageId>>>()?
        };
        for class in StorageClass::ALL {
          tx.execute(
            &format!(
              "DELETE FROM {} WHERE prop_id IN (SELECT id FROM props WHERE schema_id = ?1)",
              class.table()
            ),
            [schema_id],
          )?;
        }
        tx.execute("DELETE FROM props WHERE schema_id = ?1", [schema_id])?;
        tx.execute("DELETE FROM prop_tables WHERE schema_id = ?1", [schema_id])?;
        tx.execute("DELETE FROM schema_pages WHERE schema_id = ?1", [schema_id])?;
        tx.execute("DELETE FROM links WHERE schema_id = ?1", [schema_id])?;
        tx.execute("DELETE FROM schemas WHERE id = ?1", [schema_id])?;
        tx.commit()?;
        Ok(dependents)
      })
      .await?;

    tracing::info!(schema = name, dependents = dependents.len(), "deleted schema");
    for page_id in dependents {
      self.invalidator.invalidate(page_id);
    }
    Ok(())
  }

  async fn register_page(&self, page: PageRef) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO pages (page_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
           ON CONFLICT(page_id) DO UPDATE
             SET title = excluded.title, updated_at = excluded.updated_at",
          params![page.page_id, page.title, now()],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_page(&self, page_id: PageId) -> Result<Option<PageRef>> {
    let page = self
      .conn
      .call(move |conn| {
        let page = conn
          .query_row("SELECT page_id, title FROM pages WHERE page_id = ?1", [page_id], |r| {
            Ok(PageRef { page_id: r.get(0)?, title: r.get(1)? })
          })
          .optional()?;
        Ok(page)
      })
      .await?;
    Ok(page)
  }

  async fn set_page_categories(&self, page_id: PageId, categories: Vec<String>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM page_categories WHERE page_id = ?1", [page_id])?;
        for category in &categories {
          tx.execute(
            "INSERT OR IGNORE INTO page_categories (page_id, category) VALUES (?1, ?2)",
            params![page_id, category],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query(&self, query: Query) -> Result<QueryResult> {
    let schema = query.params.schema.clone();
    let result = self
      .conn
      .call(move |conn| Ok(QueryProcessor::new(query).execute(conn)?))
      .await?;

    match &result {
      QueryResult::Rows { rows } => tracing::debug!(schema = %schema, rows = rows.len(), "query answered"),
      other => tracing::debug!(schema = %schema, result = ?other, "query answered"),
    }
    Ok(result)
  }
}
