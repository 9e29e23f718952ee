//! The `FactStore` trait, the collaborator traits it relies on, and the
//! types crossing that boundary.
//!
//! Backends (e.g. `pagefacts-store-sqlite`) implement [`FactStore`]; the
//! host supplies a [`PageInvalidator`] and a [`SchemaSource`].

use std::{
  collections::HashMap,
  future::Future,
  sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  flatten::{PropertySet, flatten_document},
  page::{PageId, PageRef},
  query::{Query, QueryResult},
  schema::{ScalarType, SchemaNode},
  types::StorageClass,
};

// ─── Boundary types ──────────────────────────────────────────────────────────

/// The storage class registered for one property shape of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyTemplate {
  pub path_no_index: String,
  pub class:         StorageClass,
}

/// Why a flattened property was not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
  /// The declared `(type, format)` has no storage class.
  UnmappedType { scalar: ScalarType },
  /// The value does not fit the property's storage class.
  UncastableValue { class: StorageClass, value: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWarning {
  pub path: String,
  #[serde(flatten)]
  pub kind: WarningKind,
}

/// Result of recording a page's facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
  pub facts_written: usize,
  pub warnings:      Vec<RecordWarning>,
}

impl RecordOutcome {
  pub fn merge(&mut self, other: RecordOutcome) {
    self.facts_written += other.facts_written;
    self.warnings.extend(other.warnings);
  }
}

/// Kind of dependency a page registers on schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
  /// The page embeds a query over the schema; it is purged when the
  /// schema's facts change.
  Query,
  /// The page renders a template bound to the schema.
  Template,
}

impl LinkType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Query => "query",
      Self::Template => "template",
    }
  }
}

// ─── Collaborators ───────────────────────────────────────────────────────────

/// Host callback that purges a page's rendered output.
pub trait PageInvalidator: Send + Sync {
  fn invalidate(&self, page_id: PageId);
}

/// Invalidator for hosts that cache nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

impl PageInvalidator for NoopInvalidator {
  fn invalidate(&self, _page_id: PageId) {}
}

/// Host lookup of schema documents by name.
pub trait SchemaSource: Send + Sync {
  fn schema(&self, name: &str) -> Option<Arc<SchemaNode>>;
}

/// A [`SchemaSource`] backed by a map; schemas can be added at runtime.
#[derive(Debug, Default)]
pub struct MemorySchemaSource {
  schemas: RwLock<HashMap<String, Arc<SchemaNode>>>,
}

impl MemorySchemaSource {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&self, name: impl Into<String>, schema: SchemaNode) {
    let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
    schemas.insert(name.into(), Arc::new(schema));
  }
}

impl SchemaSource for MemorySchemaSource {
  fn schema(&self, name: &str) -> Option<Arc<SchemaNode>> {
    let schemas = self.schemas.read().unwrap_or_else(|e| e.into_inner());
    schemas.get(name).cloned()
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a fact store backend.
///
/// Recording replaces every fact of a `(page, schema)` pair; deletes are
/// idempotent. All methods return `Send` futures so the trait can be used
/// behind `axum`.
pub trait FactStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Facts ─────────────────────────────────────────────────────────────

  /// Replace the facts of every schema in `schema_names`, and of every
  /// schema present in `facts`, for `page_id`.
  ///
  /// A schema named in `schema_names` with no facts ends up with none
  /// stored. Properties whose type has no storage class, or whose value
  /// does not cast, are skipped and reported in
  /// [`RecordOutcome::warnings`].
  fn record_properties(
    &self,
    page_id: PageId,
    schema_names: Vec<String>,
    facts: PropertySet,
  ) -> impl Future<Output = Result<RecordOutcome, Self::Error>> + Send + '_;

  /// Remove every fact, schema link and dependency link of a page, then
  /// invalidate pages querying the schemas it was linked to.
  fn delete_page(
    &self,
    page_id: PageId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove only the named schemas' facts for a page.
  fn delete_article_schemas(
    &self,
    page_id: PageId,
    schema_names: Vec<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Dependency links ──────────────────────────────────────────────────

  /// Replace the page's links of `link_type` with one row per schema, or a
  /// single schema-less row when `schema_names` is empty.
  fn store_link(
    &self,
    page_id: PageId,
    link_type: LinkType,
    schema_names: Vec<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Invalidate every page holding a `query` link on one of the schemas.
  /// Returns the invalidated page ids.
  fn invalidate_pages_with_queries(
    &self,
    schema_ids: Vec<i64>,
  ) -> impl Future<Output = Result<Vec<PageId>, Self::Error>> + Send + '_;

  // ── Schema registry ───────────────────────────────────────────────────

  fn get_schema_id<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  fn get_schema_name(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  /// Registered property shapes of a schema, sorted by path.
  fn schema_properties<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Vec<PropertyTemplate>, Self::Error>> + Send + 'a;

  /// Rename a schema in the registry. Returns `false` if `old` is unknown.
  fn rename_schema<'a>(
    &'a self,
    old: &'a str,
    new: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Drop a schema with all its facts and registrations.
  fn delete_schema<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Host mirror ───────────────────────────────────────────────────────

  fn register_page(
    &self,
    page: PageRef,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_page(
    &self,
    page_id: PageId,
  ) -> impl Future<Output = Result<Option<PageRef>, Self::Error>> + Send + '_;

  /// Replace a page's category memberships.
  fn set_page_categories(
    &self,
    page_id: PageId,
    categories: Vec<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Queries ───────────────────────────────────────────────────────────

  fn query(
    &self,
    query: Query,
  ) -> impl Future<Output = Result<QueryResult, Self::Error>> + Send + '_;
}

/// Flatten `data` against `schema` and record it for `page_id`.
pub async fn record_document<S: FactStore>(
  store: &S,
  page_id: PageId,
  schema_name: &str,
  schema: &SchemaNode,
  data: &Value,
) -> Result<RecordOutcome, S::Error> {
  let facts = flatten_document(schema_name, schema, data);
  tracing::debug!(page_id, schema_name, facts = facts.len(), "flattened document");
  store
    .record_properties(page_id, vec![schema_name.to_owned()], facts)
    .await
}
