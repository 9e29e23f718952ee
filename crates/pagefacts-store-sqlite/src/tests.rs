//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::{Arc, Mutex};

use pagefacts_core::{
  page::{PageId, PageRef},
  query::{Query, QueryResult, QueryRow, ResultMode},
  schema::SchemaNode,
  store::{FactStore, LinkType, PageInvalidator, WarningKind, record_document},
  types::StorageClass,
};
use serde_json::{Value, json};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn book_schema() -> SchemaNode {
  SchemaNode::from_json(&json!({
    "type": "object",
    "properties": {
      "title": { "type": "string" },
      "year": { "type": "integer" },
      "authors": {
        "type": "array",
        "items": {
          "type": "object",
          "properties": {
            "first_name": { "type": "string" },
            "last_name": { "type": "string" }
          }
        }
      }
    }
  }))
  .unwrap()
}

fn item_schema() -> SchemaNode {
  SchemaNode::from_json(&json!({
    "type": "object",
    "properties": {
      "items": {
        "type": "array",
        "items": {
          "type": "object",
          "properties": {
            "name": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } }
          }
        }
      }
    }
  }))
  .unwrap()
}

async fn record(s: &SqliteStore, page_id: PageId, schema: &str, node: &SchemaNode, data: Value) {
  record_document(s, page_id, schema, node, &data).await.unwrap();
}

async fn book_store() -> SqliteStore {
  let s = store().await;
  let schema = book_schema();
  for (page_id, title) in [(1, "Dune"), (2, "Emma"), (42, "Solaris")] {
    s.register_page(PageRef { page_id, title: title.into() }).await.unwrap();
  }
  record(&s, 1, "Book", &schema, json!({
    "title": "Dune", "year": 1965,
    "authors": [{ "first_name": "Frank", "last_name": "Herbert" }]
  }))
  .await;
  record(&s, 2, "Book", &schema, json!({
    "title": "Emma", "year": 1815,
    "authors": [{ "first_name": "Jane", "last_name": "Austen" }]
  }))
  .await;
  record(&s, 42, "Book", &schema, json!({
    "title": "T", "year": 1961,
    "authors": [
      { "first_name": "A", "last_name": "B" },
      { "first_name": "C", "last_name": "D" }
    ]
  }))
  .await;
  s
}

fn expect_rows(result: QueryResult) -> Vec<QueryRow> {
  match result {
    QueryResult::Rows { rows } => rows,
    other => panic!("expected rows, got {other:?}"),
  }
}

#[derive(Default)]
struct RecordingInvalidator {
  pages: Mutex<Vec<PageId>>,
}

impl PageInvalidator for RecordingInvalidator {
  fn invalidate(&self, page_id: PageId) { self.pages.lock().unwrap().push(page_id); }
}

// ─── Recording ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_registers_properties() {
  let s = book_store().await;

  let props = s.schema_properties("Book").await.unwrap();
  let paths: Vec<_> = props.iter().map(|p| p.path_no_index.as_str()).collect();
  assert_eq!(paths, [
    "Book/authors/first_name",
    "Book/authors/last_name",
    "Book/title",
    "Book/year"
  ]);
  let year = props.iter().find(|p| p.path_no_index == "Book/year").unwrap();
  assert_eq!(year.class, StorageClass::Integer);
}

#[tokio::test]
async fn condition_and_printout_share_an_array_element() {
  let s = book_store().await;

  let result = s
    .query(
      Query::new("[[authors/last_name::D]]")
        .schema("Book")
        .printouts(["authors/first_name"]),
    )
    .await
    .unwrap();

  let rows = expect_rows(result);
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].page_id, 42);
  assert_eq!(rows[0].title.as_deref(), Some("Solaris"));
  assert_eq!(rows[0].data, json!({ "authors": [{ "first_name": "C" }] }));
}

#[tokio::test]
async fn recording_replaces_previous_facts() {
  let s = store().await;
  let schema = book_schema();
  let authors = |n: usize| {
    (0..n)
      .map(|i| json!({ "first_name": format!("F{i}"), "last_name": format!("L{i}") }))
      .collect::<Vec<_>>()
  };

  record(&s, 7, "Book", &schema, json!({ "title": "X", "authors": authors(3) })).await;
  record(&s, 7, "Book", &schema, json!({ "title": "X", "authors": authors(1) })).await;

  let result = s
    .query(Query::new("[[title::X]]").schema("Book").printouts(["authors"]))
    .await
    .unwrap();
  let rows = expect_rows(result);
  assert_eq!(rows.len(), 1);
  assert_eq!(
    rows[0].data,
    json!({ "authors": [{ "first_name": "F0", "last_name": "L0" }] })
  );

  let stale = s
    .query(Query::new("[[authors/first_name::F2]]").schema("Book"))
    .await
    .unwrap();
  assert!(stale.rows().is_empty());
}

#[tokio::test]
async fn recording_an_empty_document_clears_facts() {
  let s = store().await;
  let schema = book_schema();
  record(&s, 7, "Book", &schema, json!({
    "authors": [{ "first_name": "F", "last_name": "L" }]
  }))
  .await;

  for empty in [json!({ "authors": [] }), json!({}), json!({ "title": null, "isbn": "x" })] {
    let outcome = record_document(&s, 7, "Book", &schema, &empty).await.unwrap();
    assert_eq!(outcome.facts_written, 0);

    let result = s
      .query(Query::new("[[authors/first_name::F]]").schema("Book"))
      .await
      .unwrap();
    assert!(result.rows().is_empty(), "facts survived {empty}");
  }
  assert_eq!(s.page_ids().await.unwrap(), [7]);
}

#[tokio::test]
async fn storage_class_is_fixed_per_property_shape() {
  let s = store().await;
  let as_integer = SchemaNode::from_json(&json!({
    "type": "object",
    "properties": {
      "items": {
        "type": "array",
        "items": { "type": "object", "properties": { "v": { "type": "integer" } } }
      }
    }
  }))
  .unwrap();
  let as_string = SchemaNode::from_json(&json!({
    "type": "object",
    "properties": {
      "items": {
        "type": "array",
        "items": { "type": "object", "properties": { "v": { "type": "string" } } }
      }
    }
  }))
  .unwrap();

  record(&s, 1, "Stock", &as_integer, json!({ "items": [{ "v": 1 }] })).await;
  let outcome = record_document(&s, 2, "Stock", &as_string, &json!({
    "items": [{ "v": "7" }, { "v": "9" }, { "v": "many" }]
  }))
  .await
  .unwrap();

  assert_eq!(outcome.facts_written, 2);
  assert_eq!(outcome.warnings.len(), 1);
  assert_eq!(outcome.warnings[0].path, "Stock/items/2/v");
  assert!(matches!(
    outcome.warnings[0].kind,
    WarningKind::UncastableValue { class: StorageClass::Integer, .. }
  ));

  let rows = expect_rows(
    s.query(Query::new("[[items/v::9]]").schema("Stock").printouts(["items/v"]))
      .await
      .unwrap(),
  );
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].page_id, 2);
  assert_eq!(rows[0].data, json!({ "items": [{ "v": 9 }] }));
}

#[tokio::test]
async fn record_reports_uncastable_values() {
  let s = store().await;

  let outcome = record_document(&s, 1, "Book", &book_schema(), &json!({
    "title": "Dune",
    "year": "sometime"
  }))
  .await
  .unwrap();

  assert_eq!(outcome.facts_written, 1);
  assert_eq!(outcome.warnings.len(), 1);
  assert_eq!(outcome.warnings[0].path, "Book/year");
  assert!(matches!(
    outcome.warnings[0].kind,
    WarningKind::UncastableValue { class: StorageClass::Integer, .. }
  ));
}

#[tokio::test]
async fn record_reports_unmapped_types() {
  let s = store().await;
  let schema = SchemaNode::from_json(&json!({
    "type": "object",
    "properties": {
      "name": { "type": "string" },
      "where": { "type": "geo" }
    }
  }))
  .unwrap();

  let outcome = record_document(&s, 1, "Place", &schema, &json!({
    "name": "Here",
    "where": "51.5,-0.1"
  }))
  .await
  .unwrap();

  assert_eq!(outcome.facts_written, 1);
  assert_eq!(outcome.warnings.len(), 1);
  assert!(matches!(outcome.warnings[0].kind, WarningKind::UnmappedType { .. }));
  let props = s.schema_properties("Place").await.unwrap();
  assert_eq!(props.len(), 1);
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_query_is_no_query() {
  let s = book_store().await;
  let result = s.query(Query::new("").schema("Book")).await.unwrap();
  assert_eq!(result, QueryResult::NoQuery);
}

#[tokio::test]
async fn unknown_schema_is_no_schema() {
  let s = book_store().await;
  let result = s.query(Query::new("[[title::Dune]]").schema("Film")).await.unwrap();
  assert_eq!(result, QueryResult::NoSchema);
}

#[tokio::test]
async fn unknown_condition_property_matches_nothing() {
  let s = book_store().await;
  let result = s.query(Query::new("[[isbn::123]]").schema("Book")).await.unwrap();
  assert_eq!(result, QueryResult::Rows { rows: vec![] });
}

#[tokio::test]
async fn integer_condition_is_cast() {
  let s = book_store().await;
  let result = s
    .query(Query::new("[[year::1815]]").schema("Book").printouts(["title"]))
    .await
    .unwrap();
  let rows = expect_rows(result);
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].data, json!({ "title": "Emma" }));
}

#[tokio::test]
async fn like_conditions_match_substrings() {
  let s = book_store().await;
  let result = s
    .query(Query::new("[[authors/last_name::~er~]]").schema("Book").printouts(["title"]))
    .await
    .unwrap();
  let rows = expect_rows(result);
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].page_id, 1);
}

#[tokio::test]
async fn count_mode_counts_pages() {
  let s = book_store().await;
  let result = s
    .query(Query::new("[[title::~]]").schema("Book").mode(ResultMode::Count))
    .await
    .unwrap();
  assert_eq!(result, QueryResult::Count { count: 3 });
}

#[tokio::test]
async fn flat_mode_yields_one_row_per_value() {
  let s = book_store().await;
  let result = s
    .query(
      Query::new("[[title::T]]")
        .schema("Book")
        .printouts(["authors/first_name"])
        .mode(ResultMode::Flat),
    )
    .await
    .unwrap();
  let rows = expect_rows(result);
  assert_eq!(rows.len(), 2);
  assert!(rows.iter().all(|r| r.page_id == 42));
  assert_eq!(rows[0].data, json!({ "authors": [{ "first_name": "A" }] }));
  assert_eq!(rows[1].data, json!({ "authors": [{ "first_name": "C" }] }));
}

#[tokio::test]
async fn empty_printouts_return_every_property() {
  let s = book_store().await;
  let result = s.query(Query::new("[[year::1965]]").schema("Book")).await.unwrap();
  let rows = expect_rows(result);
  assert_eq!(rows.len(), 1);
  assert_eq!(
    rows[0].data,
    json!({
      "title": "Dune",
      "year": 1965,
      "authors": [{ "first_name": "Frank", "last_name": "Herbert" }]
    })
  );
}

#[tokio::test]
async fn pagetitle_printout_adds_title() {
  let s = book_store().await;
  let result = s
    .query(Query::new("[[year::1965]]").schema("Book").printouts(["pagetitle"]))
    .await
    .unwrap();
  let rows = expect_rows(result);
  assert_eq!(rows[0].data, json!({ "pagetitle": "Dune" }));
}

#[tokio::test]
async fn results_are_ordered_and_limited() {
  let s = book_store().await;
  let mut query = Query::new("[[title::~]]").schema("Book").printouts(["year"]);
  query.params.order = "year desc".into();
  query.params.limit = 2;

  let rows = expect_rows(s.query(query.clone()).await.unwrap());
  let years: Vec<_> = rows.iter().map(|r| r.data["year"].clone()).collect();
  assert_eq!(years, [json!(1965), json!(1961)]);

  query.params.offset = 2;
  let rows = expect_rows(s.query(query).await.unwrap());
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].page_id, 2);
}

#[tokio::test]
async fn order_by_page_title() {
  let s = book_store().await;
  let mut query = Query::new("[[title::~]]").schema("Book");
  query.params.order = "pagetitle".into();
  query.printouts = vec!["year".into()];

  let ids: Vec<_> = expect_rows(s.query(query).await.unwrap())
    .iter()
    .map(|r| r.page_id)
    .collect();
  assert_eq!(ids, [1, 2, 42]);
}

#[tokio::test]
async fn title_and_category_subjects() {
  let s = book_store().await;
  s.set_page_categories(1, vec!["Classics".into(), "SF".into()]).await.unwrap();
  s.set_page_categories(2, vec!["Classics".into()]).await.unwrap();

  let by_title = s
    .query(Query::new("[[Emma]]").schema("Book").printouts(["year"]))
    .await
    .unwrap();
  assert_eq!(expect_rows(by_title)[0].page_id, 2);

  let by_category = s
    .query(Query::new("[[Category:Classics]]").schema("Book").printouts(["year"]))
    .await
    .unwrap();
  let ids: Vec<_> = expect_rows(by_category).iter().map(|r| r.page_id).collect();
  assert_eq!(ids, [1, 2]);

  let combined = s
    .query(Query::new("[[Category:SF]] [[year::1965]]").schema("Book"))
    .await
    .unwrap();
  assert_eq!(expect_rows(combined).len(), 1);
}

#[tokio::test]
async fn hierarchical_conditions_stay_inside_one_element() {
  let s = store().await;
  let schema = item_schema();
  record(&s, 1, "Shop", &schema, json!({
    "items": [
      { "name": "hammer", "tags": ["tool"] },
      { "name": "apple", "tags": ["food", "red"] }
    ]
  }))
  .await;
  record(&s, 2, "Shop", &schema, json!({
    "items": [{ "name": "pear", "tags": ["food"] }]
  }))
  .await;

  let result = s
    .query(Query::new("[[items/tags::food]]").schema("Shop").printouts(["items/name"]))
    .await
    .unwrap();
  let rows = expect_rows(result);
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].data, json!({ "items": [{ "name": "apple" }] }));
  assert_eq!(rows[1].data, json!({ "items": [{ "name": "pear" }] }));

  let mut loose = Query::new("[[items/tags::food]]").schema("Shop").printouts(["items/name"]);
  loose.params.hierarchical_conditions = false;
  let rows = expect_rows(s.query(loose).await.unwrap());
  assert_eq!(
    rows[0].data,
    json!({ "items": [{ "name": "hammer" }, { "name": "apple" }] })
  );
}

#[tokio::test]
async fn hierarchical_conditions_keep_every_matching_sibling() {
  let s = store().await;
  let schema = item_schema();
  record(&s, 1, "Shop", &schema, json!({
    "items": [
      { "name": "bread", "tags": ["food"] },
      { "name": "cherry", "tags": ["red", "food"] },
      { "name": "saw", "tags": ["tool"] }
    ]
  }))
  .await;
  record(&s, 2, "Shop", &schema, json!({
    "items": [{ "name": "nail", "tags": ["tool"] }, { "name": "salt", "tags": ["food"] }]
  }))
  .await;

  let rows = expect_rows(
    s.query(Query::new("[[items/tags::food]]").schema("Shop").printouts(["items/name"]))
      .await
      .unwrap(),
  );
  assert_eq!(rows.len(), 2);
  assert_eq!(rows[0].data, json!({ "items": [{ "name": "bread" }, { "name": "cherry" }] }));
  assert_eq!(rows[1].data, json!({ "items": [{ "name": "salt" }] }));
}

#[tokio::test]
async fn unparsable_date_condition_matches_the_epoch() {
  let s = store().await;
  let schema = SchemaNode::from_json(&json!({
    "type": "object",
    "properties": { "when": { "type": "string", "format": "date" } }
  }))
  .unwrap();
  record(&s, 1, "Event", &schema, json!({ "when": "1970-01-01" })).await;
  record(&s, 2, "Event", &schema, json!({ "when": "2020-05-01" })).await;

  let rows = expect_rows(
    s.query(Query::new("[[when::someday]]").schema("Event").printouts(["when"]))
      .await
      .unwrap(),
  );
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].page_id, 1);
  assert_eq!(rows[0].data, json!({ "when": "1970-01-01" }));
}

#[tokio::test]
async fn tree_rows_keep_separator_characters() {
  let s = store().await;
  let schema = book_schema();
  record(&s, 5, "Book", &schema, json!({
    "title": "a\u{1e}b",
    "year": 1,
    "authors": [
      { "first_name": "x\u{1e}y", "last_name": "L" },
      { "first_name": "z", "last_name": "M" }
    ]
  }))
  .await;

  let rows = expect_rows(
    s.query(
      Query::new("[[year::1]]")
        .schema("Book")
        .printouts(["title", "authors/first_name"]),
    )
    .await
    .unwrap(),
  );
  assert_eq!(rows.len(), 1);
  assert_eq!(
    rows[0].data,
    json!({
      "title": "a\u{1e}b",
      "authors": [{ "first_name": "x\u{1e}y" }, { "first_name": "z" }]
    })
  );
}

// ─── Deletion ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_page_is_idempotent() {
  let s = book_store().await;

  s.delete_page(1).await.unwrap();
  s.delete_page(1).await.unwrap();

  let result = s
    .query(Query::new("[[year::1965]]").schema("Book"))
    .await
    .unwrap();
  assert!(result.rows().is_empty());
  assert!(s.get_page(1).await.unwrap().is_none());
  assert!(s.get_page(2).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_article_schemas_keeps_other_schemas() {
  let s = store().await;
  record(&s, 5, "Book", &book_schema(), json!({ "title": "Dune" })).await;
  record(&s, 5, "Shop", &item_schema(), json!({ "items": [{ "name": "pen" }] })).await;

  s.delete_article_schemas(5, vec!["Shop".into(), "Missing".into()]).await.unwrap();
  s.delete_article_schemas(5, vec!["Shop".into()]).await.unwrap();

  let shop = s.query(Query::new("[[items/name::pen]]").schema("Shop")).await.unwrap();
  assert!(shop.rows().is_empty());
  let book = s.query(Query::new("[[title::Dune]]").schema("Book")).await.unwrap();
  assert_eq!(book.rows().len(), 1);
}

#[tokio::test]
async fn delete_schema_removes_registry() {
  let s = book_store().await;

  s.delete_schema("Book").await.unwrap();
  s.delete_schema("Book").await.unwrap();

  assert!(s.get_schema_id("Book").await.unwrap().is_none());
  assert!(s.schema_properties("Book").await.unwrap().is_empty());
  let result = s.query(Query::new("[[year::1965]]").schema("Book")).await.unwrap();
  assert_eq!(result, QueryResult::NoSchema);
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn schema_ids_and_renames() {
  let s = book_store().await;

  let id = s.get_schema_id("Book").await.unwrap().unwrap();
  assert_eq!(s.get_schema_name(id).await.unwrap().as_deref(), Some("Book"));

  assert!(s.rename_schema("Book", "Novel").await.unwrap());
  assert!(!s.rename_schema("Book", "Other").await.unwrap());
  assert_eq!(s.get_schema_id("Novel").await.unwrap(), Some(id));
  assert!(s.get_schema_id("Book").await.unwrap().is_none());
}

#[tokio::test]
async fn renamed_schema_remains_queryable() {
  let s = book_store().await;
  s.rename_schema("Book", "Novel").await.unwrap();

  let result = s
    .query(Query::new("[[year::1815]]").schema("Novel").printouts(["title"]))
    .await
    .unwrap();
  let rows = expect_rows(result);
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].data, json!({ "title": "Emma" }));
}

#[tokio::test]
async fn page_ids_lists_recorded_pages() {
  let s = book_store().await;
  assert_eq!(s.page_ids().await.unwrap(), [1, 2, 42]);
}

// ─── Invalidation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn recording_invalidates_querying_pages() {
  let invalidator = Arc::new(RecordingInvalidator::default());
  let s = store().await.with_invalidator(invalidator.clone());

  s.store_link(100, LinkType::Query, vec!["Book".into()]).await.unwrap();
  s.store_link(101, LinkType::Template, vec!["Book".into()]).await.unwrap();
  s.store_link(102, LinkType::Query, vec![]).await.unwrap();

  record(&s, 1, "Book", &book_schema(), json!({ "title": "Dune" })).await;
  assert_eq!(*invalidator.pages.lock().unwrap(), [100]);

  s.delete_page(1).await.unwrap();
  assert_eq!(*invalidator.pages.lock().unwrap(), [100, 100]);
}

#[tokio::test]
async fn store_link_replaces_previous_links() {
  let invalidator = Arc::new(RecordingInvalidator::default());
  let s = store().await.with_invalidator(invalidator.clone());

  s.store_link(100, LinkType::Query, vec!["Book".into()]).await.unwrap();
  s.store_link(100, LinkType::Query, vec!["Shop".into()]).await.unwrap();

  record(&s, 1, "Book", &book_schema(), json!({ "title": "Dune" })).await;
  assert!(invalidator.pages.lock().unwrap().is_empty());

  let shop = s.get_schema_id("Shop").await.unwrap().unwrap();
  let pages = s.invalidate_pages_with_queries(vec![shop]).await.unwrap();
  assert_eq!(pages, [100]);
}
