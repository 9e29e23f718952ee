//! The query processor: bracket query → join plan → SQL → re-nested rows.
//!
//! One processor serves one [`Query`] and moves through
//! `Unparsed → Parsed → Executed`. Page titles are resolved through a
//! [`PageCache`] owned by the processor, so each page is looked up once.

use std::collections::BTreeMap;

use pagefacts_core::{
  flatten::plain_to_nested,
  page::{PageCache, PageId},
  path,
  plan::{Filter, LinkKind, OrderTarget, PlanOutcome, QueryPlan, plan_query},
  query::{ParsedQuery, Query, QueryResult, QueryRow, ResultMode, parse_query},
  store::PropertyTemplate,
  types::StorageClass,
};
use rusqlite::{
  Connection, OptionalExtension as _, params_from_iter,
  types::{Type, Value as SqlValue},
};
use serde_json::Value;

use crate::{
  encode::{decode_value, encode_value},
  sql::{Aggregate, Expr, JoinKind, Predicate, Projection, Select, Source},
};

enum State {
  Unparsed,
  Parsed(ParsedQuery),
  Executed,
}

pub struct QueryProcessor {
  query: Query,
  state: State,
  pages: PageCache,
}

/// Column expressions of one joined fact source.
struct FactColumns {
  page:   Expr,
  value:  Expr,
  path:   Expr,
  parent: Expr,
}

impl FactColumns {
  /// A `values_*` table `t{k}` joined to `props` as `p{k}`.
  fn pair(k: usize) -> Self {
    let (t, p) = (format!("t{k}"), format!("p{k}"));
    Self {
      page:   Expr::col(&t, "page_id"),
      value:  Expr::col(&t, "value"),
      path:   Expr::col(&p, "path"),
      parent: Expr::col(&p, "path_parent"),
    }
  }

  /// A derived fact source `f{k}`.
  fn derived(k: usize) -> Self {
    let f = format!("f{k}");
    Self {
      page:   Expr::col(&f, "page_id"),
      value:  Expr::col(&f, "value"),
      path:   Expr::col(&f, "path"),
      parent: Expr::col(&f, "path_parent"),
    }
  }
}

impl QueryProcessor {
  pub fn new(query: Query) -> Self {
    Self { query, state: State::Unparsed, pages: PageCache::new() }
  }

  /// Parse the query string; a no-op once parsed.
  pub fn parse(&mut self) -> Option<&ParsedQuery> {
    if let State::Unparsed = self.state {
      self.state = State::Parsed(parse_query(&self.query.query));
    }
    match &self.state {
      State::Parsed(parsed) => Some(parsed),
      _ => None,
    }
  }

  pub fn execute(&mut self, conn: &Connection) -> rusqlite::Result<QueryResult> {
    let Some(parsed) = self.parse().cloned() else {
      return Ok(QueryResult::NoQuery);
    };
    self.state = State::Executed;

    if parsed.is_empty() {
      return Ok(QueryResult::NoQuery);
    }

    let schema_name = self.query.params.schema.trim().to_owned();
    let Some((schema_id, templates)) = load_templates(conn, &schema_name)? else {
      tracing::debug!(schema = %schema_name, "no registered properties for schema");
      return Ok(QueryResult::NoSchema);
    };

    // Stored paths keep the prefix they were recorded under, even after a
    // rename.
    let root = templates
      .first()
      .and_then(|t| t.path_no_index.split(path::SEP).next())
      .map_or_else(|| path::escape(&schema_name), str::to_owned);
    let plan = match plan_query(&self.query, &parsed, &root, &templates) {
      PlanOutcome::Planned(plan) => plan,
      PlanOutcome::Unsatisfiable { property } => {
        tracing::debug!(property = %property, "condition on unknown property");
        return Ok(match self.query.params.mode {
          ResultMode::Count => QueryResult::Count { count: 0 },
          _ => QueryResult::Rows { rows: Vec::new() },
        });
      }
    };
    for unknown in &plan.unknown {
      tracing::warn!(schema = %schema_name, property = %unknown, "unknown printout");
    }

    self.run(conn, schema_id, &plan)
  }

  fn run(
    &mut self,
    conn: &Connection,
    schema_id: i64,
    plan: &QueryPlan,
  ) -> rusqlite::Result<QueryResult> {
    let mode = self.query.params.mode;
    let (select, columns, page) = build_joins(schema_id, plan);
    let outputs: Vec<usize> = (0..plan.properties.len())
      .filter(|&k| plan.properties[k].output)
      .collect();

    let select = match mode {
      ResultMode::Count => select.aggregate(Aggregate::CountDistinct, page.clone()),
      ResultMode::Tree => {
        let mut select = select.column(page.clone());
        for &k in &outputs {
          select = select.pairs(columns[k].path.clone(), columns[k].value.clone());
        }
        select.group_by(page.clone())
      }
      ResultMode::Flat => {
        let mut select = select.distinct().column(page.clone());
        for &k in &outputs {
          select = select
            .column(columns[k].path.clone())
            .column(columns[k].value.clone());
        }
        select
      }
    };

    if mode == ResultMode::Count {
      let rendered = select.render();
      tracing::debug!(sql = %rendered.sql, "running count query");
      let count: i64 = conn.query_row(
        &rendered.sql,
        params_from_iter(rendered.params.iter()),
        |row| row.get(0),
      )?;
      return Ok(QueryResult::Count { count: count.max(0) as u64 });
    }

    let select = order_and_limit(select, &self.query, plan, &columns, &page);
    let rendered = select.render();
    tracing::debug!(sql = %rendered.sql, "running query");

    let classes: Vec<StorageClass> =
      outputs.iter().map(|&k| plan.properties[k].class).collect();
    let mut stmt = conn.prepare(&rendered.sql)?;
    let raw: Vec<(PageId, Value)> = stmt
      .query_map(params_from_iter(rendered.params.iter()), |row| {
        let page_id: PageId = row.get(0)?;
        let mut values = BTreeMap::new();
        for (i, class) in classes.iter().enumerate() {
          if mode == ResultMode::Tree {
            let packed: String = row.get(1 + i)?;
            let pairs: Vec<(String, String)> =
              serde_json::from_str(&packed).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1 + i, Type::Text, Box::new(e))
              })?;
            for (p, v) in pairs {
              values.insert(p, class.decode_text(&v));
            }
          } else {
            let path_col = 1 + 2 * i;
            let p: Option<String> = row.get(path_col)?;
            let v: SqlValue = row.get(path_col + 1)?;
            if let Some(p) = p {
              values.insert(p, decode_value(*class, v));
            }
          }
        }
        let data = plain_to_nested(values.iter().map(|(p, v)| (p.as_str(), v.clone())), 1);
        Ok((page_id, data))
      })?
      .collect::<rusqlite::Result<_>>()?;

    let title_key = self.query.params.pagetitle_name.clone();
    let mut rows = Vec::with_capacity(raw.len());
    for (page_id, mut data) in raw {
      let title = self.pages.get_or_load(page_id, |id| {
        conn
          .query_row("SELECT title FROM pages WHERE page_id = ?1", [id], |r| r.get(0))
          .optional()
      })?;
      if plan.include_title
        && let Value::Object(map) = &mut data
      {
        map.insert(
          title_key.clone(),
          title.clone().map_or(Value::Null, Value::String),
        );
      }
      rows.push(QueryRow { page_id, title, data });
    }

    tracing::debug!(rows = rows.len(), "query finished");
    Ok(QueryResult::Rows { rows })
  }
}

/// Schema id plus its registered templates, or `None` when the schema has
/// none.
fn load_templates(
  conn: &Connection,
  schema_name: &str,
) -> rusqlite::Result<Option<(i64, Vec<PropertyTemplate>)>> {
  if schema_name.is_empty() {
    return Ok(None);
  }
  let mut stmt = conn.prepare(
    "SELECT s.id, pt.path_no_index, pt.table_id
     FROM schemas s
     JOIN prop_tables pt ON pt.schema_id = s.id
     WHERE s.name = ?1
     ORDER BY pt.path_no_index",
  )?;
  let rows = stmt
    .query_map([schema_name], |row| {
      Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let Some(schema_id) = rows.first().map(|r| r.0) else {
    return Ok(None);
  };
  let templates = rows
    .into_iter()
    .filter_map(|(_, path_no_index, table_id)| {
      let class = StorageClass::from_id(table_id);
      if class.is_none() {
        tracing::warn!(path_no_index = %path_no_index, table_id, "skipping unknown storage class");
      }
      Some(PropertyTemplate { path_no_index, class: class? })
    })
    .collect();
  Ok(Some((schema_id, templates)))
}

/// Build FROM/JOIN/WHERE for the plan. Returns the select, the columns of
/// every planned source, and the page id expression.
fn build_joins(schema_id: i64, plan: &QueryPlan) -> (Select, Vec<FactColumns>, Expr) {
  let properties = &plan.properties;
  let anchored = properties.first().is_some_and(|p| p.is_required());

  let columns: Vec<FactColumns> = properties
    .iter()
    .enumerate()
    .map(|(k, p)| {
      if p.is_required() {
        FactColumns::pair(k)
      } else {
        FactColumns::derived(k)
      }
    })
    .collect();

  let (mut select, page, schema, first) = if anchored {
    let anchor = &properties[0];
    let mut select = Select::from(Source::Table {
      table: anchor.class.table(),
      alias: "t0".into(),
    })
    .join(
      JoinKind::Inner,
      Source::Table { table: "props", alias: "p0".into() },
      vec![Predicate::Eq(Expr::col("p0", "id"), Expr::col("t0", "prop_id"))],
    )
    .filter(Predicate::Eq(Expr::col("p0", "schema_id"), Expr::param(schema_id)))
    .filter(Predicate::Eq(
      Expr::col("p0", "path_no_index"),
      Expr::text(anchor.path_no_index.clone()),
    ));
    if let Some(filter) = &anchor.filter {
      select = select.filter(filter_predicate(&columns[0].value, filter));
    }
    (select, Expr::col("t0", "page_id"), Expr::col("p0", "schema_id"), 1)
  } else {
    let select = Select::from(Source::Table {
      table: "schema_pages",
      alias: "sp".into(),
    })
    .filter(Predicate::Eq(Expr::col("sp", "schema_id"), Expr::param(schema_id)));
    (select, Expr::col("sp", "page_id"), Expr::col("sp", "schema_id"), 0)
  };

  for (k, property) in properties.iter().enumerate().skip(first) {
    let own = &columns[k];
    let mut linkage = Vec::new();
    if let Some(link) = property.link {
      let other = &columns[link.to];
      linkage.push(match link.kind {
        LinkKind::SameInstance => Predicate::Eq(own.parent.clone(), other.parent.clone()),
        LinkKind::Below => Predicate::PathBelow {
          ancestor:   other.parent.clone(),
          descendant: own.parent.clone(),
        },
        LinkKind::Above => Predicate::PathBelow {
          ancestor:   own.parent.clone(),
          descendant: other.parent.clone(),
        },
      });
    }

    match &property.filter {
      Some(filter) => {
        let mut on = vec![
          Predicate::Eq(Expr::col(&format!("p{k}"), "id"), Expr::col(&format!("t{k}"), "prop_id")),
          Predicate::Eq(Expr::col(&format!("p{k}"), "schema_id"), schema.clone()),
          Predicate::Eq(
            Expr::col(&format!("p{k}"), "path_no_index"),
            Expr::text(property.path_no_index.clone()),
          ),
        ];
        on.extend(linkage);
        on.push(filter_predicate(&own.value, filter));
        select = select
          .join(
            JoinKind::Inner,
            Source::Table { table: property.class.table(), alias: format!("t{k}") },
            vec![Predicate::Eq(own.page.clone(), page.clone())],
          )
          .join(JoinKind::Inner, Source::Table { table: "props", alias: format!("p{k}") }, on);
      }
      None => {
        let mut on = vec![Predicate::Eq(own.page.clone(), page.clone())];
        on.extend(linkage);
        select = select.join(
          JoinKind::Left,
          Source::Facts {
            class:         property.class,
            alias:         format!("f{k}"),
            schema_id,
            path_no_index: property.path_no_index.clone(),
          },
          on,
        );
      }
    }
  }

  if !plan.titles.is_empty() {
    select = select.filter(Predicate::Member {
      table:  "pages",
      column: "title",
      page:   page.clone(),
      values: plan.titles.clone(),
    });
  }
  if !plan.categories.is_empty() {
    select = select.filter(Predicate::Member {
      table:  "page_categories",
      column: "category",
      page:   page.clone(),
      values: plan.categories.clone(),
    });
  }

  (select, columns, page)
}

fn filter_predicate(value: &Expr, filter: &Filter) -> Predicate {
  match filter {
    Filter::Equals(typed) => Predicate::Eq(value.clone(), Expr::Param(encode_value(typed))),
    Filter::Like(pattern) => Predicate::Like(value.clone(), Expr::text(pattern.clone())),
  }
}

fn order_and_limit(
  mut select: Select,
  query: &Query,
  plan: &QueryPlan,
  columns: &[FactColumns],
  page: &Expr,
) -> Select {
  let tree = query.params.mode == ResultMode::Tree;
  let needs_title = plan.order.iter().any(|o| o.target == OrderTarget::Title);
  if needs_title {
    select = select.join(
      JoinKind::Left,
      Source::Table { table: "pages", alias: "pg".into() },
      vec![Predicate::Eq(Expr::col("pg", "page_id"), page.clone())],
    );
  }

  for order in &plan.order {
    let expr = match order.target {
      OrderTarget::Property(k) => columns[k].value.clone(),
      OrderTarget::Title => Expr::col("pg", "title"),
    };
    let projection = if tree {
      let aggregate = if order.descending { Aggregate::Max } else { Aggregate::Min };
      Projection::Aggregate(aggregate, expr)
    } else {
      // DISTINCT rows must carry their sort keys.
      select = select.column(expr.clone());
      Projection::Expr(expr)
    };
    select = select.order_by(projection, order.descending);
  }

  select = select.order_by(Projection::Expr(page.clone()), false);
  if !tree {
    for (property, own) in plan.properties.iter().zip(columns) {
      if property.output {
        select = select.order_by(Projection::Expr(own.path.clone()), false);
      }
    }
  }
  select.limit(query.params.limit as i64, query.params.offset as i64)
}
