//! A small typed SELECT builder.
//!
//! Queries are assembled from aliases, predicates and join kinds, then
//! rendered once. Every literal travels as a bound parameter; table and
//! column names only ever come from `&'static str`s.

use std::fmt::Write as _;

use pagefacts_core::types::StorageClass;
use rusqlite::types::Value as SqlValue;

// ─── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Column { alias: String, column: &'static str },
  Param(SqlValue),
}

impl Expr {
  pub fn col(alias: &str, column: &'static str) -> Self {
    Self::Column { alias: alias.to_owned(), column }
  }

  pub fn param(value: impl Into<SqlValue>) -> Self { Self::Param(value.into()) }

  pub fn text(value: impl Into<String>) -> Self {
    Self::Param(SqlValue::Text(value.into()))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  Eq(Expr, Expr),
  /// `LIKE` with `\` as escape character.
  Like(Expr, Expr),
  /// `descendant` continues `ancestor` after a `/`.
  PathBelow { ancestor: Expr, descendant: Expr },
  /// The page has a row in a membership table whose `column` is one of
  /// `values`.
  Member {
    table:  &'static str,
    column: &'static str,
    page:   Expr,
    values: Vec<String>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
  CountDistinct,
  Min,
  Max,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
  Expr(Expr),
  Aggregate(Aggregate, Expr),
  /// Every non-null `(path, value)` pair of a group as a JSON array of
  /// two-element arrays, the value rendered as text.
  Pairs { path: Expr, value: Expr },
}

// ─── Sources ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
  Table { table: &'static str, alias: String },
  /// Facts of one property shape as a derived table with the columns
  /// `page_id`, `value`, `path` and `path_parent`.
  Facts {
    class:         StorageClass,
    alias:         String,
    schema_id:     i64,
    path_no_index: String,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
  Inner,
  Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
  pub kind:   JoinKind,
  pub source: Source,
  pub on:     Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
  pub projection: Projection,
  pub descending: bool,
}

// ─── Select ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
  pub distinct:    bool,
  pub projections: Vec<Projection>,
  pub from:        Source,
  pub joins:       Vec<Join>,
  pub filters:     Vec<Predicate>,
  pub group_by:    Vec<Expr>,
  pub order_by:    Vec<OrderBy>,
  pub limit:       Option<i64>,
  pub offset:      Option<i64>,
}

/// Rendered SQL with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
  pub sql:    String,
  pub params: Vec<SqlValue>,
}

impl Select {
  pub fn from(source: Source) -> Self {
    Self {
      distinct: false,
      projections: Vec::new(),
      from: source,
      joins: Vec::new(),
      filters: Vec::new(),
      group_by: Vec::new(),
      order_by: Vec::new(),
      limit: None,
      offset: None,
    }
  }

  pub fn distinct(mut self) -> Self {
    self.distinct = true;
    self
  }

  pub fn column(mut self, expr: Expr) -> Self {
    self.projections.push(Projection::Expr(expr));
    self
  }

  pub fn aggregate(mut self, aggregate: Aggregate, expr: Expr) -> Self {
    self.projections.push(Projection::Aggregate(aggregate, expr));
    self
  }

  pub fn pairs(mut self, path: Expr, value: Expr) -> Self {
    self.projections.push(Projection::Pairs { path, value });
    self
  }

  pub fn join(mut self, kind: JoinKind, source: Source, on: Vec<Predicate>) -> Self {
    self.joins.push(Join { kind, source, on });
    self
  }

  pub fn filter(mut self, predicate: Predicate) -> Self {
    self.filters.push(predicate);
    self
  }

  pub fn group_by(mut self, expr: Expr) -> Self {
    self.group_by.push(expr);
    self
  }

  pub fn order_by(mut self, projection: Projection, descending: bool) -> Self {
    self.order_by.push(OrderBy { projection, descending });
    self
  }

  pub fn limit(mut self, limit: i64, offset: i64) -> Self {
    self.limit = Some(limit);
    self.offset = Some(offset);
    self
  }

  pub fn render(&self) -> Rendered {
    let mut r = Renderer::default();
    r.sql.push_str("SELECT ");
    if self.distinct {
      r.sql.push_str("DISTINCT ");
    }
    for (i, projection) in self.projections.iter().enumerate() {
      if i > 0 {
        r.sql.push_str(", ");
      }
      r.projection(projection);
    }

    r.sql.push_str("\nFROM ");
    r.source(&self.from);
    for join in &self.joins {
      r.sql.push_str(match join.kind {
        JoinKind::Inner => "\nJOIN ",
        JoinKind::Left => "\nLEFT JOIN ",
      });
      r.source(&join.source);
      if !join.on.is_empty() {
        r.sql.push_str(" ON ");
        r.predicates(&join.on);
      }
    }

    if !self.filters.is_empty() {
      r.sql.push_str("\nWHERE ");
      r.predicates(&self.filters);
    }

    if !self.group_by.is_empty() {
      r.sql.push_str("\nGROUP BY ");
      for (i, expr) in self.group_by.iter().enumerate() {
        if i > 0 {
          r.sql.push_str(", ");
        }
        r.expr(expr);
      }
    }

    if !self.order_by.is_empty() {
      r.sql.push_str("\nORDER BY ");
      for (i, order) in self.order_by.iter().enumerate() {
        if i > 0 {
          r.sql.push_str(", ");
        }
        r.projection(&order.projection);
        r.sql.push_str(if order.descending { " DESC" } else { " ASC" });
      }
    }

    if let Some(limit) = self.limit {
      r.sql.push_str("\nLIMIT ");
      r.param(SqlValue::Integer(limit));
      r.sql.push_str(" OFFSET ");
      r.param(SqlValue::Integer(self.offset.unwrap_or(0)));
    }

    Rendered { sql: r.sql, params: r.params }
  }
}

#[derive(Default)]
struct Renderer {
  sql:    String,
  params: Vec<SqlValue>,
}

impl Renderer {
  fn param(&mut self, value: SqlValue) {
    self.params.push(value);
    let _ = write!(self.sql, "?{}", self.params.len());
  }

  fn expr(&mut self, expr: &Expr) {
    match expr {
      Expr::Column { alias, column } => {
        let _ = write!(self.sql, "{alias}.{column}");
      }
      Expr::Param(value) => self.param(value.clone()),
    }
  }

  fn projection(&mut self, projection: &Projection) {
    match projection {
      Projection::Expr(expr) => self.expr(expr),
      Projection::Aggregate(aggregate, expr) => {
        self.sql.push_str(match aggregate {
          Aggregate::CountDistinct => "COUNT(DISTINCT ",
          Aggregate::Min => "MIN(",
          Aggregate::Max => "MAX(",
        });
        self.expr(expr);
        self.sql.push(')');
      }
      Projection::Pairs { path, value } => {
        self.sql.push_str("json_group_array(json_array(");
        self.expr(path);
        self.sql.push_str(", CAST(");
        self.expr(value);
        self.sql.push_str(" AS TEXT))) FILTER (WHERE ");
        self.expr(path);
        self.sql.push_str(" IS NOT NULL)");
      }
    }
  }

  fn source(&mut self, source: &Source) {
    match source {
      Source::Table { table, alias } => {
        let _ = write!(self.sql, "{table} {alias}");
      }
      Source::Facts { class, alias, schema_id, path_no_index } => {
        let _ = write!(
          self.sql,
          "(SELECT t.page_id AS page_id, t.value AS value, p.path AS path, \
           p.path_parent AS path_parent FROM {} t JOIN props p ON p.id = t.prop_id \
           WHERE p.schema_id = ",
          class.table()
        );
        self.param(SqlValue::Integer(*schema_id));
        self.sql.push_str(" AND p.path_no_index = ");
        self.param(SqlValue::Text(path_no_index.clone()));
        let _ = write!(self.sql, ") {alias}");
      }
    }
  }

  fn predicates(&mut self, predicates: &[Predicate]) {
    for (i, predicate) in predicates.iter().enumerate() {
      if i > 0 {
        self.sql.push_str(" AND ");
      }
      self.predicate(predicate);
    }
  }

  fn predicate(&mut self, predicate: &Predicate) {
    match predicate {
      Predicate::Eq(a, b) => {
        self.expr(a);
        self.sql.push_str(" = ");
        self.expr(b);
      }
      Predicate::Like(a, b) => {
        self.expr(a);
        self.sql.push_str(" LIKE ");
        self.expr(b);
        self.sql.push_str(" ESCAPE '\\'");
      }
      Predicate::PathBelow { ancestor, descendant } => {
        self.sql.push_str("substr(");
        self.expr(descendant);
        self.sql.push_str(", 1, length(");
        self.expr(ancestor);
        self.sql.push_str(") + 1) = ");
        self.expr(ancestor);
        self.sql.push_str(" || '/'");
      }
      Predicate::Member { table, column, page, values } => {
        let _ = write!(
          self.sql,
          "EXISTS (SELECT 1 FROM {table} m WHERE m.page_id = "
        );
        self.expr(page);
        let _ = write!(self.sql, " AND m.{column} IN (");
        for (i, value) in values.iter().enumerate() {
          if i > 0 {
            self.sql.push_str(", ");
          }
          self.param(SqlValue::Text(value.clone()));
        }
        self.sql.push_str("))");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_joins_with_numbered_params() {
    let select = Select::from(Source::Table { table: "values_text", alias: "t0".into() })
      .column(Expr::col("t0", "page_id"))
      .join(
        JoinKind::Inner,
        Source::Table { table: "props", alias: "p0".into() },
        vec![Predicate::Eq(Expr::col("p0", "id"), Expr::col("t0", "prop_id"))],
      )
      .filter(Predicate::Eq(Expr::col("p0", "path_no_index"), Expr::text("S/a")))
      .filter(Predicate::Like(Expr::col("t0", "value"), Expr::text("x%")))
      .limit(10, 5);

    let rendered = select.render();
    assert_eq!(
      rendered.sql,
      "SELECT t0.page_id\nFROM values_text t0\nJOIN props p0 ON p0.id = t0.prop_id\n\
       WHERE p0.path_no_index = ?1 AND t0.value LIKE ?2 ESCAPE '\\'\nLIMIT ?3 OFFSET ?4"
    );
    assert_eq!(rendered.params, vec![
      SqlValue::Text("S/a".into()),
      SqlValue::Text("x%".into()),
      SqlValue::Integer(10),
      SqlValue::Integer(5),
    ]);
  }

  #[test]
  fn renders_derived_fact_source_and_aggregates() {
    let select = Select::from(Source::Table { table: "schema_pages", alias: "sp".into() })
      .column(Expr::col("sp", "page_id"))
      .pairs(Expr::col("f1", "path"), Expr::col("f1", "value"))
      .join(
        JoinKind::Left,
        Source::Facts {
          class:         StorageClass::Integer,
          alias:         "f1".into(),
          schema_id:     3,
          path_no_index: "S/n".into(),
        },
        vec![Predicate::Eq(Expr::col("f1", "page_id"), Expr::col("sp", "page_id"))],
      )
      .group_by(Expr::col("sp", "page_id"));

    let rendered = select.render();
    assert!(rendered.sql.contains(
      "json_group_array(json_array(f1.path, CAST(f1.value AS TEXT))) \
       FILTER (WHERE f1.path IS NOT NULL)"
    ));
    assert!(rendered.sql.contains("FROM values_integer t JOIN props p"));
    assert!(rendered.sql.contains(") f1 ON f1.page_id = sp.page_id"));
    assert!(rendered.sql.ends_with("GROUP BY sp.page_id"));
    assert_eq!(rendered.params, vec![
      SqlValue::Integer(3),
      SqlValue::Text("S/n".into()),
    ]);
  }

  #[test]
  fn renders_path_and_membership_predicates() {
    let select = Select::from(Source::Table { table: "props", alias: "p0".into() })
      .column(Expr::col("p0", "id"))
      .filter(Predicate::PathBelow {
        ancestor:   Expr::col("p0", "path_parent"),
        descendant: Expr::col("p1", "path_parent"),
      })
      .filter(Predicate::Member {
        table:  "page_categories",
        column: "category",
        page:   Expr::col("t0", "page_id"),
        values: vec!["A".into(), "B".into()],
      });

    let rendered = select.render();
    assert!(rendered.sql.contains(
      "substr(p1.path_parent, 1, length(p0.path_parent) + 1) = p0.path_parent || '/'"
    ));
    assert!(rendered.sql.contains(
      "EXISTS (SELECT 1 FROM page_categories m WHERE m.page_id = t0.page_id AND m.category IN (?1, ?2))"
    ));
  }
}
