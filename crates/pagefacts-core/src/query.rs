//! The bracket query language, query parameters, and result kinds.
//!
//! ```text
//! [[authors/last_name::D]]      property condition (exact, after casting)
//! [[title::Rust~]]              prefix match; `~` stands for "anything"
//! [[Category:Books]]            subject: page is in a category
//! [[Main Page]]                 subject: page title
//! Main Page                     no brackets: the whole string is a subject
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::page::PageId;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\[\[([^\[\]]*?)\]\]").expect("static regex")
});

const CATEGORY_PREFIX: &str = "category:";

// ─── Parameters ──────────────────────────────────────────────────────────────

/// How query results are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultMode {
  /// One row per page with every matched printout value re-nested.
  #[default]
  Tree,
  /// One row per matched combination of facts.
  Flat,
  /// Number of matched pages.
  Count,
}

/// Optional query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
  pub schema:                  String,
  pub limit:                   usize,
  pub offset:                  usize,
  /// Comma-separated `<property> [ASC|DESC]` list.
  pub order:                   String,
  /// Whether facts must come from the same (or an enclosing) array element.
  #[serde(rename = "hierarchical-conditions", alias = "hierarchical_conditions")]
  pub hierarchical_conditions: bool,
  /// Printout name that stands for the page title.
  #[serde(rename = "pagetitle-name", alias = "pagetitle_name")]
  pub pagetitle_name:          String,
  pub mode:                    ResultMode,
}

impl Default for QueryParams {
  fn default() -> Self {
    Self {
      schema:                  String::new(),
      limit:                   100,
      offset:                  0,
      order:                   String::new(),
      hierarchical_conditions: true,
      pagetitle_name:          "pagetitle".to_string(),
      mode:                    ResultMode::Tree,
    }
  }
}

/// A complete query: the bracket string, requested printouts, parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
  pub query:     String,
  #[serde(default)]
  pub printouts: Vec<String>,
  #[serde(default, flatten)]
  pub params:    QueryParams,
}

impl Query {
  pub fn new(query: impl Into<String>) -> Self {
    Self { query: query.into(), ..Default::default() }
  }

  pub fn schema(mut self, schema: impl Into<String>) -> Self {
    self.params.schema = schema.into();
    self
  }

  pub fn printouts<I, P>(mut self, printouts: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<String>,
  {
    self.printouts = printouts.into_iter().map(Into::into).collect();
    self
  }

  pub fn mode(mut self, mode: ResultMode) -> Self {
    self.params.mode = mode;
    self
  }
}

// ─── Parsed form ─────────────────────────────────────────────────────────────

/// How a condition value is compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Comparison {
  /// Equality after casting to the property's storage class.
  Equals { value: String },
  /// SQL `LIKE`; the flags say whether anything may precede or follow.
  Like {
    value:          String,
    any_before:     bool,
    any_after:      bool,
  },
}

impl Comparison {
  fn parse(raw: &str) -> Self {
    let any_before = raw.starts_with('~');
    let rest = raw.strip_prefix('~').unwrap_or(raw);
    let any_after = !rest.is_empty() && rest.ends_with('~');
    let value = rest.strip_suffix('~').filter(|_| any_after).unwrap_or(rest);
    if any_before || any_after {
      Self::Like { value: value.to_owned(), any_before, any_after }
    } else {
      Self::Equals { value: raw.to_owned() }
    }
  }

  /// The `LIKE` pattern with `%`, `_` and `\` escaped by `\`.
  pub fn like_pattern(value: &str, any_before: bool, any_after: bool) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    if any_before {
      pattern.push('%');
    }
    for c in value.chars() {
      if matches!(c, '%' | '_' | '\\') {
        pattern.push('\\');
      }
      pattern.push(c);
    }
    if any_after {
      pattern.push('%');
    }
    pattern
  }
}

/// `[[property::value]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
  /// Index-free path relative to the schema root, e.g. `authors/last_name`.
  pub property:   String,
  pub comparison: Comparison,
}

/// `[[Title]]` or `[[Category:Name]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Subject {
  Title(String),
  Category(String),
}

impl Subject {
  fn parse(raw: &str) -> Self {
    let raw = raw.trim();
    match raw.get(..CATEGORY_PREFIX.len()) {
      Some(prefix) if prefix.eq_ignore_ascii_case(CATEGORY_PREFIX) => {
        Self::Category(raw[CATEGORY_PREFIX.len()..].trim().to_owned())
      }
      _ => Self::Title(raw.to_owned()),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
  pub conditions: Vec<Condition>,
  pub subjects:   Vec<Subject>,
}

impl ParsedQuery {
  pub fn is_empty(&self) -> bool {
    self.conditions.is_empty() && self.subjects.is_empty()
  }

  pub fn titles(&self) -> Vec<String> {
    self
      .subjects
      .iter()
      .filter_map(|s| match s {
        Subject::Title(t) => Some(t.clone()),
        Subject::Category(_) => None,
      })
      .collect()
  }

  pub fn categories(&self) -> Vec<String> {
    self
      .subjects
      .iter()
      .filter_map(|s| match s {
        Subject::Category(c) => Some(c.clone()),
        Subject::Title(_) => None,
      })
      .collect()
  }
}

/// Scan a query string for bracket tokens.
///
/// Without any token the whole trimmed string is taken as a subject; an empty
/// string parses to an empty query.
pub fn parse_query(query: &str) -> ParsedQuery {
  let mut parsed = ParsedQuery::default();

  for capture in TOKEN.captures_iter(query) {
    let token = capture[1].trim();
    if token.is_empty() {
      continue;
    }
    match token.split_once("::") {
      Some((property, value)) => parsed.conditions.push(Condition {
        property:   property.trim().trim_matches('/').to_owned(),
        comparison: Comparison::parse(value.trim()),
      }),
      None => parsed.subjects.push(Subject::parse(token)),
    }
  }

  if parsed.is_empty() && !TOKEN.is_match(query) {
    let trimmed = query.trim();
    if !trimmed.is_empty() {
      parsed.subjects.push(Subject::parse(trimmed));
    }
  }

  parsed
}

// ─── Ordering ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
  pub property:   String,
  pub descending: bool,
}

/// Parse `a/b DESC, c` into order keys. Unknown direction words are ignored.
pub fn parse_order(order: &str) -> Vec<OrderKey> {
  order
    .split(',')
    .filter_map(|part| {
      let mut words = part.split_whitespace();
      let property = words.next()?.trim_matches('/').to_owned();
      let descending = words
        .next()
        .is_some_and(|dir| dir.eq_ignore_ascii_case("desc"));
      Some(OrderKey { property, descending })
    })
    .collect()
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// One result row: a page and the re-nested printout values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRow {
  pub page_id: PageId,
  pub title:   Option<String>,
  pub data:    Value,
}

/// Outcome of running a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResult {
  /// Neither a condition nor a subject was given.
  NoQuery,
  /// The schema has no registered properties (yet).
  NoSchema,
  Count { count: u64 },
  Rows { rows: Vec<QueryRow> },
}

impl QueryResult {
  pub fn rows(&self) -> &[QueryRow] {
    match self {
      Self::Rows { rows } => rows,
      _ => &[],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_query_is_empty() {
    assert!(parse_query("").is_empty());
    assert!(parse_query("   ").is_empty());
  }

  #[test]
  fn property_conditions() {
    let parsed = parse_query("[[authors/last_name::D]] [[ year :: 2020 ]]");
    assert_eq!(parsed.conditions, vec![
      Condition {
        property:   "authors/last_name".into(),
        comparison: Comparison::Equals { value: "D".into() },
      },
      Condition {
        property:   "year".into(),
        comparison: Comparison::Equals { value: "2020".into() },
      },
    ]);
    assert!(parsed.subjects.is_empty());
  }

  #[test]
  fn like_markers() {
    let parse = |q: &str| parse_query(q).conditions.remove(0).comparison;
    assert_eq!(parse("[[t::Rust~]]"), Comparison::Like {
      value:      "Rust".into(),
      any_before: false,
      any_after:  true,
    });
    assert_eq!(parse("[[t::~book]]"), Comparison::Like {
      value:      "book".into(),
      any_before: true,
      any_after:  false,
    });
    assert_eq!(parse("[[t::~ust~]]"), Comparison::Like {
      value:      "ust".into(),
      any_before: true,
      any_after:  true,
    });
  }

  #[test]
  fn like_pattern_escapes_wildcards() {
    assert_eq!(Comparison::like_pattern("50%_off", false, true), "50\\%\\_off%");
    assert_eq!(Comparison::like_pattern("x", true, true), "%x%");
  }

  #[test]
  fn subjects() {
    let parsed = parse_query("[[Main Page]] [[Category:Books]] [[category: Novels]]");
    assert_eq!(parsed.titles(), vec!["Main Page".to_string()]);
    assert_eq!(parsed.categories(), vec!["Books".to_string(), "Novels".to_string()]);
  }

  #[test]
  fn bare_string_is_a_subject() {
    assert_eq!(parse_query("  Main Page ").subjects, vec![Subject::Title(
      "Main Page".into()
    )]);
    assert_eq!(parse_query("Category:Books").subjects, vec![Subject::Category(
      "Books".into()
    )]);
  }

  #[test]
  fn order_keys() {
    assert_eq!(parse_order("title DESC, authors/last_name asc,,"), vec![
      OrderKey { property: "title".into(), descending: true },
      OrderKey { property: "authors/last_name".into(), descending: false },
    ]);
    assert!(parse_order("").is_empty());
  }

  #[test]
  fn params_defaults_and_kebab_names() {
    let params: QueryParams = serde_json::from_str(
      r#"{"schema":"Book","hierarchical-conditions":false}"#,
    )
    .unwrap();
    assert_eq!(params.schema, "Book");
    assert_eq!(params.limit, 100);
    assert!(!params.hierarchical_conditions);
    assert_eq!(params.pagetitle_name, "pagetitle");
    assert_eq!(params.mode, ResultMode::Tree);
  }
}
