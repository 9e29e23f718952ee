//! Join-graph planning for the query processor.
//!
//! Every property a query touches (conditions, printouts, order keys) becomes
//! one joined fact source. Sources are ordered required-first, then by depth,
//! and each source after the first is linked to the already-planned source
//! sharing the deepest enclosing instance. The link is what keeps facts of
//! one array element apart from facts of its siblings.

use serde::{Deserialize, Serialize};

use crate::{
  path,
  query::{Comparison, OrderKey, ParsedQuery, Query, ResultMode, parse_order},
  store::PropertyTemplate,
  types::{StorageClass, TypedValue},
};

/// How a planned source relates to the source it is linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
  /// Both leaves sit in the same object instance: `path_parent` is equal.
  SameInstance,
  /// This source lives inside the other's instance: the other's
  /// `path_parent` is a path prefix of this one's.
  Below,
  /// The other source lives inside this one's instance.
  Above,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
  /// Index of the source linked to; always smaller than the linking index.
  pub to:   usize,
  pub kind: LinkKind,
}

/// A condition value cast for its storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
  Equals(TypedValue),
  Like(String),
}

/// One fact source of the join.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedProperty {
  pub path_no_index: String,
  pub class:         StorageClass,
  /// Inner-joined when set; printouts and order keys are left-joined.
  pub filter:        Option<Filter>,
  /// Whether values of this source appear in the output.
  pub output:        bool,
  pub link:          Option<Link>,
}

impl PlannedProperty {
  pub fn is_required(&self) -> bool { self.filter.is_some() }

  pub fn depth(&self) -> usize { path::depth(&self.path_no_index) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTarget {
  Property(usize),
  Title,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
  pub target:     OrderTarget,
  pub descending: bool,
}

/// Everything the SQL layer needs to run a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
  pub properties:    Vec<PlannedProperty>,
  pub titles:        Vec<String>,
  pub categories:    Vec<String>,
  pub order:         Vec<Order>,
  pub include_title: bool,
  /// Printouts that matched no registered property.
  pub unknown:       Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
  Planned(QueryPlan),
  /// A condition names a property the schema does not have; nothing can
  /// match.
  Unsatisfiable { property: String },
}

/// Resolve a parsed query against a schema's registered templates.
///
/// `schema_root` is the escaped schema name every index-free path starts
/// with. `templates` must be non-empty.
pub fn plan_query(
  query: &Query,
  parsed: &ParsedQuery,
  schema_root: &str,
  templates: &[PropertyTemplate],
) -> PlanOutcome {
  let absolute = |relative: &str| {
    if relative.is_empty() {
      schema_root.to_owned()
    } else {
      format!("{schema_root}/{relative}")
    }
  };
  let lookup = |full: &str| templates.iter().find(|t| t.path_no_index == full);

  let mut properties = Vec::new();

  for condition in &parsed.conditions {
    let full = absolute(&condition.property);
    let Some(template) = lookup(&full) else {
      return PlanOutcome::Unsatisfiable { property: condition.property.clone() };
    };
    let filter = match &condition.comparison {
      Comparison::Equals { value } => {
        Filter::Equals(template.class.cast_condition(value))
      }
      Comparison::Like { value, any_before, any_after } => {
        Filter::Like(Comparison::like_pattern(value, *any_before, *any_after))
      }
    };
    properties.push(PlannedProperty {
      path_no_index: full,
      class:         template.class,
      filter:        Some(filter),
      output:        false,
      link:          None,
    });
  }

  let title_name = query.params.pagetitle_name.as_str();
  let mut include_title = false;
  let mut unknown = Vec::new();
  let mut outputs: Vec<&PropertyTemplate> = Vec::new();

  if query.printouts.is_empty() {
    outputs.extend(templates);
  }
  for printout in &query.printouts {
    let printout = printout.trim().trim_matches('/');
    if !title_name.is_empty() && printout == title_name {
      include_title = true;
      continue;
    }
    let full = absolute(printout);
    let matched: Vec<_> = match lookup(&full) {
      Some(exact) => vec![exact],
      None => templates
        .iter()
        .filter(|t| path::is_prefix(&full, &t.path_no_index))
        .collect(),
    };
    if matched.is_empty() {
      unknown.push(printout.to_owned());
    }
    outputs.extend(matched);
  }
  for template in outputs {
    if properties
      .iter()
      .any(|p| p.output && p.path_no_index == template.path_no_index)
    {
      continue;
    }
    properties.push(PlannedProperty {
      path_no_index: template.path_no_index.clone(),
      class:         template.class,
      filter:        None,
      output:        true,
      link:          None,
    });
  }

  let order_keys: Vec<OrderKey> = parse_order(&query.params.order);
  let mut pending_order = Vec::new();
  for key in &order_keys {
    if !title_name.is_empty() && key.property == title_name {
      pending_order.push((None, key.descending));
      continue;
    }
    let full = absolute(&key.property);
    let Some(template) = lookup(&full) else {
      unknown.push(key.property.clone());
      continue;
    };
    if !properties.iter().any(|p| p.path_no_index == full) {
      properties.push(PlannedProperty {
        path_no_index: full.clone(),
        class:         template.class,
        filter:        None,
        output:        false,
        link:          None,
      });
    }
    pending_order.push((Some(full), key.descending));
  }

  let mode = query.params.mode;
  if mode == ResultMode::Count {
    properties.retain(PlannedProperty::is_required);
  }

  // Required sources first so the anchor is always inner-joined.
  properties.sort_by_key(|p| (!p.is_required(), p.depth()));
  if query.params.hierarchical_conditions {
    link_properties(&mut properties, mode != ResultMode::Flat);
  }

  let order = pending_order
    .into_iter()
    .filter_map(|(full, descending)| {
      let target = match full {
        None => OrderTarget::Title,
        Some(full) => OrderTarget::Property(
          properties
            .iter()
            .position(|p| p.path_no_index == full && p.filter.is_none())
            .or_else(|| properties.iter().position(|p| p.path_no_index == full))?,
        ),
      };
      Some(Order { target, descending })
    })
    .collect();

  PlanOutcome::Planned(QueryPlan {
    properties,
    titles: parsed.titles(),
    categories: parsed.categories(),
    order,
    include_title,
    unknown,
  })
}

/// Link every source after the first to the planned source whose instance
/// relation is most specific.
///
/// With `required_only` only required sources are link targets: when rows
/// are aggregated per page, printouts need to agree with the conditions but
/// not with each other.
pub fn link_properties(properties: &mut [PlannedProperty], required_only: bool) {
  for k in 1..properties.len() {
    let parent_k = path::parent(&properties[k].path_no_index);
    let best = (0..k)
      .filter(|&j| !required_only || properties[j].is_required())
      .filter_map(|j| {
        let parent_j = path::parent(&properties[j].path_no_index);
        let (kind, shared) = if parent_j == parent_k {
          (LinkKind::SameInstance, parent_k)
        } else if path::is_prefix(parent_j, parent_k) {
          (LinkKind::Below, parent_j)
        } else if path::is_prefix(parent_k, parent_j) {
          (LinkKind::Above, parent_k)
        } else {
          return None;
        };
        let score = (
          path::depth(shared),
          kind == LinkKind::SameInstance,
          properties[j].is_required(),
          j,
        );
        Some((score, Link { to: j, kind }))
      })
      .max_by_key(|(score, _)| *score)
      .map(|(_, link)| link);
    properties[k].link = best;
  }
}
