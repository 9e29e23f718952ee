//! Path codec: JSON-Pointer-style escaping and the slash-delimited paths
//! every fact is addressed by.
//!
//! A concrete path looks like `Book/authors/1/first_name`; its index-free
//! form (`Book/authors/first_name`) names the property's shape regardless of
//! which array element it came from.

use std::collections::BTreeSet;

/// Path separator.
pub const SEP: char = '/';

/// Escape a single segment so it can be joined with `/`.
///
/// `~` becomes `~0` first, then `/` becomes `~1`.
pub fn escape(segment: &str) -> String {
  segment.replace('~', "~0").replace('/', "~1")
}

/// Reverse [`escape`] for a single segment.
///
/// `~1` is resolved before `~0` so that an escaped `~01` comes back as `~1`
/// rather than `/`. Malformed sequences (a lone `~`, `~2`) pass through
/// unchanged.
pub fn unescape_segment(segment: &str) -> String {
  segment.replace("~1", "/").replace("~0", "~")
}

/// Split a path into its unescaped segments.
pub fn unescape(path: &str) -> Vec<String> {
  if path.is_empty() {
    return Vec::new();
  }
  path.split(SEP).map(unescape_segment).collect()
}

/// Append an (unescaped) segment to a path.
pub fn join(prefix: &str, segment: &str) -> String {
  let segment = escape(segment);
  if prefix.is_empty() {
    segment
  } else {
    format!("{prefix}{SEP}{segment}")
  }
}

/// Number of separators in a path; the root segment has depth 0.
pub fn depth(path: &str) -> usize { path.matches(SEP).count() }

/// Everything before the last separator, or `""` for a single segment.
pub fn parent(path: &str) -> &str {
  path.rfind(SEP).map_or("", |i| &path[..i])
}

/// Whether `segment` is a pure array index.
pub fn is_index(segment: &str) -> bool {
  !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Segment-wise prefix test: `a/b` is a prefix of `a/b` and `a/b/c`, but not
/// of `a/bc`.
pub fn is_prefix(prefix: &str, path: &str) -> bool {
  if prefix.is_empty() {
    return true;
  }
  match path.strip_prefix(prefix) {
    Some(rest) => rest.is_empty() || rest.starts_with(SEP),
    None => false,
  }
}

/// Remove array-index segments from `path`.
///
/// A segment is dropped when it is numeric and the concrete path leading up
/// to it is listed in `array_ancestors`, so numeric object keys survive.
pub fn index_free_path(path: &str, array_ancestors: &BTreeSet<String>) -> String {
  let mut concrete = String::new();
  let mut kept: Vec<&str> = Vec::new();
  for segment in path.split(SEP).filter(|s| !s.is_empty()) {
    if !(is_index(segment) && array_ancestors.contains(&concrete)) {
      kept.push(segment);
    }
    if !concrete.is_empty() {
      concrete.push(SEP);
    }
    concrete.push_str(segment);
  }
  kept.join("/")
}

/// The concrete path of the object instance a leaf belongs to.
///
/// Walks `path` matching the segments of `path_no_index` in order; the result
/// is everything before the segment that matched the last index-free segment.
/// For `S/items/0/tags/1` with shape `S/items/tags` this is `S/items/0`, the
/// same value its sibling `S/items/0/name` gets.
pub fn parent_instance_path(path: &str, path_no_index: &str) -> String {
  let segments: Vec<&str> = path.split(SEP).collect();
  let shape: Vec<&str> = path_no_index.split(SEP).collect();
  let Some(last) = shape.len().checked_sub(1) else {
    return String::new();
  };

  let mut matched = 0;
  let mut cut = segments.len().saturating_sub(1);
  for (i, segment) in segments.iter().enumerate() {
    if matched < shape.len() && *segment == shape[matched] {
      if matched == last {
        cut = i;
        break;
      }
      matched += 1;
    }
  }
  segments[..cut].join("/")
}
