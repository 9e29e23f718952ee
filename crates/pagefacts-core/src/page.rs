//! Pages (the opaque content units facts hang off) and the request-scoped
//! title cache used while assembling query results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Opaque integer id assigned by the host.
pub type PageId = i64;

/// A page as mirrored from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
  pub page_id: PageId,
  pub title:   String,
}

/// Page titles resolved during one request, keyed by page id.
///
/// Owned by whoever runs the request; nothing is shared between requests.
/// `None` entries remember pages the host does not know about.
#[derive(Debug, Default)]
pub struct PageCache {
  titles: HashMap<PageId, Option<String>>,
}

impl PageCache {
  pub fn new() -> Self { Self::default() }

  /// Return the cached title, or resolve it with `load` and remember the
  /// answer.
  pub fn get_or_load<E>(
    &mut self,
    page_id: PageId,
    load: impl FnOnce(PageId) -> Result<Option<String>, E>,
  ) -> Result<Option<String>, E> {
    if let Some(title) = self.titles.get(&page_id) {
      return Ok(title.clone());
    }
    let title = load(page_id)?;
    self.titles.insert(page_id, title.clone());
    Ok(title)
  }

  pub fn invalidate(&mut self, page_id: PageId) { self.titles.remove(&page_id); }

  pub fn len(&self) -> usize { self.titles.len() }

  pub fn is_empty(&self) -> bool { self.titles.is_empty() }
}

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use super::*;

  #[test]
  fn loads_each_page_once() {
    let mut cache = PageCache::new();
    let mut loads = 0;

    for _ in 0..3 {
      let title = cache
        .get_or_load(7, |_| {
          loads += 1;
          Ok::<_, Infallible>(Some("Seven".to_string()))
        })
        .unwrap();
      assert_eq!(title.as_deref(), Some("Seven"));
    }
    assert_eq!(loads, 1);
  }

  #[test]
  fn invalidate_forces_reload() {
    let mut cache = PageCache::new();
    cache
      .get_or_load(1, |_| Ok::<_, Infallible>(None))
      .unwrap();
    assert_eq!(cache.len(), 1);

    cache.invalidate(1);
    assert!(cache.is_empty());

    let title = cache
      .get_or_load(1, |_| Ok::<_, Infallible>(Some("Back".to_string())))
      .unwrap();
    assert_eq!(title.as_deref(), Some("Back"));
  }
}
