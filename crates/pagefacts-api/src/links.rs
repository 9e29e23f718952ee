//! Dependency links and invalidation.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use pagefacts_core::{
  page::PageId,
  store::{FactStore, LinkType},
};
use serde::Serialize;

use crate::{ApiState, error::ApiError, facts::SchemaListBody};

/// `PUT /pages/:page_id/links/:link_type` with `{"schemas":[...]}`.
///
/// Replaces the page's links of that type; an empty list leaves a single
/// schema-less placeholder.
pub async fn store<S>(
  State(state): State<ApiState<S>>,
  Path((page_id, link_type)): Path<(PageId, LinkType)>,
  Json(body): Json<SchemaListBody>,
) -> Result<StatusCode, ApiError>
where
  S: FactStore,
{
  state
    .store
    .store_link(page_id, link_type, body.schemas)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct InvalidatedPages {
  pub pages: Vec<PageId>,
}

/// `POST /invalidate` with `{"schemas":[...]}`. Unknown schema names are
/// ignored.
pub async fn invalidate<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<SchemaListBody>,
) -> Result<Json<InvalidatedPages>, ApiError>
where
  S: FactStore,
{
  let mut ids = Vec::with_capacity(body.schemas.len());
  for name in &body.schemas {
    if let Some(id) = state
      .store
      .get_schema_id(name)
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?
    {
      ids.push(id);
    }
  }

  let pages = state
    .store
    .invalidate_pages_with_queries(ids)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(InvalidatedPages { pages }))
}
