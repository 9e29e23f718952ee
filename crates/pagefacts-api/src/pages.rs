//! Handlers for the host page mirror.
//!
//! | Method   | Path              | Notes |
//! |----------|-------------------|-------|
//! | `GET`    | `/pages/:page_id` | Mirrored page or 404 |
//! | `PUT`    | `/pages/:page_id` | Body: [`RegisterPageBody`] |
//! | `DELETE` | `/pages/:page_id` | Drops all facts and links; 204 |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use pagefacts_core::{
  page::{PageId, PageRef},
  store::FactStore,
};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

/// `GET /pages/:page_id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(page_id): Path<PageId>,
) -> Result<Json<PageRef>, ApiError>
where
  S: FactStore,
{
  let page = state
    .store
    .get_page(page_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("page {page_id} not found")))?;
  Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct RegisterPageBody {
  pub title:      String,
  /// Replaces the page's categories when present.
  pub categories: Option<Vec<String>>,
}

/// `PUT /pages/:page_id`
pub async fn register<S>(
  State(state): State<ApiState<S>>,
  Path(page_id): Path<PageId>,
  Json(body): Json<RegisterPageBody>,
) -> Result<Json<PageRef>, ApiError>
where
  S: FactStore,
{
  let title = body.title.trim();
  if title.is_empty() {
    return Err(ApiError::BadRequest("page title must not be empty".into()));
  }
  let page = PageRef { page_id, title: title.to_owned() };
  state
    .store
    .register_page(page.clone())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  if let Some(categories) = body.categories {
    state
      .store
      .set_page_categories(page_id, categories)
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?;
  }
  Ok(Json(page))
}

/// `DELETE /pages/:page_id`
pub async fn delete<S>(
  State(state): State<ApiState<S>>,
  Path(page_id): Path<PageId>,
) -> Result<StatusCode, ApiError>
where
  S: FactStore,
{
  state
    .store
    .delete_page(page_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(StatusCode::NO_CONTENT)
}
