//! Handlers recording and removing a page's schema data.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `PUT`    | `/pages/:page_id/schemas/:schema` | Body: the document; returns [`RecordOutcome`] |
//! | `DELETE` | `/pages/:page_id/schemas/:schema` | 204 |
//! | `DELETE` | `/pages/:page_id/schemas` | Body: `{"schemas":[...]}`; 204 |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use pagefacts_core::{
  page::PageId,
  store::{FactStore, RecordOutcome, record_document},
};
use serde::Deserialize;
use serde_json::Value;

use crate::{ApiState, error::ApiError};

/// `PUT /pages/:page_id/schemas/:schema` with the raw document as body.
pub async fn record<S>(
  State(state): State<ApiState<S>>,
  Path((page_id, schema)): Path<(PageId, String)>,
  Json(data): Json<Value>,
) -> Result<Json<RecordOutcome>, ApiError>
where
  S: FactStore,
{
  let node = state
    .schemas
    .schema(&schema)
    .ok_or_else(|| pagefacts_core::Error::SchemaNotFound(schema.clone()))?;

  let outcome = record_document(state.store.as_ref(), page_id, &schema, &node, &data)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(outcome))
}

/// `DELETE /pages/:page_id/schemas/:schema`
pub async fn delete<S>(
  State(state): State<ApiState<S>>,
  Path((page_id, schema)): Path<(PageId, String)>,
) -> Result<StatusCode, ApiError>
where
  S: FactStore,
{
  state
    .store
    .delete_article_schemas(page_id, vec![schema])
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SchemaListBody {
  pub schemas: Vec<String>,
}

/// `DELETE /pages/:page_id/schemas` with `{"schemas":[...]}`.
pub async fn delete_many<S>(
  State(state): State<ApiState<S>>,
  Path(page_id): Path<PageId>,
  Json(body): Json<SchemaListBody>,
) -> Result<StatusCode, ApiError>
where
  S: FactStore,
{
  state
    .store
    .delete_article_schemas(page_id, body.schemas)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(StatusCode::NO_CONTENT)
}
