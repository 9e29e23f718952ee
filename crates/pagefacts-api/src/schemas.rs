//! Schema registry introspection and maintenance.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use pagefacts_core::store::{FactStore, PropertyTemplate};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

/// `GET /schemas/:schema/properties`
pub async fn properties<S>(
  State(state): State<ApiState<S>>,
  Path(schema): Path<String>,
) -> Result<Json<Vec<PropertyTemplate>>, ApiError>
where
  S: FactStore,
{
  let known = state
    .store
    .get_schema_id(&schema)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if known.is_none() {
    return Err(ApiError::NotFound(format!("schema {schema} not found")));
  }

  let properties = state
    .store
    .schema_properties(&schema)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(properties))
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
  pub name: String,
}

/// `PATCH /schemas/:schema` with `{"name":"..."}`.
pub async fn rename<S>(
  State(state): State<ApiState<S>>,
  Path(schema): Path<String>,
  Json(body): Json<RenameBody>,
) -> Result<StatusCode, ApiError>
where
  S: FactStore,
{
  let name = body.name.trim();
  if name.is_empty() {
    return Err(ApiError::BadRequest("schema name must not be empty".into()));
  }
  let renamed = state
    .store
    .rename_schema(&schema, name)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if !renamed {
    return Err(ApiError::NotFound(format!("schema {schema} not found")));
  }
  Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /schemas/:schema`
pub async fn delete<S>(
  State(state): State<ApiState<S>>,
  Path(schema): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: FactStore,
{
  state
    .store
    .delete_schema(&schema)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(StatusCode::NO_CONTENT)
}
