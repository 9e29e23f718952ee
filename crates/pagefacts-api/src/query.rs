//! Handler for `POST /query`.
//!
//! The body is a [`Query`]: `query`, optional `printouts`, and the query
//! parameters flattened alongside (`schema`, `limit`, `offset`, `order`,
//! `hierarchical-conditions`, `pagetitle-name`, `mode`).

use axum::{
  Json,
  extract::State,
};
use pagefacts_core::{
  query::{Query, QueryResult},
  store::FactStore,
};

use crate::{ApiState, error::ApiError};

pub async fn handler<S>(
  State(state): State<ApiState<S>>,
  Json(query): Json<Query>,
) -> Result<Json<QueryResult>, ApiError>
where
  S: FactStore,
{
  let result = state
    .store
    .query(query)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(result))
}
