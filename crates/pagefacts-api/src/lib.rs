//! JSON REST API for pagefacts.
//!
//! Exposes an axum [`Router`] backed by any [`FactStore`] plus a
//! [`SchemaSource`] that resolves schema documents by name. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", pagefacts_api::api_router(state))
//! ```

pub mod error;
pub mod facts;
pub mod links;
pub mod pages;
pub mod query;
pub mod schemas;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, patch, post, put},
};
use pagefacts_core::store::{FactStore, SchemaSource};

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:   Arc<S>,
  pub schemas: Arc<dyn SchemaSource>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), schemas: self.schemas.clone() }
  }
}

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: FactStore + Send + Sync + 'static,
{
  Router::new()
    // Pages
    .route(
      "/pages/{page_id}",
      get(pages::get_one::<S>).put(pages::register::<S>).delete(pages::delete::<S>),
    )
    // Facts
    .route(
      "/pages/{page_id}/schemas/{schema}",
      put(facts::record::<S>).delete(facts::delete::<S>),
    )
    .route("/pages/{page_id}/schemas", delete(facts::delete_many::<S>))
    // Links
    .route("/pages/{page_id}/links/{link_type}", put(links::store::<S>))
    .route("/invalidate", post(links::invalidate::<S>))
    // Schemas
    .route(
      "/schemas/{schema}",
      patch(schemas::rename::<S>).delete(schemas::delete::<S>),
    )
    .route("/schemas/{schema}/properties", get(schemas::properties::<S>))
    // Queries
    .route("/query", post(query::handler::<S>))
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
